//! Process Identifiers
//!
//! A `Pid` is the value-type address of anything messages can be sent to:
//! a local actor, a future, or an actor living behind a remote transport.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Address used for processes that are not reachable over a transport
pub const LOCAL_ADDRESS: &str = "nonhost";

/// Unique process identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pid {
    address: String,
    id: String,
}

impl Pid {
    /// Create a PID for the given address and id
    pub fn new(address: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            id: id.into(),
        }
    }

    /// Create a PID on the local, non-routable address
    pub fn local(id: impl Into<String>) -> Self {
        Self::new(LOCAL_ADDRESS, id)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Id of a child named `name` under this PID
    pub fn child_id(&self, name: &str) -> String {
        format!("{}/{}", self.id, name)
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.id)
    }
}
