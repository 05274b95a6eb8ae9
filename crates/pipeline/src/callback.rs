//! Payload carried by a status message's cancel control.

use std::fmt;

use crate::job::JobId;

const CANCEL_PREFIX: &str = "cancel:";

/// Action requested through an inline control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    Cancel(JobId),
}

impl CallbackAction {
    /// Decodes a payload produced by [`encode`](Self::encode).
    pub fn parse(data: &str) -> Option<Self> {
        let id = data.strip_prefix(CANCEL_PREFIX)?;
        id.parse().ok().map(CallbackAction::Cancel)
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CallbackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackAction::Cancel(id) => write!(f, "{CANCEL_PREFIX}{id}"),
        }
    }
}
