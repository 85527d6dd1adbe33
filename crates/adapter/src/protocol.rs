//! Client command protocol.
//!
//! Clients send `{"cmd": ..., "data": ...}` requests; the server answers with
//! description-tagged [`Response`]s, both inside length-prefixed frames.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::table::TableError;

pub use crate::table::Response;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Command {
    /// Present a connection token; must be the first request.
    Auth,
    Chat,
    /// Toggle ready.
    SwitchState,
    /// One of rotate, left, right, down, drop, hold.
    Operate,
    Quit,
    Ping,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub cmd: Command,
    #[serde(default)]
    pub data: String,
}

impl Request {
    pub fn new(cmd: Command, data: impl Into<String>) -> Self {
        Self {
            cmd,
            data: data.into(),
        }
    }
}

/// Failures of a single command, reported back as an `error` response.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("already authenticated")]
    AlreadyAuthenticated,
    #[error("unknown operation {0:?}")]
    UnknownOperation(String),
    #[error(transparent)]
    Table(#[from] TableError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResponseDesc;
    use serde_json::json;

    #[test]
    fn commands_use_wire_names() {
        let req: Request = serde_json::from_value(json!({"cmd": "switchState"})).unwrap();
        assert_eq!(req, Request::new(Command::SwitchState, ""));

        let req: Request = serde_json::from_value(json!({"cmd": "operate", "data": "drop"})).unwrap();
        assert_eq!(req.data, "drop");

        assert!(serde_json::from_value::<Request>(json!({"cmd": "dance"})).is_err());
    }

    #[test]
    fn responses_carry_desc_tags() {
        let v = serde_json::to_value(Response::new(ResponseDesc::AuthSuccess, 7)).unwrap();
        assert_eq!(v, json!({"desc": "authSuccess", "data": 7}));
    }
}
