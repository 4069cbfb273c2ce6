//! The control-plane protocol between coordinator and workers.
//!
//! Every call is one length-prefixed JSON request followed by one
//! length-prefixed JSON response on a fresh connection. There is no session
//! state; workers drive all interaction.

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub mod client;
pub mod codec;

/// Method name for task requests.
pub const REQUEST_TASK: &str = "request_task";
/// Method name for completion reports.
pub const COMPLETE_TASK: &str = "complete_task";

/// Request envelope: `{"method":…,"params":{…}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl Request {
    pub fn request_task(worker_id: &str) -> Result<Self> {
        Ok(Self {
            method: REQUEST_TASK.to_string(),
            params: serde_json::to_value(RequestTaskParams {
                worker_id: worker_id.to_string(),
            })?,
        })
    }

    pub fn complete_task(params: &CompleteTaskParams) -> Result<Self> {
        Ok(Self {
            method: COMPLETE_TASK.to_string(),
            params: serde_json::to_value(params)?,
        })
    }
}

/// Response envelope: `{"success":…,"result":{…},"error":…}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok<T: Serialize>(result: &T) -> Result<Self> {
        Ok(Self {
            success: true,
            result: Some(serde_json::to_value(result)?),
            error: None,
        })
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(message.into()),
        }
    }

    /// Unwrap the envelope into the typed result, surfacing the server's
    /// error string on failure.
    pub fn into_result<T: DeserializeOwned>(self) -> Result<T> {
        if !self.success {
            bail!(
                "rpc error: {}",
                self.error.unwrap_or_else(|| "unspecified".to_string())
            );
        }
        let value = self.result.context("rpc response missing result")?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Params for `request_task`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestTaskParams {
    pub worker_id: String,
}

/// The two kinds of work a task can be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Map,
    Reduce,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Map => write!(f, "map"),
            TaskKind::Reduce => write!(f, "reduce"),
        }
    }
}

/// Params for `complete_task`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteTaskParams {
    pub worker_id: String,
    pub task_kind: TaskKind,
    pub task_id: u32,
    pub success: bool,
}

/// Result of `request_task`, tagged by the `reply` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reply")]
pub enum TaskReply {
    /// Run map task `task_id` over `input_file`, partitioning into
    /// `n_reduce` buckets.
    #[serde(rename = "ASSIGN_MAP")]
    AssignMap {
        task_id: u32,
        input_file: String,
        n_reduce: u32,
    },
    /// Run reduce task `task_id`; the worker infers the intermediate-file
    /// set `mr-{0..n_map}-{task_id}`.
    #[serde(rename = "ASSIGN_REDUCE")]
    AssignReduce { task_id: u32, n_map: u32 },
    /// Nothing assignable right now; ask again shortly.
    #[serde(rename = "WAIT")]
    Wait,
    /// The job is complete; terminate cleanly.
    #[serde(rename = "EXIT")]
    Exit,
}

/// Result of `complete_task`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteTaskAck {
    pub acknowledged: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_reply_uses_the_documented_tag() {
        let reply = TaskReply::AssignMap {
            task_id: 2,
            input_file: "a.txt".to_string(),
            n_reduce: 3,
        };
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["reply"], "ASSIGN_MAP");
        assert_eq!(json["task_id"], 2);
        assert_eq!(json["input_file"], "a.txt");
        assert_eq!(json["n_reduce"], 3);

        let wait: TaskReply = serde_json::from_str(r#"{"reply":"WAIT"}"#).unwrap();
        assert_eq!(wait, TaskReply::Wait);
    }

    #[test]
    fn task_kind_is_lowercase_on_the_wire() {
        assert_eq!(serde_json::to_string(&TaskKind::Map).unwrap(), r#""map""#);
        assert_eq!(
            serde_json::from_str::<TaskKind>(r#""reduce""#).unwrap(),
            TaskKind::Reduce
        );
    }

    #[test]
    fn error_response_surfaces_in_into_result() {
        let response = Response::err("unknown method: bogus");
        let result = response.into_result::<CompleteTaskAck>();
        let err = result.unwrap_err().to_string();
        assert!(err.contains("unknown method"), "{}", err);
    }
}
