use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const SUCCESS_MSG: &str = "data returned";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeStatus {
    Success,
    Error,
}

/// The `{status, data, msg}` shape every file request answers with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub status: EnvelopeStatus,
    pub data: String,
    pub msg: String,
}

impl ResponseEnvelope {
    pub fn success(data: impl Into<String>) -> Self {
        Self {
            status: EnvelopeStatus::Success,
            data: data.into(),
            msg: SUCCESS_MSG.to_string(),
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            status: EnvelopeStatus::Error,
            data: String::new(),
            msg: msg.into(),
        }
    }

    /// Error envelope with the filename-bearing prefix used for every
    /// retrieval failure.
    pub fn retrieval_error(filename: &str, detail: impl std::fmt::Display) -> Self {
        Self::error(format!(
            "there was an error retrieving {}, {}",
            filename, detail
        ))
    }
}

/// Body returned by the proxy for `/file/{filename}`.
///
/// A document printed by the remote script is relayed as-is; anything the
/// proxy had to diagnose itself is a locally built error envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FileReply {
    Relayed(Value),
    Failed(ResponseEnvelope),
}

impl FileReply {
    /// Status label for logs. Relayed documents are not validated, so a
    /// missing or non-string `status` is reported as `relayed`.
    pub fn status_label(&self) -> &str {
        match self {
            FileReply::Relayed(doc) => doc
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("relayed"),
            FileReply::Failed(_) => "error",
        }
    }
}
