//! Discriminated operation responses
//!
//! Every operation answers `{ok: true, data}` or `{ok: false, kind,
//! message}`. Human-readable diagnostics go to tracing, never into the
//! response channel.

use recoder_store::Error;
use serde::Serialize;
use serde_json::Value;

/// Structured result of one operation
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Response {
    Success { ok: bool, data: Value },
    Failure { ok: bool, kind: String, message: String },
}

impl Response {
    /// Successful response carrying serialisable data
    pub fn success(data: impl Serialize) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => Response::Success { ok: true, data },
            Err(err) => Response::Failure {
                ok: false,
                kind: "IoError".to_string(),
                message: format!("Failed to encode response data: {err}"),
            },
        }
    }

    /// Failure response derived from the store error taxonomy
    pub fn failure(err: &Error) -> Self {
        Response::Failure {
            ok: false,
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }

    /// Collapse a store result into a response
    pub fn from_result<T: Serialize>(result: recoder_store::Result<T>) -> Self {
        match result {
            Ok(data) => Response::success(data),
            Err(err) => Response::failure(&err),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Response::Success { .. })
    }

    /// Payload of a successful response
    pub fn data(&self) -> Option<&Value> {
        match self {
            Response::Success { data, .. } => Some(data),
            Response::Failure { .. } => None,
        }
    }

    /// Error kind of a failed response
    pub fn error_kind(&self) -> Option<&str> {
        match self {
            Response::Success { .. } => None,
            Response::Failure { kind, .. } => Some(kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_shape() {
        let response = Response::success(serde_json::json!({"saveNumber": 3}));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["ok"], true);
        assert_eq!(value["data"]["saveNumber"], 3);
    }

    #[test]
    fn test_failure_shape() {
        let response = Response::failure(&Error::NotActivated);
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["ok"], false);
        assert_eq!(value["kind"], "NotActivated");
        assert!(value["message"].as_str().unwrap().contains("cache directory"));
    }

    #[test]
    fn test_from_result() {
        let ok: recoder_store::Result<u32> = Ok(7);
        assert!(Response::from_result(ok).is_ok());

        let err: recoder_store::Result<u32> = Err(Error::NoBaseline);
        let response = Response::from_result(err);
        assert_eq!(response.error_kind(), Some("NoBaseline"));
    }
}
