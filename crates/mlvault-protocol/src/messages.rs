//! Request and response bodies for the blob-service endpoints.

use serde::{Deserialize, Serialize};

/// Multipart field names for `POST /push`.
pub struct PushFields;

impl PushFields {
    pub const NAME: &'static str = "name";
    pub const VERSION: &'static str = "version";
    pub const ENV: &'static str = "env";
    pub const FILENAME: &'static str = "filename";
    pub const FILE: &'static str = "file";
}

/// Multipart field names for `POST /deploy`.
pub struct DeployFields;

impl DeployFields {
    pub const NAME: &'static str = "name";
    pub const VERSION: &'static str = "version";
    pub const TARGET: &'static str = "target";
    pub const FILE: &'static str = "file";
}

/// Query string of `GET /clone`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CloneQuery {
    pub name: String,
    pub version: String,
    pub env: String,
}

/// Query string of `GET /objects`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ObjectListQuery {
    #[serde(default)]
    pub prefix: String,
}

/// Response of `GET /objects`: every key under the prefix, sorted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ObjectList {
    pub keys: Vec<String>,
}

/// Response of the mutating endpoints (`/push`, `/deploy`, `PUT /objects`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusResponse {
    /// `"ok"` on success.
    pub status: String,
    /// Human-readable outcome, e.g. the path written.
    pub details: String,
}

impl StatusResponse {
    pub fn ok(details: impl Into<String>) -> Self {
        Self {
            status: "ok".to_string(),
            details: details.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_response_ok() {
        let resp = StatusResponse::ok("written dev/m/0.1/a.txt");
        assert!(resp.is_ok());
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[test]
    fn test_object_list_query_default_prefix() {
        let query: ObjectListQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(query.prefix, "");
    }
}
