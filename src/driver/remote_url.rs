//! `scheme://bucket/object` locators for assets whose source lives in a
//! remote bucket rather than on the local disk.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex_lite::Regex;

use super::DriverKind;
use crate::error::AssetError;

const REMOTE_URL_PATTERN: &str = r"^(?P<scheme>[A-Za-z0-9]*)://(?P<bucket>[A-Za-z0-9_\-.]+)/(?P<object>.+)$";

fn remote_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(REMOTE_URL_PATTERN).expect("remote url pattern is valid"))
}

/// A parsed remote locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteUrl {
    pub kind: DriverKind,
    pub scheme: String,
    pub bucket: String,
    pub object_name: String,
}

impl RemoteUrl {
    pub fn parse(url: &str) -> Result<Self, AssetError> {
        let caps = remote_url_regex()
            .captures(url)
            .ok_or_else(|| AssetError::invalid(format!("not a remote url: {}", url)))?;

        let scheme = caps["scheme"].to_ascii_lowercase();
        let kind = match scheme.as_str() {
            "file" => DriverKind::Local,
            "gs" => DriverKind::Gcs,
            "http" | "https" => DriverKind::Rest,
            other => {
                return Err(AssetError::invalid(format!(
                    "unrecognized storage prefix `{}://` in {}",
                    other, url
                )))
            }
        };

        Ok(Self {
            kind,
            scheme,
            bucket: caps["bucket"].to_string(),
            object_name: caps["object"].to_string(),
        })
    }

    /// Cheap syntactic test used to decide whether a push source is remote.
    pub fn looks_remote(source: &str) -> bool {
        remote_url_regex().is_match(source)
    }
}

impl FromStr for RemoteUrl {
    type Err = AssetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RemoteUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.scheme, self.bucket, self.object_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gcs() {
        let url = RemoteUrl::parse("gs://ml-exports/runs/2024/model.bin").unwrap();
        assert_eq!(url.kind, DriverKind::Gcs);
        assert_eq!(url.bucket, "ml-exports");
        assert_eq!(url.object_name, "runs/2024/model.bin");
        assert_eq!(url.to_string(), "gs://ml-exports/runs/2024/model.bin");
    }

    #[test]
    fn test_parse_http_and_file() {
        assert_eq!(RemoteUrl::parse("http://store/a").unwrap().kind, DriverKind::Rest);
        assert_eq!(RemoteUrl::parse("file://store/a/b").unwrap().kind, DriverKind::Local);
    }

    #[test]
    fn test_unknown_scheme_rejected() {
        let err = RemoteUrl::parse("s3://bucket/key").unwrap_err();
        assert!(matches!(err, AssetError::InvalidReference(_)));
        assert!(err.to_string().contains("s3://"));
    }

    #[test]
    fn test_not_a_url() {
        assert!(RemoteUrl::parse("/local/path").is_err());
        assert!(!RemoteUrl::looks_remote("./models/weights"));
        assert!(RemoteUrl::looks_remote("gs://b/o"));
    }
}
