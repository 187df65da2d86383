//! mlvault blob-service protocol
//!
//! Shared wire types for the REST storage driver (client side) and the
//! `mlvault-server` blob service: endpoint paths, multipart field names, error codes
//! and the tar.gz archive format used by `clone` and `deploy`.

pub mod archive;
pub mod error;
pub mod key;
pub mod messages;

pub use archive::{pack_directory, unpack_archive, ArchiveError};
pub use error::{ApiError, ErrorBody, ErrorCode};
pub use key::{encode_component, encode_key, validate_key, validate_prefix, KeyError};
pub use messages::{
    CloneQuery, DeployFields, ObjectList, ObjectListQuery, PushFields, StatusResponse,
};

/// Push a single file of an asset version.
pub const PUSH_PATH: &str = "/push";

/// Download a whole asset version as a gzip-compressed tarball.
pub const CLONE_PATH: &str = "/clone";

/// Upload a gzip-compressed tarball to be unpacked in a deployment directory.
pub const DEPLOY_PATH: &str = "/deploy";

/// Raw object API root (`/objects/{key}` and `/objects?prefix=`).
pub const OBJECTS_PATH: &str = "/objects";

/// Liveness check.
pub const HEALTH_PATH: &str = "/health";

/// Content type used for clone and deploy archives.
pub const ARCHIVE_CONTENT_TYPE: &str = "application/gzip";

/// Build the URL path for a single object key.
pub fn object_path(key: &str) -> String {
    format!("{}/{}", OBJECTS_PATH, encode_key(key.trim_start_matches('/')))
}
