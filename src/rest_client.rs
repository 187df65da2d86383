//! Blocking HTTP client for the `mlvault-server` blob service.
//!
//! Covers both the object API the [`RestStorageDriver`](crate::driver::RestStorageDriver)
//! is built on and the whole-version `push` / `clone` / `deploy` endpoints
//! the CLI exposes. Every request goes through the client's [`RetryPolicy`].

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mlvault_protocol::{
    archive, object_path, CloneQuery, DeployFields, ErrorBody, ObjectList, PushFields,
    StatusResponse, ARCHIVE_CONTENT_TYPE, CLONE_PATH, DEPLOY_PATH, OBJECTS_PATH, PUSH_PATH,
};
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, Response};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use walkdir::WalkDir;

use crate::driver::write_atomically;
use crate::error::AssetError;
use crate::retry::RetryPolicy;

/// Prefix of the staging directory `clone_version` unpacks into.
const CLONE_STAGING_PREFIX: &str = ".mlvault-clone-";

#[derive(Debug, Clone)]
pub struct RestClient {
    base_url: String,
    http: Client,
    retry: RetryPolicy,
}

impl RestClient {
    pub fn new(base_url: &str, timeout: Duration, retry: RetryPolicy) -> Result<Self, AssetError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(AssetError::invalid(format!(
                "blob service url must start with http:// or https://, got `{}`",
                base_url
            )));
        }

        Ok(Self {
            base_url,
            http: build_http_client(timeout)?,
            retry,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // --- Object API ---------------------------------------------------------

    pub fn put_object(&self, key: &str, file_path: &Path) -> Result<(), AssetError> {
        let url = self.url(&object_path(key));
        self.retry.run("put_object", || {
            let file = File::open(file_path)?;
            let response = self
                .http
                .put(&url)
                .header(CONTENT_TYPE, "application/octet-stream")
                .body(file)
                .send()
                .map_err(|e| transport_error(&url, e))?;
            expect_success(&url, response).map(|_| ())
        })
    }

    /// Stream the object into `destination` (atomic). 404 → `ObjectNotFound`.
    pub fn get_object(&self, key: &str, destination: &Path) -> Result<u64, AssetError> {
        let url = self.url(&object_path(key));
        self.retry.run("get_object", || {
            let response = self
                .http
                .get(&url)
                .send()
                .map_err(|e| transport_error(&url, e))?;
            if response.status() == StatusCode::NOT_FOUND {
                return Err(AssetError::not_found(&self.base_url, key));
            }
            let mut response = expect_success(&url, response)?;
            write_atomically(destination, &mut response)
        })
    }

    pub fn head_object(&self, key: &str) -> Result<bool, AssetError> {
        let url = self.url(&object_path(key));
        self.retry.run("head_object", || {
            let response = self
                .http
                .head(&url)
                .send()
                .map_err(|e| transport_error(&url, e))?;
            match response.status() {
                StatusCode::NOT_FOUND => Ok(false),
                _ => expect_success(&url, response).map(|_| true),
            }
        })
    }

    pub fn delete_object(&self, key: &str) -> Result<(), AssetError> {
        let url = self.url(&object_path(key));
        self.retry.run("delete_object", || {
            let response = self
                .http
                .delete(&url)
                .send()
                .map_err(|e| transport_error(&url, e))?;
            if response.status() == StatusCode::NOT_FOUND {
                return Err(AssetError::not_found(&self.base_url, key));
            }
            expect_success(&url, response).map(|_| ())
        })
    }

    pub fn list_objects(&self, prefix: &str) -> Result<Vec<String>, AssetError> {
        let url = self.url(OBJECTS_PATH);
        self.retry.run("list_objects", || {
            let response = self
                .http
                .get(&url)
                .query(&[("prefix", prefix)])
                .send()
                .map_err(|e| transport_error(&url, e))?;
            let response = expect_success(&url, response)?;
            let list: ObjectList = read_json(&url, response)?;
            Ok(list.keys)
        })
    }

    // --- Whole-version endpoints ------------------------------------------

    /// Upload every file below `asset_path` with one `POST /push` each.
    /// File parts stream from disk. Returns the relative paths pushed, sorted.
    pub fn push(
        &self,
        asset_path: &Path,
        name: &str,
        version: &str,
        env: &str,
    ) -> Result<Vec<String>, AssetError> {
        let files = relative_files(asset_path)?;
        let url = self.url(PUSH_PATH);

        for (relative, full) in &files {
            self.retry.run("push", || {
                let file = Part::file(full)?
                    .file_name(relative.clone())
                    .mime_str("application/octet-stream")
                    .map_err(|e| transport_error(&url, e))?;
                let form = Form::new()
                    .text(PushFields::NAME, name.to_string())
                    .text(PushFields::VERSION, version.to_string())
                    .text(PushFields::ENV, env.to_string())
                    .text(PushFields::FILENAME, relative.clone())
                    .part(PushFields::FILE, file);
                let response = self
                    .http
                    .post(&url)
                    .multipart(form)
                    .send()
                    .map_err(|e| transport_error(&url, e))?;
                let response = expect_success(&url, response)?;
                let status: StatusResponse = read_json(&url, response)?;
                if !status.is_ok() {
                    return Err(AssetError::Http {
                        status: 200,
                        url: url.clone(),
                        message: status.details,
                    });
                }
                Ok(())
            })?;
            tracing::debug!(file = %relative, name, version, env, "pushed file");
        }

        Ok(files.into_iter().map(|(relative, _)| relative).collect())
    }

    /// Download a whole version as tar.gz and unpack it into `destination`.
    ///
    /// Each attempt unpacks into a fresh staging directory inside
    /// `destination`; files are moved into place only once the whole
    /// archive has been read, so a failed attempt leaves `destination`
    /// as it was.
    pub fn clone_version(
        &self,
        name: &str,
        version: &str,
        env: &str,
        destination: &Path,
    ) -> Result<Vec<String>, AssetError> {
        let query = CloneQuery {
            name: name.to_string(),
            version: version.to_string(),
            env: env.to_string(),
        };
        let url = self.url(CLONE_PATH);
        let object = format!("{}/{}/{}", query.env, query.name, query.version);
        fs::create_dir_all(destination)?;

        self.retry.run("clone", || {
            let response = self
                .http
                .get(&url)
                .query(&query)
                .send()
                .map_err(|e| transport_error(&url, e))?;
            if response.status() == StatusCode::NOT_FOUND {
                return Err(AssetError::not_found(&self.base_url, &object));
            }
            let response = expect_success(&url, response)?;

            let staging = tempfile::Builder::new()
                .prefix(CLONE_STAGING_PREFIX)
                .tempdir_in(destination)?;
            let files = archive::unpack_archive(response, staging.path())?;
            for relative in &files {
                let target = destination.join(relative);
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::rename(staging.path().join(relative), &target)?;
            }
            Ok(files)
        })
    }

    /// Pack `asset_path` and deploy it under `target` on the server. The
    /// archive is built in a temp file and streamed from there.
    pub fn deploy(
        &self,
        asset_path: &Path,
        name: &str,
        version: &str,
        target: &str,
    ) -> Result<StatusResponse, AssetError> {
        let mut packed = tempfile::NamedTempFile::new()?;
        let count = archive::pack_directory(asset_path, packed.as_file_mut())?;
        packed.as_file_mut().flush()?;
        tracing::info!(name, version, target, files = count, "deploying asset");

        let url = self.url(DEPLOY_PATH);
        let filename = format!("{}-{}.tar.gz", name.replace('/', "_"), version);

        self.retry.run("deploy", || {
            let archive_part = Part::file(packed.path())?
                .file_name(filename.clone())
                .mime_str(ARCHIVE_CONTENT_TYPE)
                .map_err(|e| transport_error(&url, e))?;
            let form = Form::new()
                .text(DeployFields::NAME, name.to_string())
                .text(DeployFields::VERSION, version.to_string())
                .text(DeployFields::TARGET, target.to_string())
                .part(DeployFields::FILE, archive_part);
            let response = self
                .http
                .post(&url)
                .multipart(form)
                .send()
                .map_err(|e| transport_error(&url, e))?;
            let response = expect_success(&url, response)?;
            read_json(&url, response)
        })
    }
}

/// Regular files below `root` (or `root` itself when it is a file), keyed
/// by their `/`-separated relative path.
fn relative_files(root: &Path) -> Result<Vec<(String, PathBuf)>, AssetError> {
    if root.is_file() {
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| AssetError::invalid(format!("no file name in {}", root.display())))?;
        return Ok(vec![(name, root.to_path_buf())]);
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(rel) = entry.path().strip_prefix(root) {
            let key = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            files.push((key, entry.path().to_path_buf()));
        }
    }
    files.sort();
    Ok(files)
}

pub(crate) fn build_http_client(timeout: Duration) -> Result<Client, AssetError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AssetError::Config(format!("cannot build HTTP client: {}", e)))
}

pub(crate) fn transport_error(url: &str, error: reqwest::Error) -> AssetError {
    if error.is_timeout() || error.is_connect() || error.is_request() || error.is_body() {
        return AssetError::Transient(format!("{}: {}", url, error));
    }
    match error.status() {
        Some(status) => AssetError::from_status(status.as_u16(), url, error.to_string()),
        None => AssetError::Http {
            status: 0,
            url: url.to_string(),
            message: error.to_string(),
        },
    }
}

pub(crate) fn expect_success(url: &str, response: Response) -> Result<Response, AssetError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| format!("{}: {}", body.error.code, body.error.message))
        .unwrap_or(text);
    Err(AssetError::from_status(status.as_u16(), url, message))
}

pub(crate) fn read_json<T: serde::de::DeserializeOwned>(
    url: &str,
    response: Response,
) -> Result<T, AssetError> {
    let text = response
        .text()
        .map_err(|e| AssetError::Transient(format!("{}: reading response: {}", url, e)))?;
    Ok(serde_json::from_str(&text)?)
}
