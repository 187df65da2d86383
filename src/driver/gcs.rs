//! Google Cloud Storage driver over the JSON API.
//!
//! Authenticates with a caller-provided OAuth bearer token
//! (`storage.gcs_token` / `MLVAULT_GCS_TOKEN`).

use std::collections::VecDeque;
use std::fs::File;
use std::path::Path;
use std::time::Duration;

use mlvault_protocol::encode_component;
use serde::Deserialize;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;

use super::{remove_stale_destination, write_atomically, ObjectIter, StorageDriver};
use crate::error::AssetError;
use crate::rest_client::{build_http_client, expect_success, read_json, transport_error};
use crate::retry::RetryPolicy;

const API_ROOT: &str = "https://storage.googleapis.com/storage/v1";
const UPLOAD_ROOT: &str = "https://storage.googleapis.com/upload/storage/v1";

#[derive(Debug, Deserialize)]
struct ListPage {
    #[serde(default)]
    items: Vec<ListItem>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListItem {
    name: String,
}

#[derive(Debug, Clone)]
pub struct GcsStorageDriver {
    bucket: String,
    token: Option<String>,
    http: Client,
    retry: RetryPolicy,
}

impl GcsStorageDriver {
    pub fn new(
        bucket: &str,
        token: Option<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, AssetError> {
        let bucket = bucket.trim_start_matches("gs://").trim_end_matches('/');
        if bucket.is_empty() || bucket.contains('/') {
            return Err(AssetError::invalid(format!("invalid GCS bucket name `{}`", bucket)));
        }
        Ok(Self {
            bucket: bucket.to_string(),
            token,
            http: build_http_client(timeout)?,
            retry,
        })
    }

    fn object_url(&self, object_name: &str) -> String {
        format!(
            "{}/b/{}/o/{}",
            API_ROOT,
            self.bucket,
            encode_component(object_name)
        )
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn list_page(
        &self,
        prefix: &str,
        page_token: Option<&str>,
    ) -> Result<ListPage, AssetError> {
        let url = format!("{}/b/{}/o", API_ROOT, self.bucket);
        self.retry.run("gcs_list", || {
            let mut request = self.http.get(&url).query(&[("prefix", prefix)]);
            if let Some(token) = page_token {
                request = request.query(&[("pageToken", token)]);
            }
            let response = self
                .authorized(request)
                .send()
                .map_err(|e| transport_error(&url, e))?;
            let response = expect_success(&url, response)?;
            read_json(&url, response)
        })
    }
}

impl StorageDriver for GcsStorageDriver {
    fn name(&self) -> &'static str {
        "gcs"
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn upload_object(&self, file_path: &Path, object_name: &str) -> Result<(), AssetError> {
        let url = format!("{}/b/{}/o", UPLOAD_ROOT, self.bucket);
        self.retry.run("gcs_upload", || {
            let file = File::open(file_path)?;
            let request = self
                .http
                .post(&url)
                .query(&[("uploadType", "media"), ("name", object_name)])
                .header(CONTENT_TYPE, "application/octet-stream")
                .body(file);
            let response = self
                .authorized(request)
                .send()
                .map_err(|e| transport_error(&url, e))?;
            expect_success(&url, response).map(|_| ())
        })
    }

    fn download_object(
        &self,
        object_name: &str,
        destination_path: &Path,
    ) -> Result<(), AssetError> {
        let url = self.object_url(object_name);
        let result = self.retry.run("gcs_download", || {
            let request = self.http.get(&url).query(&[("alt", "media")]);
            let response = self
                .authorized(request)
                .send()
                .map_err(|e| transport_error(&url, e))?;
            if response.status() == StatusCode::NOT_FOUND {
                return Err(AssetError::not_found(&self.bucket, object_name));
            }
            let mut response = expect_success(&url, response)?;
            write_atomically(destination_path, &mut response)
        });

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                tracing::error!(bucket = %self.bucket, object = object_name, "object not found");
                remove_stale_destination(destination_path)?;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    fn delete_object(&self, object_name: &str) -> Result<(), AssetError> {
        let url = self.object_url(object_name);
        self.retry.run("gcs_delete", || {
            let response = self
                .authorized(self.http.delete(&url))
                .send()
                .map_err(|e| transport_error(&url, e))?;
            if response.status() == StatusCode::NOT_FOUND {
                return Err(AssetError::not_found(&self.bucket, object_name));
            }
            expect_success(&url, response).map(|_| ())
        })
    }

    fn exists(&self, object_name: &str) -> Result<bool, AssetError> {
        let url = self.object_url(object_name);
        self.retry.run("gcs_exists", || {
            let response = self
                .authorized(self.http.get(&url))
                .send()
                .map_err(|e| transport_error(&url, e))?;
            match response.status() {
                StatusCode::NOT_FOUND => Ok(false),
                _ => expect_success(&url, response).map(|_| true),
            }
        })
    }

    fn iterate_objects<'a>(&'a self, prefix: &str) -> ObjectIter<'a> {
        Box::new(GcsListing {
            driver: self,
            prefix: prefix.to_string(),
            buffered: VecDeque::new(),
            next_token: None,
            finished: false,
        })
    }

    fn get_object_uri(&self, object_name: &str) -> String {
        format!("gs://{}/{}", self.bucket, object_name)
    }
}

/// Pages through a listing one request at a time.
struct GcsListing<'a> {
    driver: &'a GcsStorageDriver,
    prefix: String,
    buffered: VecDeque<String>,
    next_token: Option<String>,
    finished: bool,
}

impl Iterator for GcsListing<'_> {
    type Item = Result<String, AssetError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(name) = self.buffered.pop_front() {
                return Some(Ok(name));
            }
            if self.finished {
                return None;
            }
            match self.driver.list_page(&self.prefix, self.next_token.as_deref()) {
                Ok(page) => {
                    self.buffered.extend(page.items.into_iter().map(|item| item.name));
                    self.next_token = page.next_page_token;
                    self.finished = self.next_token.is_none();
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_normalized() {
        let driver =
            GcsStorageDriver::new("gs://models/", None, Duration::from_secs(1), RetryPolicy::never())
                .unwrap();
        assert_eq!(driver.bucket(), "models");
        assert_eq!(driver.get_object_uri("dev/m/0.1/a"), "gs://models/dev/m/0.1/a");
        assert!(driver.object_url("dev/m/0.1/a").ends_with("/o/dev%2Fm%2F0.1%2Fa"));
    }

    #[test]
    fn test_invalid_bucket() {
        assert!(GcsStorageDriver::new("", None, Duration::from_secs(1), RetryPolicy::never()).is_err());
    }
}
