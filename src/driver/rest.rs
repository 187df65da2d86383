//! Driver backed by the `mlvault-server` object API.

use std::path::Path;
use std::time::Duration;

use super::{remove_stale_destination, ObjectIter, StorageDriver};
use crate::error::AssetError;
use crate::rest_client::RestClient;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct RestStorageDriver {
    client: RestClient,
}

impl RestStorageDriver {
    pub fn new(base_url: &str, timeout: Duration, retry: RetryPolicy) -> Result<Self, AssetError> {
        Ok(Self {
            client: RestClient::new(base_url, timeout, retry)?,
        })
    }

    pub fn client(&self) -> &RestClient {
        &self.client
    }
}

impl StorageDriver for RestStorageDriver {
    fn name(&self) -> &'static str {
        "rest"
    }

    fn bucket(&self) -> &str {
        self.client.base_url()
    }

    fn upload_object(&self, file_path: &Path, object_name: &str) -> Result<(), AssetError> {
        mlvault_protocol::validate_key(object_name)?;
        // PUT replaces the object server-side; no separate delete round trip.
        self.client.put_object(object_name, file_path)
    }

    fn download_object(
        &self,
        object_name: &str,
        destination_path: &Path,
    ) -> Result<(), AssetError> {
        mlvault_protocol::validate_key(object_name)?;
        match self.client.get_object(object_name, destination_path) {
            Ok(bytes) => {
                tracing::debug!(object = object_name, bytes, "downloaded object");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                remove_stale_destination(destination_path)?;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    fn delete_object(&self, object_name: &str) -> Result<(), AssetError> {
        mlvault_protocol::validate_key(object_name)?;
        self.client.delete_object(object_name)
    }

    fn exists(&self, object_name: &str) -> Result<bool, AssetError> {
        mlvault_protocol::validate_key(object_name)?;
        self.client.head_object(object_name)
    }

    fn iterate_objects<'a>(&'a self, prefix: &str) -> ObjectIter<'a> {
        match self.client.list_objects(prefix) {
            Ok(keys) => Box::new(keys.into_iter().map(Ok)),
            Err(e) => Box::new(std::iter::once(Err(e))),
        }
    }

    fn get_object_uri(&self, object_name: &str) -> String {
        format!(
            "{}{}",
            self.client.base_url(),
            mlvault_protocol::object_path(object_name)
        )
    }
}
