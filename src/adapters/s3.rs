//! Report archive uploads to S3.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use std::path::Path;

use crate::collaborators::ObjectStorage;
use crate::config::StorageConfig;
use crate::error::{BenchError, Result};

/// Uploads archives to a bucket, keyed by the archive's file name.
#[derive(Debug, Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
}

impl S3Storage {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Builds a client from the ambient AWS configuration (environment, profile, SSO).
    pub async fn from_config(config: &StorageConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let shared_config = loader.load().await;
        Self::new(Client::new(&shared_config), &config.bucket)
    }

    fn delivery_error(&self, message: String) -> BenchError {
        BenchError::Delivery {
            target: format!("s3://{}", self.bucket),
            message,
        }
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn upload_archive(&self, path: &Path) -> Result<Option<String>> {
        let key = object_key(path)
            .ok_or_else(|| self.delivery_error(format!("{} has no file name", path.display())))?;

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| self.delivery_error(e.to_string()))?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(body)
            .content_type("application/zip")
            .send()
            .await
            .map_err(|e| self.delivery_error(e.to_string()))?;

        let url = object_url(&self.bucket, &key);
        tracing::info!(bucket = %self.bucket, key = %key, "Archive uploaded");
        Ok(Some(url))
    }
}

/// Object key for an archive: its file name.
fn object_key(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

fn object_url(bucket: &str, key: &str) -> String {
    format!("https://{bucket}.s3.amazonaws.com/{key}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_the_archive_file_name() {
        let path = Path::new("/reports/oltp-1a2b3c4d.zip");
        assert_eq!(object_key(path).as_deref(), Some("oltp-1a2b3c4d.zip"));
        assert_eq!(object_key(Path::new("/")), None);
    }

    #[test]
    fn url_is_virtual_hosted_style() {
        assert_eq!(
            object_url("vitess-bench", "tpcc-0f0f0f0f.zip"),
            "https://vitess-bench.s3.amazonaws.com/tpcc-0f0f0f0f.zip"
        );
    }
}
