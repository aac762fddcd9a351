//! S3-backed object store

use crate::error::{CacheError, CacheResult};
use crate::storage::ObjectStore;
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use aws_sdk_s3::Client;
use tracing::debug;

/// Maximum keys accepted by one DeleteObjects request
const DELETE_BATCH: usize = 1000;

/// Object store backed by an S3-compatible service
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    /// Wrap an existing client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the ambient AWS environment
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self {
            client: Client::new(&config),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> CacheResult<Vec<u8>> {
        let resp = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| CacheError::storage(format!("fetching object {}/{}", bucket, key), e))?;

        let body = resp
            .body
            .collect()
            .await
            .map_err(|e| CacheError::storage(format!("reading object {}/{}", bucket, key), e))?;
        Ok(body.into_bytes().to_vec())
    }

    async fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> CacheResult<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| CacheError::storage(format!("writing object {}/{}", bucket, key), e))?;
        Ok(())
    }

    async fn exists(&self, bucket: &str, key: &str) -> CacheResult<bool> {
        match self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                let service = err.into_service_error();
                if service.is_not_found() {
                    Ok(false)
                } else {
                    Err(CacheError::storage(
                        format!("probing object {}/{}", bucket, key),
                        service,
                    ))
                }
            }
        }
    }

    async fn list(&self, bucket: &str, prefix: &str) -> CacheResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| {
                CacheError::storage(format!("listing objects under {}/{}", bucket, prefix), e)
            })?;
            for object in page.contents() {
                if let Some(key) = object.key() {
                    keys.push(key.to_string());
                }
            }
        }
        Ok(keys)
    }

    async fn delete_prefix(&self, bucket: &str, prefix: &str) -> CacheResult<()> {
        let keys = self.list(bucket, prefix).await?;
        if keys.is_empty() {
            return Ok(());
        }

        for batch in keys.chunks(DELETE_BATCH) {
            let objects = batch
                .iter()
                .map(|key| {
                    ObjectIdentifier::builder()
                        .key(key)
                        .build()
                        .map_err(|e| CacheError::storage("building delete request", e))
                })
                .collect::<CacheResult<Vec<_>>>()?;

            let delete = Delete::builder()
                .set_objects(Some(objects))
                .build()
                .map_err(|e| CacheError::storage("building delete request", e))?;

            self.client
                .delete_objects()
                .bucket(bucket)
                .delete(delete)
                .send()
                .await
                .map_err(|e| {
                    CacheError::storage(format!("deleting objects under {}/{}", bucket, prefix), e)
                })?;
        }

        debug!("deleted {} objects under {}/{}", keys.len(), bucket, prefix);
        Ok(())
    }
}
