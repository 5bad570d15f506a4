//! Object store construction from configuration.

use object_store::ObjectStore;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use std::sync::Arc;

use crate::config::StoreBackend;

/// Build the object store described by `backend`
///
/// S3 credentials are read from the standard AWS environment variables.
pub fn build_object_store(backend: &StoreBackend) -> crate::Result<Arc<dyn ObjectStore>> {
    match backend {
        StoreBackend::S3 {
            bucket,
            region,
            endpoint,
        } => {
            let mut builder = AmazonS3Builder::from_env()
                .with_bucket_name(bucket)
                .with_region(region);

            if let Some(endpoint) = endpoint {
                builder = builder
                    .with_endpoint(endpoint)
                    .with_allow_http(endpoint.starts_with("http://"));
            }

            let store = builder.build()?;
            tracing::debug!(bucket = %bucket, region = %region, "S3 object store ready");
            Ok(Arc::new(store))
        }
        StoreBackend::Local { root } => {
            std::fs::create_dir_all(root)?;
            let store = LocalFileSystem::new_with_prefix(root)?;
            tracing::debug!(root = %root.display(), "local object store ready");
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => Ok(Arc::new(InMemory::new())),
    }
}
