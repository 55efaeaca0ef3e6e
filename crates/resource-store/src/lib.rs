//! Versioned Object Store
//!
//! A narrow view of the Kubernetes API used by the website controller:
//! fetch, create, replace and status-replace of namespaced objects, with
//! every write guarded by the object's `resourceVersion`.
//!
//! # Example
//!
//! ```no_run
//! use k8s_openapi::api::core::v1::ConfigMap;
//! use resource_store::{KubeStore, ObjectStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = kube::Client::try_default().await?;
//! let store: KubeStore<ConfigMap> = KubeStore::new(client);
//!
//! if let Some(mut cm) = store.get("default", "demo-content").await? {
//!     cm.data.get_or_insert_with(Default::default)
//!         .insert("index.html".to_string(), "<h1>hi</h1>".to_string());
//!     // Fails with StoreError::Conflict if someone else wrote in between
//!     store.replace("default", &cm).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
#[path = "trait.rs"]
pub mod store_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::KubeStore;
pub use error::StoreError;
pub use store_trait::ObjectStore;
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockStore;
