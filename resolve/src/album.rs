use std::sync::Arc;

use async_trait::async_trait;
use facelink_kv::{KVStore, WriteOp, encode, get_record};

use crate::error::Result;
use crate::keys::{album_cluster_key, album_key};
use crate::types::{Identity, IdentityCluster};

/// Store of confirmed identities and their accumulated face clusters.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn get(&self, identity_id: &str) -> Result<Option<Identity>>;

    async fn upsert(&self, identity: &Identity) -> Result<()>;

    async fn cluster(&self, identity_id: &str) -> Result<Option<IdentityCluster>>;

    /// Persist an identity together with its confirmed cluster.
    async fn upsert_with_cluster(&self, identity: &Identity, cluster: &IdentityCluster)
    -> Result<()>;
}

/// [IdentityStore] on a [KVStore].
pub struct KvIdentityStore {
    store: Arc<dyn KVStore>,
}

impl KvIdentityStore {
    pub fn new(store: Arc<dyn KVStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl IdentityStore for KvIdentityStore {
    async fn get(&self, identity_id: &str) -> Result<Option<Identity>> {
        Ok(get_record(self.store.as_ref(), &album_key(identity_id))?)
    }

    async fn upsert(&self, identity: &Identity) -> Result<()> {
        self.store.set(&album_key(&identity.id), &encode(identity)?)?;
        Ok(())
    }

    async fn cluster(&self, identity_id: &str) -> Result<Option<IdentityCluster>> {
        Ok(get_record(
            self.store.as_ref(),
            &album_cluster_key(identity_id),
        )?)
    }

    async fn upsert_with_cluster(
        &self,
        identity: &Identity,
        cluster: &IdentityCluster,
    ) -> Result<()> {
        self.store.apply(&[
            WriteOp::put(album_key(&identity.id), encode(identity)?),
            WriteOp::put(album_cluster_key(&cluster.identity_id), encode(cluster)?),
        ])?;
        Ok(())
    }
}
