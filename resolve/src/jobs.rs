use std::sync::Arc;

use async_trait::async_trait;
use facelink_kv::{KVStore, decode, encode, get_record};

use crate::error::Result;
use crate::keys::{SCAN_PREFIX, scan_key};
use crate::types::ScanStatus;

/// Durable record of scan progress, so status outlives the process that ran
/// the scan.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn save(&self, status: &ScanStatus) -> Result<()>;

    async fn load(&self, scan_id: &str) -> Result<Option<ScanStatus>>;

    /// Every recorded scan, oldest first.
    async fn list(&self) -> Result<Vec<ScanStatus>>;
}

/// [JobStore] on a [KVStore].
pub struct KvJobStore {
    store: Arc<dyn KVStore>,
}

impl KvJobStore {
    pub fn new(store: Arc<dyn KVStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl JobStore for KvJobStore {
    async fn save(&self, status: &ScanStatus) -> Result<()> {
        self.store.set(&scan_key(&status.scan_id), &encode(status)?)?;
        Ok(())
    }

    async fn load(&self, scan_id: &str) -> Result<Option<ScanStatus>> {
        Ok(get_record(self.store.as_ref(), &scan_key(scan_id))?)
    }

    async fn list(&self) -> Result<Vec<ScanStatus>> {
        let mut out = Vec::new();
        for (_, data) in self.store.scan(SCAN_PREFIX)? {
            out.push(decode::<ScanStatus>(&data)?);
        }
        out.sort_by_key(|s| s.started_at);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use facelink_kv::MemoryStore;

    use super::*;
    use crate::types::ScanState;

    #[tokio::test]
    async fn save_load_list() {
        let jobs = KvJobStore::new(Arc::new(MemoryStore::new()));
        assert!(jobs.load("s1").await.unwrap().is_none());

        let mut s = ScanStatus::started("s1");
        jobs.save(&s).await.unwrap();
        s.files = 3;
        s.state = ScanState::Completed;
        jobs.save(&s).await.unwrap();
        jobs.save(&ScanStatus::started("s2")).await.unwrap();

        let got = jobs.load("s1").await.unwrap().unwrap();
        assert_eq!(got.files, 3);
        assert_eq!(got.state, ScanState::Completed);
        assert_eq!(jobs.list().await.unwrap().len(), 2);
    }
}
