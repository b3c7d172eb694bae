use crate::types::{SignalOpinion, SignalSource};
use moka::future::Cache;
use std::time::Duration;

/// Per-(source, domain) memo of collector opinions.
///
/// Entries expire after a fixed time-to-live and are independent of each
/// other, so concurrent analyses of the same domain simply overwrite each
/// other's identical results.
#[derive(Clone)]
pub struct OpinionCache {
    inner: Cache<(SignalSource, String), SignalOpinion>,
}

impl OpinionCache {
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        let inner = Cache::builder()
            .time_to_live(ttl)
            .max_capacity(max_capacity)
            .build();
        Self { inner }
    }

    pub async fn get(&self, source: SignalSource, domain: &str) -> Option<SignalOpinion> {
        self.inner.get(&(source, domain.to_string())).await
    }

    /// Failed opinions are never memoized; the next analysis retries the source.
    pub async fn insert(&self, domain: &str, opinion: &SignalOpinion) {
        if opinion.failed {
            return;
        }
        self.inner
            .insert((opinion.source, domain.to_string()), opinion.clone())
            .await;
    }

    pub async fn invalidate(&self, source: SignalSource, domain: &str) {
        self.inner.invalidate(&(source, domain.to_string())).await;
    }
}
