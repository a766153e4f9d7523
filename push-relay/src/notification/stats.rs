//! Persisted delivery counter.

use std::sync::Arc;

use crate::Result;
use crate::database::repositories::SubscriberRepository;

/// Append-only counter of successful deliveries.
///
/// Increments go straight to the store as a single `UPDATE ... + n`, so
/// concurrent broadcasts never lose each other's counts.
#[derive(Clone)]
pub struct StatsAccumulator {
    repo: Arc<dyn SubscriberRepository>,
}

impl StatsAccumulator {
    pub fn new(repo: Arc<dyn SubscriberRepository>) -> Self {
        Self { repo }
    }

    pub async fn increment(&self, n: u64) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        self.repo.increment_counter(n).await
    }

    pub async fn read(&self) -> Result<u64> {
        self.repo.read_counter().await
    }
}
