//! Asynchronous metric scoring, seen by the orchestrator only through
//! start/stop and aggregated status counts.

use crate::model::StatusCounts;
use async_trait::async_trait;

pub mod worker;

pub use worker::DeferredEvaluator;

#[async_trait]
pub trait ScoringBackend: Send + Sync {
    /// Starts background scoring. Returns without waiting for any job.
    async fn start(&self) -> anyhow::Result<()>;

    /// Stops background scoring. Stopping a stopped backend is a no-op.
    async fn stop(&self) -> anyhow::Result<()>;

    /// Current job counts per status for the given datasets (all of them
    /// when `app_ids` is empty). Advisory and eventually consistent.
    async fn status_counts(&self, app_ids: &[String]) -> anyhow::Result<StatusCounts>;
}
