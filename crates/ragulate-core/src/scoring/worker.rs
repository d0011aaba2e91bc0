use super::ScoringBackend;
use crate::compare::extract::extract_contexts;
use crate::engine::cancel::CancelToken;
use crate::feedback_api::{Feedback, FeedbackInput, FeedbackOutcome};
use crate::model::{FeedbackStatus, StatusCounts};
use crate::storage::{FeedbackJob, Store};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};

/// dataset name -> query -> expected response
pub type GoldenIndex = HashMap<String, HashMap<String, String>>;

/// Scores pending jobs of one recipe store in a background task.
///
/// Jobs are claimed from the store (`none` -> `running`) and resolved to
/// `done`, `failed` or `skipped`. At most `workers` feedback calls run at
/// once.
pub struct DeferredEvaluator {
    store: Store,
    feedbacks: Arc<HashMap<String, Arc<dyn Feedback>>>,
    golden: Arc<GoldenIndex>,
    workers: usize,
    poll_interval: Duration,
    job_timeout: Duration,
    stop_timeout: Duration,
    state: Mutex<Option<Running>>,
}

struct Running {
    cancel: CancelToken,
    handle: JoinHandle<()>,
}

impl DeferredEvaluator {
    pub fn new(store: Store, feedbacks: Vec<Arc<dyn Feedback>>, golden: GoldenIndex) -> Self {
        let feedbacks = feedbacks
            .into_iter()
            .map(|f| (f.name().to_string(), f))
            .collect();
        Self {
            store,
            feedbacks: Arc::new(feedbacks),
            golden: Arc::new(golden),
            workers: 4,
            poll_interval: Duration::from_millis(200),
            job_timeout: Duration::from_secs(120),
            stop_timeout: Duration::from_secs(10),
            state: Mutex::new(None),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn is_running(&self) -> bool {
        self.state
            .lock()
            .map(|s| s.as_ref().is_some_and(|r| !r.handle.is_finished()))
            .unwrap_or(false)
    }

    fn job_context(&self) -> JobContext {
        JobContext {
            store: self.store.clone(),
            feedbacks: self.feedbacks.clone(),
            golden: self.golden.clone(),
            job_timeout: self.job_timeout,
        }
    }
}

#[async_trait]
impl ScoringBackend for DeferredEvaluator {
    async fn start(&self) -> anyhow::Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow::anyhow!("scoring state lock poisoned"))?;
        if state.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return Ok(());
        }

        let requeued = self.store.requeue_running()?;
        if requeued > 0 {
            tracing::info!(event = "scoring.requeue", requeued, "requeued stale running jobs");
        }

        let cancel = CancelToken::new();
        let handle = tokio::spawn(worker_loop(
            self.job_context(),
            self.workers,
            self.poll_interval,
            cancel.clone(),
        ));
        *state = Some(Running { cancel, handle });
        tracing::debug!(event = "scoring.start", workers = self.workers);
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        let running = self
            .state
            .lock()
            .map_err(|_| anyhow::anyhow!("scoring state lock poisoned"))?
            .take();
        let Some(Running { cancel, mut handle }) = running else {
            return Ok(());
        };

        cancel.cancel();
        match tokio::time::timeout(self.stop_timeout, &mut handle).await {
            Ok(_) => tracing::debug!(event = "scoring.stop", "scoring worker stopped"),
            Err(_) => {
                // Aborting drops in-flight jobs; they stay `running` until the next start.
                handle.abort();
                tracing::warn!(
                    event = "scoring.stop_timeout",
                    timeout_secs = self.stop_timeout.as_secs_f64(),
                    "scoring worker did not stop in time, aborted"
                );
            }
        }
        Ok(())
    }

    async fn status_counts(&self, app_ids: &[String]) -> anyhow::Result<StatusCounts> {
        self.store.get_feedback_status_counts_for(app_ids)
    }
}

impl Drop for DeferredEvaluator {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(running) = state.take() {
                running.cancel.cancel();
                running.handle.abort();
            }
        }
    }
}

#[derive(Clone)]
struct JobContext {
    store: Store,
    feedbacks: Arc<HashMap<String, Arc<dyn Feedback>>>,
    golden: Arc<GoldenIndex>,
    job_timeout: Duration,
}

async fn worker_loop(ctx: JobContext, workers: usize, poll_interval: Duration, cancel: CancelToken) {
    let sem = Arc::new(Semaphore::new(workers));
    let mut tasks = JoinSet::new();

    while !cancel.is_cancelled() {
        // reap finished tasks
        while tasks.try_join_next().is_some() {}

        let free = sem.available_permits();
        let jobs = if free == 0 {
            Vec::new()
        } else {
            match ctx.store.claim_pending_feedback(free) {
                Ok(jobs) => jobs,
                Err(e) => {
                    tracing::warn!(event = "scoring.claim_failed", error = %e, "failed to claim jobs");
                    Vec::new()
                }
            }
        };

        if jobs.is_empty() {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(poll_interval) => continue,
            }
        }

        for job in jobs {
            let permit = match sem.clone().acquire_owned().await {
                Ok(p) => p,
                Err(_) => break,
            };
            let ctx = ctx.clone();
            tasks.spawn(async move {
                let _permit = permit;
                run_job(&ctx, job).await;
            });
        }
    }

    // let in-flight jobs finish; the caller bounds this with its stop timeout
    while tasks.join_next().await.is_some() {}
}

async fn run_job(ctx: &JobContext, job: FeedbackJob) {
    let result = score_job(ctx, &job).await;
    let written = match result {
        Ok(FeedbackOutcome::Scored { score, calls }) => {
            ctx.store.complete_feedback(job.id, score, &calls)
        }
        Ok(FeedbackOutcome::Skipped(reason)) => {
            ctx.store.fail_feedback(job.id, FeedbackStatus::Skipped, &reason)
        }
        Err(e) => {
            tracing::warn!(
                event = "scoring.job_failed",
                job_id = job.id,
                record_id = %job.record_id,
                feedback = %job.name,
                error = %e,
                "feedback failed"
            );
            ctx.store
                .fail_feedback(job.id, FeedbackStatus::Failed, &format!("{:#}", e))
        }
    };
    if let Err(e) = written {
        tracing::warn!(
            event = "scoring.write_failed",
            job_id = job.id,
            error = %e,
            "failed to persist feedback result"
        );
    }
}

async fn score_job(ctx: &JobContext, job: &FeedbackJob) -> anyhow::Result<FeedbackOutcome> {
    let Some(feedback) = ctx.feedbacks.get(&job.name) else {
        return Ok(FeedbackOutcome::skipped("no feedback function registered"));
    };
    let record = ctx
        .store
        .get_record(&job.record_id)?
        .ok_or_else(|| anyhow::anyhow!("record {} not found", job.record_id))?;

    let ground_truth = ctx
        .golden
        .get(&record.app_id)
        .and_then(|g| g.get(&record.input))
        .map(|s| s.as_str());
    let input = FeedbackInput {
        record: &record,
        contexts: extract_contexts(&record.raw_trace),
        ground_truth,
    };

    tokio::time::timeout(ctx.job_timeout, feedback.evaluate(&input))
        .await
        .map_err(|_| anyhow::anyhow!("feedback {} timed out", job.name))?
}
