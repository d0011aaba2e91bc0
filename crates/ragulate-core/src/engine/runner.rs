use super::cancel::CancelToken;
use super::progress::{Progress, ProgressObserver};
use crate::dataset::Dataset;
use crate::export::export_results;
use crate::model::{EvaluationRecord, FeedbackStatus, QueryItem, StatusCounts};
use crate::recipe::Recipe;
use crate::sampling::{filter_completed_queries, sample_queries};
use crate::scoring::ScoringBackend;
use crate::storage::store::{new_record_id, now_rfc3339};
use crate::storage::Store;
use anyhow::Context;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct EvaluatorSettings {
    pub sample_percent: f64,
    pub seed: Option<u64>,
    /// Wipe the recipe store before computing what is left to run.
    pub restart: bool,
    pub poll_interval: Duration,
    pub llm_provider: String,
    pub model_name: Option<String>,
    /// Write `<recipe>_<dataset>_results.json` here once stopped.
    pub export_dir: Option<PathBuf>,
}

impl Default for EvaluatorSettings {
    fn default() -> Self {
        Self {
            sample_percent: 1.0,
            seed: None,
            restart: false,
            poll_interval: Duration::from_secs(1),
            llm_provider: "openai".to_string(),
            model_name: None,
            export_dir: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Init,
    Running,
    Draining,
    Stopped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunTotals {
    pub total_queries: u64,
    pub finished_queries: u64,
    pub total_feedback_jobs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub recipe: String,
    pub totals: RunTotals,
    pub submitted_queries: u64,
    pub failed_queries: u64,
    pub finished_feedback_jobs: u64,
    pub counts: StatusCounts,
    pub cancelled: bool,
    pub exported: Vec<PathBuf>,
}

struct DatasetPlan {
    name: String,
    pending: Vec<QueryItem>,
}

/// Runs one recipe over its datasets while the scoring backend fills in
/// metric scores, and waits until every expected score is resolved.
///
/// `prepare` computes the work (INIT), `run` submits queries (RUNNING),
/// polls the backend (DRAINING) and stops it (STOPPED).
pub struct Evaluator {
    recipe: Arc<dyn Recipe>,
    store: Store,
    backend: Arc<dyn ScoringBackend>,
    datasets: Vec<Dataset>,
    feedback_names: Vec<String>,
    settings: EvaluatorSettings,
    cancel: CancelToken,
    state: RunState,
    plans: Option<Vec<DatasetPlan>>,
    totals: RunTotals,
    progress: Progress,
    observer: Option<ProgressObserver>,
}

impl Evaluator {
    pub fn new(
        recipe: Arc<dyn Recipe>,
        store: Store,
        backend: Arc<dyn ScoringBackend>,
        datasets: Vec<Dataset>,
        feedback_names: Vec<String>,
        settings: EvaluatorSettings,
    ) -> Self {
        Self {
            recipe,
            store,
            backend,
            datasets,
            feedback_names,
            settings,
            cancel: CancelToken::new(),
            state: RunState::Init,
            plans: None,
            totals: RunTotals::default(),
            progress: Progress::new(0, 0),
            observer: None,
        }
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress_observer(mut self, observer: ProgressObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn totals(&self) -> RunTotals {
        self.totals
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    /// INIT: samples each dataset, drops queries already recorded and
    /// registers the run metadata.
    pub fn prepare(&mut self) -> anyhow::Result<RunTotals> {
        if self.state != RunState::Init {
            anyhow::bail!("evaluator can only be prepared before it runs");
        }
        if self.settings.restart {
            self.store.reset().context("failed to reset recipe store")?;
            tracing::info!(event = "run.restart", recipe = self.recipe.name(), "store reset");
        }

        let metric_count = self.feedback_names.len() as u64;
        let mut totals = RunTotals::default();
        let mut plans = Vec::with_capacity(self.datasets.len());

        for dataset in &self.datasets {
            let sampled = sample_queries(
                &dataset.query_items,
                self.settings.sample_percent,
                self.settings.seed,
            );
            let existing = self
                .store
                .get_inputs(&dataset.name)
                .with_context(|| format!("failed to read existing records of {}", dataset.name))?;
            let pending = filter_completed_queries(&sampled, &existing);

            totals.total_queries += sampled.len() as u64;
            totals.finished_queries += (sampled.len() - pending.len()) as u64;

            self.store
                .register_app(&dataset.name, &self.feedback_names, &self.run_metadata(&dataset.name))
                .with_context(|| format!("failed to register dataset {}", dataset.name))?;

            tracing::debug!(
                event = "run.plan",
                dataset = %dataset.name,
                sampled = sampled.len(),
                pending = pending.len()
            );
            plans.push(DatasetPlan {
                name: dataset.name.clone(),
                pending,
            });
        }
        totals.total_feedback_jobs = totals.total_queries * metric_count;

        self.progress = Progress::new(
            totals.total_queries + totals.total_feedback_jobs,
            totals.finished_queries,
        );
        self.progress.set_observer(self.observer.take());
        self.plans = Some(plans);
        self.totals = totals;
        Ok(totals)
    }

    fn run_metadata(&self, dataset: &str) -> serde_json::Value {
        serde_json::json!({
            "recipe_name": self.recipe.name(),
            "ingredients": self.recipe.ingredients(),
            "dataset_name": dataset,
            "llm_provider": self.settings.llm_provider,
            "model_name": self.settings.model_name,
        })
    }

    /// RUNNING, DRAINING and STOPPED. The backend is stopped on every exit
    /// path, including store failures.
    pub async fn run(&mut self) -> anyhow::Result<RunSummary> {
        match self.state {
            RunState::Init => {}
            RunState::Stopped => anyhow::bail!("evaluator already stopped"),
            _ => anyhow::bail!("evaluator is already running"),
        }
        if self.plans.is_none() {
            self.prepare()?;
        }

        let result = self.submit_and_drain().await;
        let stopped = self.stop().await;

        let mut summary = result?;
        stopped?;

        if let Some(dir) = self.settings.export_dir.clone() {
            for dataset in &self.datasets {
                let path = export_results(&self.store, self.recipe.name(), &dataset.name, &dir)?;
                summary.exported.push(path);
            }
        }
        Ok(summary)
    }

    async fn submit_and_drain(&mut self) -> anyhow::Result<RunSummary> {
        self.backend.start().await.context("failed to start scoring backend")?;
        self.state = RunState::Running;

        let metric_count = self.feedback_names.len() as u64;
        let plans = self.plans.take().unwrap_or_default();
        let mut submitted = 0u64;
        let mut failed = 0u64;

        tracing::info!(
            event = "run.start",
            recipe = self.recipe.name(),
            total_queries = self.totals.total_queries,
            finished_queries = self.totals.finished_queries,
            total_feedback_jobs = self.totals.total_feedback_jobs,
            "starting queries; progress legend: (q)ueries completed, evaluations (d)one, (r)unning, (w)aiting, (f)ailed, (s)kipped"
        );

        'datasets: for plan in &plans {
            for item in &plan.pending {
                if self.cancel.is_cancelled() {
                    break 'datasets;
                }
                let started = Instant::now();
                match self.recipe.invoke(&item.query).await {
                    Ok(out) => {
                        let record = EvaluationRecord {
                            record_id: new_record_id(&plan.name, &item.query),
                            app_id: plan.name.clone(),
                            input: item.query.clone(),
                            output: out.answer,
                            raw_trace: out.trace,
                            total_tokens: out.total_tokens,
                            latency_seconds: Some(started.elapsed().as_secs_f64()),
                            metadata: item.metadata.clone(),
                            ts: now_rfc3339(),
                            ..Default::default()
                        };
                        self.store
                            .insert_record(&record, &self.feedback_names)
                            .with_context(|| format!("failed to store result of query {:?}", item.query))?;
                        submitted += 1;
                    }
                    Err(e) => {
                        tracing::warn!(
                            event = "run.query_failed",
                            dataset = %plan.name,
                            query = %item.query,
                            error = %format!("{:#}", e),
                            "query caused an error, skipping"
                        );
                        failed += 1;
                        self.progress.add_phantom_jobs(metric_count);
                    }
                }
                let counts = self.poll_counts().await;
                self.progress.update(1, counts);
            }
        }

        self.state = RunState::Draining;
        loop {
            let counts = self.poll_counts().await;
            let pending = counts.get(FeedbackStatus::None)
                + counts.get(FeedbackStatus::Running);
            self.progress.update(0, counts);
            if self.progress.finished_feedback() >= self.totals.total_feedback_jobs || pending == 0 {
                break;
            }
            if self.cancel.is_cancelled() {
                break;
            }
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }

        let cancelled = self.cancel.is_cancelled();
        tracing::info!(
            event = "run.finished",
            recipe = self.recipe.name(),
            submitted,
            failed,
            cancelled,
            progress = %self.progress.snapshot(),
            "queries finished"
        );

        Ok(RunSummary {
            recipe: self.recipe.name().to_string(),
            totals: self.totals,
            submitted_queries: submitted,
            failed_queries: failed,
            finished_feedback_jobs: self.progress.finished_feedback(),
            counts: self.progress.counts().clone(),
            cancelled,
            exported: Vec::new(),
        })
    }

    /// Status counts of this run's datasets. Jobs of other datasets in the
    /// same recipe store are not part of the run's totals.
    ///
    /// Counts are advisory; a failed poll keeps the last view.
    async fn poll_counts(&self) -> StatusCounts {
        let scope: Vec<String> = self.datasets.iter().map(|d| d.name.clone()).collect();
        match self.backend.status_counts(&scope).await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(event = "run.poll_failed", error = %e, "failed to read feedback status");
                self.progress.counts().clone()
            }
        }
    }

    /// STOPPED: stops the scoring backend. Stopping twice is a no-op.
    pub async fn stop(&mut self) -> anyhow::Result<()> {
        if self.state == RunState::Stopped {
            return Ok(());
        }
        self.state = RunState::Stopped;
        tracing::debug!(event = "run.stop", recipe = self.recipe.name());
        self.backend.stop().await.context("failed to stop scoring backend")
    }
}
