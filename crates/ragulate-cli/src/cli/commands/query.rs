use super::exit_codes;
use super::{select_datasets, select_recipes};
use crate::cli::args::QueryArgs;
use anyhow::Context;
use ragulate_core::config::load_config;
use ragulate_core::dataset::Dataset;
use ragulate_core::engine::{CancelToken, Evaluator, EvaluatorSettings, ProgressObserver, ProgressSnapshot};
use ragulate_core::providers::llm::build_client;
use ragulate_core::report::console::print_run_summary;
use ragulate_core::scoring::worker::GoldenIndex;
use ragulate_core::scoring::DeferredEvaluator;
use ragulate_core::storage::Store;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub async fn run(args: QueryArgs) -> anyhow::Result<i32> {
    let mut cfg = load_config(&args.config)?;
    if let Some(p) = args.sample_percent {
        cfg.settings.sample_percent = p;
    }
    if args.seed.is_some() {
        cfg.settings.seed = args.seed;
    }
    if let Some(provider) = &args.provider {
        cfg.settings.provider = provider.clone();
    }
    if args.model.is_some() {
        cfg.settings.model = args.model.clone();
    }
    cfg.validate()?;

    let recipes = select_recipes(&cfg, &args.recipes)?;
    let datasets = select_datasets(&cfg, &args.datasets)?
        .into_iter()
        .map(Dataset::load)
        .collect::<anyhow::Result<Vec<_>>>()?;

    let provider = cfg.settings.provider()?;
    let client = build_client(provider, cfg.settings.model.as_deref())?;
    let feedbacks = ragulate_feedback::default_feedbacks(client.clone());
    let feedback_names = ragulate_feedback::feedback_names(&feedbacks);

    let golden: GoldenIndex = datasets
        .iter()
        .map(|d| (d.name.clone(), d.golden_lookup()))
        .collect();

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\ninterrupt received, stopping after the current query");
                cancel.cancel();
            }
        });
    }

    let settings = &cfg.settings;
    let poll_interval = Duration::from_millis(settings.poll_interval_ms);
    let mut interrupted = false;

    for recipe_cfg in recipes {
        if cancel.is_cancelled() {
            interrupted = true;
            break;
        }
        let recipe = Arc::new(recipe_cfg.to_recipe(settings));
        let name = recipe.name.clone();
        let store = Store::for_recipe(&cfg.store_dir, &name)
            .with_context(|| format!("failed to open store of recipe {}", name))?;

        let backend = DeferredEvaluator::new(store.clone(), feedbacks.clone(), golden.clone())
            .with_workers(settings.feedback_workers)
            .with_poll_interval(poll_interval.min(Duration::from_millis(200)))
            .with_job_timeout(Duration::from_secs(settings.timeout_seconds))
            .with_stop_timeout(Duration::from_secs(settings.stop_timeout_seconds));

        let eval_settings = EvaluatorSettings {
            sample_percent: settings.sample_percent,
            seed: settings.seed,
            restart: args.restart,
            poll_interval,
            llm_provider: provider.to_string(),
            model_name: Some(client.model().to_string()),
            export_dir: args.export.clone(),
        };

        let mut evaluator = Evaluator::new(
            recipe,
            store,
            Arc::new(backend),
            datasets.clone(),
            feedback_names.clone(),
            eval_settings,
        )
        .with_cancel_token(cancel.clone())
        .with_progress_observer(progress_printer(&name));

        let totals = evaluator.prepare()?;
        eprintln!(
            "{}: {} queries ({} already done), {} evaluations expected",
            name, totals.total_queries, totals.finished_queries, totals.total_feedback_jobs
        );
        let summary = evaluator.run().await?;
        print_run_summary(&summary);
        if summary.cancelled {
            interrupted = true;
            break;
        }
    }

    if interrupted {
        return Ok(exit_codes::INTERRUPTED);
    }
    Ok(exit_codes::OK)
}

/// Prints a progress line whenever it changes.
fn progress_printer(recipe: &str) -> ProgressObserver {
    let recipe = recipe.to_string();
    let last = Mutex::new(String::new());
    Box::new(move |snap: &ProgressSnapshot| {
        let line = snap.to_string();
        if let Ok(mut last) = last.lock() {
            if *last != line {
                eprintln!("{} {}", recipe, line);
                *last = line;
            }
        }
    })
}
