use super::exit_codes;
use crate::cli::args::ExportArgs;
use anyhow::Context;
use ragulate_core::config::load_config;
use ragulate_core::export::export_results;
use ragulate_core::storage::Store;

pub fn run(args: ExportArgs) -> anyhow::Result<i32> {
    let cfg = load_config(&args.config)?;
    let path = Store::path_for_recipe(&cfg.store_dir, &args.recipe);
    let store = Store::open_read_only(&path)
        .with_context(|| format!("recipe {} has no results in {}", args.recipe, cfg.store_dir.display()))?;

    let datasets = if args.datasets.is_empty() {
        store.app_ids()?
    } else {
        args.datasets.clone()
    };
    if datasets.is_empty() {
        eprintln!("note: recipe {} has no datasets to export", args.recipe);
    }

    for dataset in &datasets {
        let written = export_results(&store, &args.recipe, dataset, &args.out_dir)?;
        eprintln!("wrote {}", written.display());
    }
    Ok(exit_codes::OK)
}
