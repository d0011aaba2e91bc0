use super::{exit_codes, select_recipes};
use crate::cli::args::StatusArgs;
use ragulate_core::config::load_config;
use ragulate_core::report::console::print_status_counts;
use ragulate_core::storage::Store;

pub fn run(args: StatusArgs) -> anyhow::Result<i32> {
    let cfg = load_config(&args.config)?;
    for recipe in select_recipes(&cfg, &args.recipes)? {
        let name = recipe.resolved_name();
        let path = Store::path_for_recipe(&cfg.store_dir, &name);
        if !path.exists() {
            eprintln!("{}: not run yet", name);
            continue;
        }
        let store = Store::open_read_only(&path)?;
        print_status_counts(&name, &store.get_feedback_status_counts()?);
    }
    Ok(exit_codes::OK)
}
