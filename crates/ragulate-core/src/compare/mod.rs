//! Merge and diff of per-recipe results for one dataset.

pub mod extract;
pub mod filter;
pub mod merge;
pub mod stats;
pub mod table;

pub use filter::{metadata_options, MetadataFilter};
pub use merge::{combine_and_calculate_diff, common_metrics, RecipeResults};
pub use table::ComparisonTable;

use crate::storage::Store;
use anyhow::Context;
use std::path::Path;

/// Reads one recipe's results for `dataset` through a read-only connection,
/// so a comparison can run while that recipe is still being evaluated.
pub fn load_recipe_results(store_dir: &Path, recipe: &str, dataset: &str) -> anyhow::Result<RecipeResults> {
    let path = Store::path_for_recipe(store_dir, recipe);
    let store = Store::open_read_only(&path)
        .with_context(|| format!("recipe {} has no results in {}", recipe, store_dir.display()))?;
    let (records, metric_names) = store
        .get_records(dataset)
        .with_context(|| format!("failed to read results of recipe {}", recipe))?;
    tracing::debug!(
        event = "compare.load",
        recipe,
        dataset,
        records = records.len(),
        metrics = metric_names.len()
    );
    Ok(RecipeResults::new(recipe, records, metric_names))
}
