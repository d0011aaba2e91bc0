use super::exit_codes;
use crate::cli::args::CompareArgs;
use ragulate_core::compare::stats::calculate_statistics;
use ragulate_core::compare::{combine_and_calculate_diff, common_metrics, load_recipe_results, MetadataFilter};
use ragulate_core::config::load_config;
use ragulate_core::errors::ConfigError;
use ragulate_core::report::console::{print_comparison_summary, print_statistics};
use ragulate_core::report::markdown::{render_markdown, write_markdown};
use ragulate_core::report::{render_json, write_json, ComparisonReport};

enum Format {
    Json,
    Markdown,
}

impl Format {
    fn parse(s: &str) -> Result<Self, ConfigError> {
        match s {
            "json" => Ok(Format::Json),
            "markdown" | "md" => Ok(Format::Markdown),
            other => Err(ConfigError(format!(
                "unknown format {} (expected json or markdown)",
                other
            ))),
        }
    }
}

pub fn run(args: CompareArgs) -> anyhow::Result<i32> {
    let cfg = load_config(&args.config)?;
    let format = Format::parse(&args.format)?;
    let filter = MetadataFilter::parse(&args.filters)?;

    let results = args
        .recipes
        .iter()
        .map(|r| load_recipe_results(&cfg.store_dir, r, &args.dataset))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let filter = (!filter.is_empty()).then_some(&filter);
    let (table, numeric_columns) = combine_and_calculate_diff(&results, filter)?;
    let statistics = calculate_statistics(&results, &common_metrics(&results));

    print_comparison_summary(&table, &args.recipes, &numeric_columns);
    print_statistics(&statistics);

    match format {
        Format::Json => {
            let report = ComparisonReport {
                dataset: args.dataset.clone(),
                recipes: args.recipes.clone(),
                numeric_columns,
                table,
                statistics,
            };
            match &args.out {
                Some(path) => write_json(&report, path)?,
                None => println!("{}", render_json(&report)?),
            }
        }
        Format::Markdown => match &args.out {
            Some(path) => write_markdown(&table, &args.recipes, &numeric_columns, path)?,
            None => println!("{}", render_markdown(&table, &args.recipes, &numeric_columns)),
        },
    }
    if let Some(path) = &args.out {
        eprintln!("wrote {}", path.display());
    }
    Ok(exit_codes::OK)
}
