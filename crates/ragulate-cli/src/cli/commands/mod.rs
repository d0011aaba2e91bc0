use super::args::*;
use ragulate_core::config::{DatasetConfig, RagulateConfig, RecipeConfig};
use ragulate_core::errors::ConfigError;
use std::path::Path;

pub mod compare;
pub mod export;
pub mod query;
pub mod status;

pub mod exit_codes {
    pub const OK: i32 = 0;
    pub const CONFIG_ERROR: i32 = 2;
    pub const INTERRUPTED: i32 = 130;
}

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Init(args) => cmd_init(args),
        Command::Query(args) => query::run(args).await,
        Command::Compare(args) => compare::run(args),
        Command::Export(args) => export::run(args),
        Command::Status(args) => status::run(args),
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(exit_codes::OK)
        }
    }
}

fn cmd_init(args: InitArgs) -> anyhow::Result<i32> {
    write_file_if_missing(&args.config, crate::templates::RAGULATE_YAML)?;
    if args.gitignore {
        write_file_if_missing(Path::new(".gitignore"), crate::templates::GITIGNORE)?;
    }
    Ok(exit_codes::OK)
}

fn write_file_if_missing(path: &Path, content: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if !path.exists() {
        std::fs::write(path, content)?;
        eprintln!("created {}", path.display());
    } else {
        eprintln!("note: {} already exists (skipped)", path.display());
    }
    Ok(())
}

/// Configured recipes named in `names`, or all of them when empty.
pub(crate) fn select_recipes<'a>(
    cfg: &'a RagulateConfig,
    names: &[String],
) -> Result<Vec<&'a RecipeConfig>, ConfigError> {
    if names.is_empty() {
        return Ok(cfg.recipes.iter().collect());
    }
    names
        .iter()
        .map(|n| {
            cfg.recipe(n)
                .ok_or_else(|| ConfigError(format!("unknown recipe {}", n)))
        })
        .collect()
}

pub(crate) fn select_datasets<'a>(
    cfg: &'a RagulateConfig,
    names: &[String],
) -> Result<Vec<&'a DatasetConfig>, ConfigError> {
    if names.is_empty() {
        return Ok(cfg.datasets.iter().collect());
    }
    names
        .iter()
        .map(|n| {
            cfg.dataset(n)
                .ok_or_else(|| ConfigError(format!("unknown dataset {}", n)))
        })
        .collect()
}
