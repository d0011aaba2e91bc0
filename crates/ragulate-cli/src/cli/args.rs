use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "ragulate",
    version,
    about = "Run RAG recipes over datasets, score them and compare the results"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Write a sample ragulate.yaml
    Init(InitArgs),
    /// Run recipes over datasets and wait for every score
    Query(QueryArgs),
    /// Merge and diff the results of several recipes on one dataset
    Compare(CompareArgs),
    /// Write the per-dataset results of a recipe as JSON
    Export(ExportArgs),
    /// Show the feedback status counts of recipes
    Status(StatusArgs),
    Version,
}

#[derive(Parser, Clone)]
pub struct InitArgs {
    #[arg(long, default_value = "ragulate.yaml")]
    pub config: PathBuf,

    /// generate .gitignore for the store dir and exports
    #[arg(long)]
    pub gitignore: bool,
}

#[derive(Parser, Clone)]
pub struct QueryArgs {
    #[arg(long, default_value = "ragulate.yaml", env = "RAGULATE_CONFIG")]
    pub config: PathBuf,

    /// Recipes to run (default: all configured)
    #[arg(long = "recipe")]
    pub recipes: Vec<String>,

    /// Datasets to run on (default: all configured)
    #[arg(long = "dataset")]
    pub datasets: Vec<String>,

    /// Wipe the recipe store before running
    #[arg(long)]
    pub restart: bool,

    /// Write <recipe>_<dataset>_results.json into this directory afterwards
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Fraction of each dataset to run, in [0, 1]
    #[arg(long)]
    pub sample_percent: Option<f64>,

    #[arg(long)]
    pub seed: Option<u64>,

    /// LLM provider for the judge (openai|azure_openai|huggingface|fake)
    #[arg(long)]
    pub provider: Option<String>,

    /// Judge model (deployment name for azure_openai)
    #[arg(long)]
    pub model: Option<String>,
}

#[derive(Parser, Clone)]
pub struct CompareArgs {
    #[arg(long, default_value = "ragulate.yaml", env = "RAGULATE_CONFIG")]
    pub config: PathBuf,

    /// Recipes to compare
    #[arg(long = "recipe", required = true)]
    pub recipes: Vec<String>,

    #[arg(long)]
    pub dataset: String,

    /// Metadata filter as key=value; repeat to combine
    #[arg(long = "filter")]
    pub filters: Vec<String>,

    /// Output format: json | markdown
    #[arg(long, default_value = "json")]
    pub format: String,

    /// Output path (stdout when absent)
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Parser, Clone)]
pub struct ExportArgs {
    #[arg(long, default_value = "ragulate.yaml", env = "RAGULATE_CONFIG")]
    pub config: PathBuf,

    #[arg(long)]
    pub recipe: String,

    /// Datasets to export (default: every dataset in the recipe store)
    #[arg(long = "dataset")]
    pub datasets: Vec<String>,

    #[arg(long, default_value = ".")]
    pub out_dir: PathBuf,
}

#[derive(Parser, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = "ragulate.yaml", env = "RAGULATE_CONFIG")]
    pub config: PathBuf,

    /// Recipes to inspect (default: all configured)
    #[arg(long = "recipe")]
    pub recipes: Vec<String>,
}
