use crate::errors::ConfigError;
use crate::providers::llm::LlmProvider;
use crate::recipe::{recipe_name_from_ingredients, CommandRecipe, Ingredients};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SUPPORTED_CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagulateConfig {
    pub version: u32,
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,
    #[serde(default)]
    pub recipes: Vec<RecipeConfig>,
    #[serde(default)]
    pub datasets: Vec<DatasetConfig>,
    #[serde(default)]
    pub settings: Settings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub command: Vec<String>,
    #[serde(default)]
    pub ingredients: Ingredients,
}

impl RecipeConfig {
    /// Explicit name, or one derived from the ingredients.
    pub fn resolved_name(&self) -> String {
        match &self.name {
            Some(n) if !n.trim().is_empty() => n.trim().to_string(),
            _ => recipe_name_from_ingredients(&self.ingredients),
        }
    }

    pub fn to_recipe(&self, settings: &Settings) -> CommandRecipe {
        CommandRecipe::new(
            self.resolved_name(),
            self.command.clone(),
            self.ingredients.clone(),
        )
        .with_timeout(Duration::from_secs(settings.timeout_seconds))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub name: String,
    pub path: PathBuf,
    /// `question_type` values to keep; empty keeps everything.
    #[serde(default)]
    pub subsets: Vec<String>,
    #[serde(default)]
    pub allowed_subsets: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub sample_percent: f64,
    pub seed: Option<u64>,
    pub provider: String,
    pub model: Option<String>,
    pub timeout_seconds: u64,
    pub poll_interval_ms: u64,
    pub stop_timeout_seconds: u64,
    pub feedback_workers: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sample_percent: 1.0,
            seed: None,
            provider: "openai".to_string(),
            model: None,
            timeout_seconds: 60,
            poll_interval_ms: 1000,
            stop_timeout_seconds: 10,
            feedback_workers: 4,
        }
    }
}

impl Settings {
    pub fn provider(&self) -> Result<LlmProvider, ConfigError> {
        self.provider.parse()
    }
}

fn default_store_dir() -> PathBuf {
    PathBuf::from(".ragulate")
}

impl RagulateConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != SUPPORTED_CONFIG_VERSION {
            return Err(ConfigError(format!(
                "unsupported config version {} (supported: {})",
                self.version, SUPPORTED_CONFIG_VERSION
            )));
        }
        if self.recipes.is_empty() {
            return Err(ConfigError("config has no recipes".into()));
        }
        if self.datasets.is_empty() {
            return Err(ConfigError("config has no datasets".into()));
        }

        let mut seen = HashSet::new();
        for r in &self.recipes {
            let name = r.resolved_name();
            if name.is_empty() {
                return Err(ConfigError(
                    "recipe needs a name or at least one ingredient".into(),
                ));
            }
            if r.command.is_empty() {
                return Err(ConfigError(format!("recipe {} has an empty command", name)));
            }
            if !seen.insert(name.clone()) {
                return Err(ConfigError(format!("duplicate recipe name: {}", name)));
            }
        }

        let mut seen = HashSet::new();
        for d in &self.datasets {
            if !seen.insert(d.name.as_str()) {
                return Err(ConfigError(format!("duplicate dataset name: {}", d.name)));
            }
        }

        let p = self.settings.sample_percent;
        if !(0.0..=1.0).contains(&p) {
            return Err(ConfigError(format!(
                "sample_percent must be within [0, 1], got {}",
                p
            )));
        }
        if self.settings.feedback_workers == 0 {
            return Err(ConfigError("feedback_workers must be at least 1".into()));
        }
        self.settings.provider()?;
        Ok(())
    }

    pub fn recipe(&self, name: &str) -> Option<&RecipeConfig> {
        self.recipes.iter().find(|r| r.resolved_name() == name)
    }

    pub fn dataset(&self, name: &str) -> Option<&DatasetConfig> {
        self.datasets.iter().find(|d| d.name == name)
    }
}

pub fn load_config(path: &Path) -> Result<RagulateConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("failed to read config {}: {}", path.display(), e)))?;

    let mut ignored_keys = Vec::new();
    let deserializer = serde_yaml::Deserializer::from_str(&raw);
    let mut cfg: RagulateConfig = serde_ignored::deserialize(deserializer, |p| {
        ignored_keys.push(p.to_string());
    })
    .map_err(|e| ConfigError(format!("failed to parse YAML: {}", e)))?;

    if !ignored_keys.is_empty() {
        tracing::warn!(
            event = "config.unknown_fields",
            fields = ?ignored_keys,
            file = %path.display(),
            "ignored unknown config fields"
        );
    }

    cfg.validate()?;
    normalize_paths(&mut cfg, path);
    Ok(cfg)
}

/// Makes the store dir and dataset paths relative to the config file.
fn normalize_paths(cfg: &mut RagulateConfig, config_path: &Path) {
    let base = config_path.parent().unwrap_or(Path::new("."));
    if cfg.store_dir.is_relative() {
        cfg.store_dir = base.join(&cfg.store_dir);
    }
    for d in &mut cfg.datasets {
        if d.path.is_relative() {
            d.path = base.join(&d.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, body: &str) -> PathBuf {
        let p = dir.join("ragulate.yaml");
        std::fs::write(&p, body).unwrap();
        p
    }

    #[test]
    fn loads_and_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let p = write(
            dir.path(),
            r#"
version: 1
recipes:
  - command: ["python", "query.py"]
    ingredients: { chunk_size: 500, model: mini }
datasets:
  - name: ds
    path: data/ds.jsonl
settings:
  sample_percent: 0.5
  seed: 42
  provider: fake
"#,
        );
        let cfg = load_config(&p).unwrap();
        assert_eq!(cfg.recipes[0].resolved_name(), "chunk_size_500_model_mini");
        assert_eq!(cfg.datasets[0].path, dir.path().join("data/ds.jsonl"));
        assert_eq!(cfg.store_dir, dir.path().join(".ragulate"));
        assert_eq!(cfg.settings.seed, Some(42));
        assert_eq!(cfg.settings.poll_interval_ms, 1000);
    }

    #[test]
    fn unsupported_provider_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let p = write(
            dir.path(),
            r#"
version: 1
recipes: [{ name: a, command: ["true"] }]
datasets: [{ name: ds, path: ds.jsonl }]
settings: { provider: cohere }
"#,
        );
        let err = load_config(&p).unwrap_err();
        assert!(err.0.contains("unsupported provider"), "{}", err);
    }

    #[test]
    fn duplicate_recipes_and_bad_fraction_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let p = write(
            dir.path(),
            r#"
version: 1
recipes:
  - { name: a, command: ["true"] }
  - { name: a, command: ["true"] }
datasets: [{ name: ds, path: ds.jsonl }]
"#,
        );
        assert!(load_config(&p).unwrap_err().0.contains("duplicate recipe"));

        let p = write(
            dir.path(),
            r#"
version: 1
recipes: [{ name: a, command: ["true"] }]
datasets: [{ name: ds, path: ds.jsonl }]
settings: { sample_percent: 1.5 }
"#,
        );
        assert!(load_config(&p).unwrap_err().0.contains("sample_percent"));
    }

    #[test]
    fn wrong_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let p = write(dir.path(), "version: 3\n");
        assert!(load_config(&p).unwrap_err().0.contains("unsupported config version"));
    }
}
