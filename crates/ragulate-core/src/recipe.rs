//! Recipe-under-test: the black box invoked once per query.

use crate::model::RecipeOutput;
use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

pub type Ingredients = BTreeMap<String, serde_json::Value>;

#[async_trait]
pub trait Recipe: Send + Sync {
    fn name(&self) -> &str;

    fn ingredients(&self) -> &Ingredients;

    /// Answers one query. Errors are per-query and never abort a run.
    async fn invoke(&self, query: &str) -> anyhow::Result<RecipeOutput>;
}

/// `chunk_size=500, model=x` -> `chunk_size_500_model_x`
pub fn recipe_name_from_ingredients(ingredients: &Ingredients) -> String {
    ingredients
        .iter()
        .map(|(k, v)| {
            let v = match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            format!("{}_{}", k, v)
        })
        .collect::<Vec<_>>()
        .join("_")
}

/// A recipe run as an external process.
///
/// The query is written to stdin. Stdout is either a JSON object
/// `{"answer": ..., "trace": ..., "total_tokens": ...}` or plain text taken
/// as the answer. Ingredients are passed as `RAGULATE_INGREDIENTS` (JSON)
/// and one `RAGULATE_<KEY>` variable each.
#[derive(Debug, Clone)]
pub struct CommandRecipe {
    pub name: String,
    pub command: Vec<String>,
    pub ingredients: Ingredients,
    pub timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct CommandReply {
    #[serde(alias = "response")]
    answer: String,
    #[serde(default)]
    trace: serde_json::Value,
    #[serde(default)]
    total_tokens: Option<i64>,
}

impl CommandRecipe {
    pub fn new(name: impl Into<String>, command: Vec<String>, ingredients: Ingredients) -> Self {
        Self {
            name: name.into(),
            command,
            ingredients,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn build_command(&self) -> anyhow::Result<Command> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow::anyhow!("recipe {} has an empty command", self.name))?;
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .env("RAGULATE_RECIPE", &self.name)
            .env("RAGULATE_INGREDIENTS", serde_json::to_string(&self.ingredients)?);
        for (k, v) in &self.ingredients {
            let v = match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            cmd.env(format!("RAGULATE_{}", k.to_ascii_uppercase()), v);
        }
        Ok(cmd)
    }
}

#[async_trait]
impl Recipe for CommandRecipe {
    fn name(&self) -> &str {
        &self.name
    }

    fn ingredients(&self) -> &Ingredients {
        &self.ingredients
    }

    async fn invoke(&self, query: &str) -> anyhow::Result<RecipeOutput> {
        let mut child = self
            .build_command()?
            .spawn()
            .with_context(|| format!("failed to spawn recipe {}", self.name))?;

        let stdin = child.stdin.take();
        let exchange = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(query.as_bytes()).await?;
                stdin.shutdown().await?;
            }
            anyhow::Ok(child.wait_with_output().await?)
        };

        // kill_on_drop ends the child when the exchange is dropped on timeout
        let output = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| anyhow::anyhow!("recipe {} timed out after {:?}", self.name, self.timeout))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "recipe {} exited with {}: {}",
                self.name,
                output.status,
                stderr.trim()
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_reply(&stdout))
    }
}

fn parse_reply(stdout: &str) -> RecipeOutput {
    let trimmed = stdout.trim();
    match serde_json::from_str::<CommandReply>(trimmed) {
        Ok(reply) => RecipeOutput {
            answer: reply.answer,
            trace: reply.trace,
            total_tokens: reply.total_tokens,
        },
        Err(_) => RecipeOutput {
            answer: trimmed.to_string(),
            trace: serde_json::Value::Null,
            total_tokens: None,
        },
    }
}
