pub const RAGULATE_YAML: &str = r#"version: 1
store_dir: .ragulate

recipes:
  # Each recipe is a command reading the query on stdin and printing either
  # plain text or JSON:
  #   {"answer": "...", "trace": {"calls": [{"rets": {"context": ["..."]}}]}, "total_tokens": 42}
  # Ingredients are passed as RAGULATE_<KEY> environment variables.
  - name: chunk_500
    command: ["python", "recipes/query.py"]
    ingredients:
      chunk_size: 500
  - command: ["python", "recipes/query.py"]
    ingredients:
      chunk_size: 1000

datasets:
  # JSONL, one {"query": "...", "answer": "...", ...} per line
  - name: my_dataset
    path: datasets/my_dataset.jsonl

settings:
  sample_percent: 1.0
  seed: 42
  provider: openai
  model: gpt-4o-mini
  timeout_seconds: 60
  poll_interval_ms: 1000
  stop_timeout_seconds: 10
  feedback_workers: 4
"#;

pub const GITIGNORE: &str = "/.ragulate/\n*_results.json\n";
