pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS apps (
  app_id TEXT PRIMARY KEY,
  feedback_names_json TEXT NOT NULL,
  metadata_json TEXT,
  registered_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS records (
  record_id TEXT PRIMARY KEY,
  app_id TEXT NOT NULL,
  input TEXT NOT NULL,
  output TEXT NOT NULL,
  record_json TEXT,
  metadata_json TEXT,
  total_tokens INTEGER,
  latency_seconds REAL,
  ts TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_app ON records(app_id);

CREATE TABLE IF NOT EXISTS feedback_results (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  record_id TEXT NOT NULL REFERENCES records(record_id) ON DELETE CASCADE,
  app_id TEXT NOT NULL,
  name TEXT NOT NULL,
  status TEXT NOT NULL,
  result REAL,
  calls_json TEXT,
  error TEXT,
  updated_at TEXT NOT NULL,
  UNIQUE(record_id, name)
);

CREATE INDEX IF NOT EXISTS idx_feedback_status ON feedback_results(status);
"#;
