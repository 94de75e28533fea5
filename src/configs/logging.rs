use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
  pub level: Option<String>,
  pub filters: Option<String>,
  pub file: Option<LogFileConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LogFileConfig {
  pub path: String,
  #[serde(default = "default_max_lines")]
  pub max_lines: usize,
}

fn default_max_lines() -> usize {
  10_000
}
