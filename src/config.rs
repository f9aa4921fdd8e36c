use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub db: DbConfig,
    pub index: IndexConfig,
    #[serde(default)]
    pub uploads: UploadsConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub indexer: IndexerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadsConfig {
    #[serde(default = "default_uploads_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_max_size_bytes")]
    pub max_size_bytes: u64,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            dir: default_uploads_dir(),
            max_size_bytes: default_max_size_bytes(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("uploads")
}
fn default_max_size_bytes() -> u64 {
    10 * 1024 * 1024
}
fn default_allowed_extensions() -> Vec<String> {
    [".pdf", ".docx", ".doc", ".txt", ".md"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    #[serde(default = "default_token_ttl_days")]
    pub token_ttl_days: i64,
}

fn default_token_ttl_days() -> i64 {
    7
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            max_requests: default_max_requests(),
        }
    }
}

fn default_window_secs() -> u64 {
    15 * 60
}
fn default_max_requests() -> u32 {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexerConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_workers() -> usize {
    2
}
fn default_queue_capacity() -> usize {
    256
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.auth.jwt_secret.trim().is_empty() {
        anyhow::bail!("auth.jwt_secret must not be empty");
    }

    if config.auth.token_ttl_days < 1 {
        anyhow::bail!("auth.token_ttl_days must be >= 1");
    }

    if config.uploads.max_size_bytes == 0 {
        anyhow::bail!("uploads.max_size_bytes must be > 0");
    }

    if config.uploads.allowed_extensions.is_empty() {
        anyhow::bail!("uploads.allowed_extensions must not be empty");
    }

    for ext in &config.uploads.allowed_extensions {
        if !ext.starts_with('.') {
            anyhow::bail!(
                "uploads.allowed_extensions entries must start with '.', got '{}'",
                ext
            );
        }
    }

    if config.indexer.workers == 0 {
        anyhow::bail!("indexer.workers must be >= 1");
    }

    if config.indexer.queue_capacity == 0 {
        anyhow::bail!("indexer.queue_capacity must be >= 1");
    }

    if config.rate_limit.max_requests == 0 {
        anyhow::bail!("rate_limit.max_requests must be >= 1");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("docshelf.toml");
        std::fs::write(&path, content).unwrap();
        (tmp, path)
    }

    const MINIMAL: &str = r#"
[server]
bind = "127.0.0.1:0"

[db]
path = "data/docshelf.sqlite"

[index]
path = "data/index"

[auth]
jwt_secret = "test-secret"
"#;

    #[test]
    fn minimal_config_fills_defaults() {
        let (_tmp, path) = write_config(MINIMAL);
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.uploads.max_size_bytes, 10 * 1024 * 1024);
        assert_eq!(cfg.uploads.allowed_extensions.len(), 5);
        assert_eq!(cfg.auth.token_ttl_days, 7);
        assert_eq!(cfg.rate_limit.max_requests, 100);
        assert_eq!(cfg.indexer.workers, 2);
    }

    #[test]
    fn empty_jwt_secret_rejected() {
        let (_tmp, path) = write_config(&MINIMAL.replace("test-secret", "  "));
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn bad_extension_rejected() {
        let cfg = format!("{}\n[uploads]\nallowed_extensions = [\"txt\"]\n", MINIMAL);
        let (_tmp, path) = write_config(&cfg);
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn zero_workers_rejected() {
        let cfg = format!("{}\n[indexer]\nworkers = 0\n", MINIMAL);
        let (_tmp, path) = write_config(&cfg);
        assert!(load_config(&path).is_err());
    }
}
