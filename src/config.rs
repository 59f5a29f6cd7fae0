/// Configuration module for codeindex.
///
/// Handles loading, validating, and providing default configuration values.
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const DEFAULT_CONFIG_PATH: &str = "codeindex.json";

// ── Default value functions ──────────────────────────────────────────

fn default_db_path() -> String {
    "./codeindex.db".to_string()
}

fn default_exclude_patterns() -> Vec<String> {
    [
        ".git",
        "node_modules",
        "target",
        "dist",
        "build",
        "out",
        "coverage",
        "__pycache__",
        ".venv",
        "venv",
        "vendor",
        "*.min.js",
        "*.min.css",
        "*.map",
        "*.lock",
        "package-lock.json",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_window_lines() -> usize {
    50
}

fn default_overlap_lines() -> usize {
    10
}

fn default_context_lines() -> usize {
    3
}

fn default_max_depth() -> usize {
    32
}

fn default_batch_floor() -> usize {
    10
}

fn default_target_batch_count() -> usize {
    50
}

fn default_batch_ceiling() -> usize {
    100
}

fn default_read_concurrency() -> usize {
    16
}

fn default_hidden_allowlist() -> Vec<String> {
    vec![".github".to_string(), ".gitlab-ci.yml".to_string()]
}

fn default_extra_extensions() -> Vec<String> {
    ["md", "json", "yaml", "yml", "toml", "sh", "bash", "sql", "rb", "lua"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_special_filenames() -> Vec<String> {
    ["Dockerfile", "Makefile", "Rakefile", "Gemfile", "Jenkinsfile", "CMakeLists.txt"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_high_water_mb() -> u64 {
    1024
}

fn default_max_file_bytes() -> u64 {
    2 * 1024 * 1024
}

fn default_true() -> bool {
    true
}

fn default_dimensions() -> usize {
    384
}

fn default_max_chars() -> usize {
    8000
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_queue_capacity() -> usize {
    1024
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Gitignore-style globs; a leading `!` re-includes.
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub scan: ScanConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub watch: WatchConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    #[serde(default = "default_window_lines")]
    pub window_lines: usize,

    #[serde(default = "default_overlap_lines")]
    pub overlap_lines: usize,

    #[serde(default = "default_context_lines")]
    pub context_lines: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScanConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    #[serde(default = "default_batch_floor")]
    pub batch_floor: usize,

    #[serde(default = "default_target_batch_count")]
    pub target_batch_count: usize,

    #[serde(default = "default_batch_ceiling")]
    pub batch_ceiling: usize,

    #[serde(default = "default_read_concurrency")]
    pub read_concurrency: usize,

    /// Hidden entries (leading `.`) that are still walked
    #[serde(default = "default_hidden_allowlist")]
    pub hidden_allowlist: Vec<String>,

    /// Extensions indexed on top of every registered language's own
    #[serde(default = "default_extra_extensions")]
    pub extra_extensions: Vec<String>,

    #[serde(default = "default_special_filenames")]
    pub special_filenames: Vec<String>,

    #[serde(default = "default_true")]
    pub respect_gitignore: bool,

    /// Files larger than this are skipped
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,

    #[serde(default = "default_high_water_mb")]
    pub memory_high_water_mb: u64,

    /// Delete stored rows for files that disappeared since the last full scan
    #[serde(default = "default_true")]
    pub prune_missing: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Also embed every chunk (second batched call per batch)
    #[serde(default)]
    pub embed_chunks: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatchConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            exclude_patterns: default_exclude_patterns(),
            chunking: ChunkingConfig::default(),
            scan: ScanConfig::default(),
            embedding: EmbeddingConfig::default(),
            watch: WatchConfig::default(),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            window_lines: default_window_lines(),
            overlap_lines: default_overlap_lines(),
            context_lines: default_context_lines(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            batch_floor: default_batch_floor(),
            target_batch_count: default_target_batch_count(),
            batch_ceiling: default_batch_ceiling(),
            read_concurrency: default_read_concurrency(),
            hidden_allowlist: default_hidden_allowlist(),
            extra_extensions: default_extra_extensions(),
            special_filenames: default_special_filenames(),
            respect_gitignore: default_true(),
            max_file_bytes: default_max_file_bytes(),
            memory_high_water_mb: default_high_water_mb(),
            prune_missing: default_true(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            dimensions: default_dimensions(),
            max_chars: default_max_chars(),
            timeout_secs: default_timeout_secs(),
            embed_chunks: false,
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to `"codeindex.json"`.
    /// If the file does not exist, returns a default config and generates a
    /// template when the default path was used.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            DEFAULT_CONFIG_PATH
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            if path == DEFAULT_CONFIG_PATH {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        let chunking = &self.chunking;
        anyhow::ensure!(chunking.window_lines > 0, "chunking.window_lines must be positive");
        anyhow::ensure!(
            chunking.overlap_lines < chunking.window_lines,
            "chunking.overlap_lines must be smaller than chunking.window_lines"
        );

        let scan = &self.scan;
        anyhow::ensure!(scan.max_depth > 0, "scan.max_depth must be positive");
        anyhow::ensure!(scan.batch_floor > 0, "scan.batch_floor must be positive");
        anyhow::ensure!(
            scan.batch_floor <= scan.batch_ceiling,
            "scan.batch_floor must not exceed scan.batch_ceiling"
        );
        anyhow::ensure!(
            scan.target_batch_count > 0,
            "scan.target_batch_count must be positive"
        );
        anyhow::ensure!(
            scan.read_concurrency > 0,
            "scan.read_concurrency must be positive"
        );

        anyhow::ensure!(
            self.embedding.dimensions > 0,
            "embedding.dimensions must be positive"
        );
        anyhow::ensure!(
            self.embedding.max_chars > 0,
            "embedding.max_chars must be positive"
        );
        anyhow::ensure!(
            self.embedding.timeout_secs > 0,
            "embedding.timeout_secs must be positive"
        );
        anyhow::ensure!(
            self.watch.queue_capacity > 0,
            "watch.queue_capacity must be positive"
        );
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.chunking.window_lines, 50);
        assert_eq!(config.chunking.overlap_lines, 10);
        assert_eq!(config.chunking.context_lines, 3);
        assert_eq!(config.scan.max_depth, 32);
        assert_eq!(config.embedding.timeout_secs, 30);
        assert_eq!(config.scan.memory_high_water_mb, 1024);
        assert_eq!(config.watch.debounce_ms, 500);
        assert!(config.exclude_patterns.iter().any(|p| p == "node_modules"));
    }

    #[test]
    fn test_load_from_json() {
        let json = r#"{"db_path": "./test.db", "chunking": {"window_lines": 80}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.db_path, "./test.db");
        assert_eq!(config.chunking.window_lines, 80);
        // Other fields should have defaults
        assert_eq!(config.chunking.overlap_lines, 10);
        assert_eq!(config.embedding.dimensions, 384);
    }

    #[test]
    fn test_validate_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_overlap_not_below_window() {
        let mut config = Config::default();
        config.chunking.overlap_lines = 50;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_batch_bounds() {
        let mut config = Config::default();
        config.scan.batch_floor = 200;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.db_path, default_db_path());
        // Only the default path gets a template
        assert!(!path.exists());
    }

    #[test]
    fn test_invalid_json_falls_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.chunking.window_lines, 50);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("codeindex.json");
        let mut config = Config::default();
        config.scan.prune_missing = false;
        config.save(path.to_str().unwrap()).unwrap();
        let loaded = Config::load(path.to_str().unwrap()).unwrap();
        assert!(!loaded.scan.prune_missing);
        assert_eq!(loaded.exclude_patterns, config.exclude_patterns);
    }
}
