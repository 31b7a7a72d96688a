//! Configuration management for lookoutd.
//!
//! Loads settings from `$LOOKOUT_CONFIG` or /etc/lookout/config.toml, falling
//! back to defaults. Endpoint environment variables override the file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/lookout/config.toml";

/// Environment variable naming an alternate config file
pub const CONFIG_ENV: &str = "LOOKOUT_CONFIG";

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Upper bound on an uploaded frame
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Incident database and frame archive locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_frames_dir")]
    pub frames_dir: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/incidents.db")
}

fn default_frames_dir() -> PathBuf {
    PathBuf::from("frames")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            frames_dir: default_frames_dir(),
        }
    }
}

/// Image classification service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// None means heuristic classification only
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_classifier_model")]
    pub model: String,

    #[serde(default = "default_classifier_timeout")]
    pub timeout_secs: u64,
}

fn default_classifier_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_classifier_timeout() -> u64 {
    30
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: default_classifier_model(),
            timeout_secs: default_classifier_timeout(),
        }
    }
}

/// Text embedding provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// None means the local feature-hashing provider
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

fn default_embedding_model() -> String {
    "embedding-001".to_string()
}

fn default_embedding_timeout() -> u64 {
    15
}

fn default_cache_capacity() -> usize {
    256
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: default_embedding_model(),
            timeout_secs: default_embedding_timeout(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

/// External vector index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorConfig {
    /// None means the in-process index is used unconditionally
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_collection")]
    pub collection: String,

    /// Startup connection attempts
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff delay; doubles after each failed attempt
    #[serde(default = "default_base_delay")]
    pub base_delay_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_collection() -> String {
    "incidents".to_string()
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay() -> u64 {
    2
}

fn default_request_timeout() -> u64 {
    10
}

fn default_top_k() -> usize {
    5
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            collection: default_collection(),
            max_attempts: default_max_attempts(),
            base_delay_secs: default_base_delay(),
            timeout_secs: default_request_timeout(),
            top_k: default_top_k(),
        }
    }
}

/// External reasoning process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasonerConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_reasoner_command")]
    pub command: String,

    #[serde(default = "default_reasoner_timeout")]
    pub timeout_secs: u64,

    /// Concurrent reasoning processes
    #[serde(default = "default_reasoner_workers")]
    pub workers: usize,
}

fn default_reasoner_command() -> String {
    "sphinx-cli".to_string()
}

fn default_reasoner_timeout() -> u64 {
    60
}

fn default_reasoner_workers() -> usize {
    4
}

impl Default for ReasonerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            command: default_reasoner_command(),
            timeout_secs: default_reasoner_timeout(),
            workers: default_reasoner_workers(),
        }
    }
}

/// Routing service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default = "default_routing_url")]
    pub base_url: String,

    #[serde(default = "default_routing_timeout")]
    pub timeout_secs: u64,

    /// Pause after each waypoint query (public OSRM allows ~1 req/s)
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,

    /// Wait before the single retry after HTTP 429
    #[serde(default = "default_rate_limit_retry_ms")]
    pub rate_limit_retry_ms: u64,

    /// Half-length of the reroute corridor through an incident, in degrees
    #[serde(default = "default_detour_span")]
    pub detour_span_deg: f64,
}

fn default_routing_url() -> String {
    "http://router.project-osrm.org".to_string()
}

fn default_routing_timeout() -> u64 {
    20
}

fn default_pacing_ms() -> u64 {
    1_100
}

fn default_rate_limit_retry_ms() -> u64 {
    1_500
}

fn default_detour_span() -> f64 {
    0.01
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            base_url: default_routing_url(),
            timeout_secs: default_routing_timeout(),
            pacing_ms: default_pacing_ms(),
            rate_limit_retry_ms: default_rate_limit_retry_ms(),
            detour_span_deg: default_detour_span(),
        }
    }
}

impl RoutingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Top-level daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LookoutConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub vector: VectorConfig,

    #[serde(default)]
    pub reasoner: ReasonerConfig,

    #[serde(default)]
    pub routing: RoutingConfig,
}

impl LookoutConfig {
    /// Load from `$LOOKOUT_CONFIG` or the default path, then apply env overrides.
    pub fn load() -> Self {
        let path = std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(CONFIG_PATH));
        let mut config = Self::load_from(&path);
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Load from a specific path; defaults on any problem.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            info!("No config at {}, using defaults", path.display());
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match Self::parse(&content) {
                Ok(config) => {
                    info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    warn!("Failed to parse {}: {}, using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read {}: {}, using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// `lookup` is injected so tests need not touch the process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty("LOOKOUT_CLASSIFIER_URL") {
            self.classifier.endpoint = Some(url);
        }
        if let Some(url) = non_empty("LOOKOUT_EMBEDDING_URL") {
            self.embedding.endpoint = Some(url);
        }
        if let Some(url) = non_empty("LOOKOUT_VECTOR_URL") {
            self.vector.endpoint = Some(url);
        }
        if let Some(url) = non_empty("LOOKOUT_OSRM_URL") {
            self.routing.base_url = url;
        }
        if let Some(flag) = non_empty("LOOKOUT_REASONER_ENABLED") {
            self.reasoner.enabled = matches!(flag.to_lowercase().as_str(), "1" | "true" | "yes");
        }
    }
}
