use facegraft_core::{LocatorKind, NormalizerKind, SwapConfig};
use std::path::PathBuf;
use std::time::Duration;

/// Service configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Optional TOML file with engine tuning (`SwapConfig`).
    pub config_path: Option<PathBuf>,
    /// Face detector strategy.
    pub detector: LocatorKind,
    /// How donor pixels are fitted to the recipient face.
    pub alignment: NormalizerKind,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Wall-clock budget for one swap, queueing included.
    pub swap_timeout_secs: u64,
    /// Half-finished photo sessions older than this are dropped.
    pub session_ttl_secs: u64,
    /// Upper bound on concurrently open photo sessions.
    pub max_sessions: usize,
    /// Number of engine worker threads.
    pub engine_workers: usize,
    /// Swap requests that may wait for a free worker.
    pub queue_depth: usize,
    /// Per-field overrides applied on top of the TOML file.
    pub overrides: TuningOverrides,
}

/// Numeric knobs that can be set straight from the environment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TuningOverrides {
    pub scale_factor: Option<f32>,
    pub min_neighbors: Option<u32>,
    pub min_face_size: Option<u32>,
    pub blur_kernel: Option<u32>,
}

impl TuningOverrides {
    pub fn apply(&self, config: &mut SwapConfig) {
        if let Some(v) = self.scale_factor {
            config.locator.scale_factor = v;
        }
        if let Some(v) = self.min_neighbors {
            config.locator.min_neighbors = v;
        }
        if let Some(v) = self.min_face_size {
            config.locator.min_face_size = v;
        }
        if let Some(v) = self.blur_kernel {
            config.mask.blur_kernel = v;
        }
    }
}

impl ServiceConfig {
    /// Load configuration from `FACEGRAFT_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ServiceConfig::from_env`] with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let model_dir = lookup("FACEGRAFT_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| default_data_dir(&lookup).join("models"));

        Self {
            config_path: lookup("FACEGRAFT_CONFIG").map(PathBuf::from),
            detector: parse_or_default(&lookup, "FACEGRAFT_DETECTOR"),
            alignment: parse_or_default(&lookup, "FACEGRAFT_ALIGNMENT"),
            model_dir,
            swap_timeout_secs: env_parse(&lookup, "FACEGRAFT_SWAP_TIMEOUT_SECS").unwrap_or(15),
            session_ttl_secs: env_parse(&lookup, "FACEGRAFT_SESSION_TTL_SECS").unwrap_or(600),
            max_sessions: env_parse(&lookup, "FACEGRAFT_MAX_SESSIONS").unwrap_or(1024),
            engine_workers: env_parse(&lookup, "FACEGRAFT_ENGINE_WORKERS").unwrap_or(2),
            queue_depth: env_parse(&lookup, "FACEGRAFT_QUEUE_DEPTH").unwrap_or(8),
            overrides: TuningOverrides {
                scale_factor: env_parse(&lookup, "FACEGRAFT_SCALE_FACTOR"),
                min_neighbors: env_parse(&lookup, "FACEGRAFT_MIN_NEIGHBORS"),
                min_face_size: env_parse(&lookup, "FACEGRAFT_MIN_FACE_SIZE"),
                blur_kernel: env_parse(&lookup, "FACEGRAFT_BLUR_KERNEL"),
            },
        }
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> PathBuf {
        self.model_dir.join("det_10g.onnx")
    }

    pub fn swap_budget(&self) -> Duration {
        Duration::from_secs(self.swap_timeout_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}

fn default_data_dir(lookup: &impl Fn(&str) -> Option<String>) -> PathBuf {
    lookup("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facegraft")
}

fn env_parse<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

fn parse_or_default<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> T
where
    T: std::str::FromStr<Err = String> + Default,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|e: String| {
            tracing::warn!(key, error = %e, "ignoring invalid value; using default");
            T::default()
        }),
        None => T::default(),
    }
}
