use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub runs: RunsConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub events_out: EventsOutConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or OS temp dir if unset).
    #[serde(default = "default_logging_file")]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "opsbook_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// Optional directory for log files. If empty or unset, uses OS temp dir.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_file() -> bool {
    false
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: default_logging_file(),
            level: default_logging_level(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on concurrently running steps per execution. Unbounded when unset.
    #[serde(default)]
    pub max_parallel_steps: Option<usize>,

    #[serde(default = "default_line_channel_capacity")]
    pub line_channel_capacity: usize,

    /// How long a killed process tree may take to exit before the launcher gives up waiting.
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,

    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

fn default_line_channel_capacity() -> usize {
    1024
}

fn default_kill_grace_ms() -> u64 {
    2_000
}

fn default_event_channel_capacity() -> usize {
    1000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_parallel_steps: None,
            line_channel_capacity: default_line_channel_capacity(),
            kill_grace_ms: default_kill_grace_ms(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RunsConfig {
    /// Base directory for per-run scratch directories. Defaults to `<data dir>/runs`.
    #[serde(default)]
    pub base_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(flatten)]
    pub provider: StoreProvider,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            provider: StoreProvider::File(FileStoreConfig::default()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider")]
pub enum StoreProvider {
    #[serde(rename = "memory")]
    Memory,
    #[serde(rename = "file")]
    File(FileStoreConfig),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileStoreConfig {
    /// Directory holding execution and run records. Defaults to `<data dir>/store`.
    #[serde(default)]
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsOutConfig {
    pub enabled: bool,
    pub path: String,
    pub channel_capacity: usize,
    pub drop_when_full: bool,
}

impl Default for EventsOutConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: "./opsbook.events.jsonl".to_string(),
            channel_capacity: 2048,
            drop_when_full: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let cfg: AppConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.engine.line_channel_capacity, 1024);
        assert!(cfg.engine.max_parallel_steps.is_none());
        assert!(matches!(cfg.store.provider, StoreProvider::File(_)));
        assert!(!cfg.events_out.enabled);
    }

    #[test]
    fn parses_memory_store_and_engine_cap() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [engine]
            max_parallel_steps = 4

            [store]
            provider = "memory"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.engine.max_parallel_steps, Some(4));
        assert!(matches!(cfg.store.provider, StoreProvider::Memory));
    }

    #[test]
    fn parses_file_store_dir() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [store]
            provider = "file"
            dir = "/var/lib/opsbook"
            "#,
        )
        .unwrap();
        match cfg.store.provider {
            StoreProvider::File(f) => assert_eq!(f.dir.as_deref(), Some("/var/lib/opsbook")),
            other => panic!("unexpected provider: {other:?}"),
        }
    }
}
