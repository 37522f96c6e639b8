use std::path::{Path, PathBuf};

use super::types::{AppConfig, StoreProvider};

/// Get the default opsbook data directory: ~/.opsbook
pub fn get_opsbook_data_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(PathBuf::from(home).join(".opsbook"))
}

pub fn load_from_path(path: &Path) -> anyhow::Result<AppConfig> {
    let s = std::fs::read_to_string(path)?;
    let mut cfg = toml::from_str::<AppConfig>(&s)?;
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

pub fn load_default() -> anyhow::Result<AppConfig> {
    // Priority 1: ~/.opsbook/config.toml (highest)
    let data_dir = get_opsbook_data_dir()?;
    let user_config = data_dir.join("config.toml");

    // Priority 2: ./config.toml (current directory)
    let local_config = Path::new("config.toml");

    let mut cfg: AppConfig = if user_config.exists() {
        let s = std::fs::read_to_string(&user_config)?;
        toml::from_str::<AppConfig>(&s)?
    } else if local_config.exists() {
        let s = std::fs::read_to_string(local_config)?;
        toml::from_str::<AppConfig>(&s)?
    } else {
        AppConfig::default()
    };

    if is_blank(cfg.runs.base_dir.as_deref()) {
        cfg.runs.base_dir = Some(data_dir.join("runs").to_string_lossy().to_string());
    }

    if let StoreProvider::File(ref mut file_cfg) = cfg.store.provider {
        if is_blank(file_cfg.dir.as_deref()) {
            file_cfg.dir = Some(data_dir.join("store").to_string_lossy().to_string());
        }
    }

    if is_blank(cfg.logging.directory.as_deref()) {
        cfg.logging.directory = Some(data_dir.join("logs").to_string_lossy().to_string());
    }

    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

// Environment variable overrides (Priority 0: highest)
fn apply_env_overrides(cfg: &mut AppConfig) {
    if let Some(v) = non_empty_env("OPSBOOK_RUNS_DIR") {
        cfg.runs.base_dir = Some(v);
    }

    if let Some(v) = non_empty_env("OPSBOOK_STORE_PROVIDER") {
        match v.as_str() {
            "memory" => cfg.store.provider = StoreProvider::Memory,
            "file" if matches!(cfg.store.provider, StoreProvider::Memory) => {
                cfg.store.provider = StoreProvider::File(Default::default());
            }
            _ => {}
        }
    }

    if let Some(v) = non_empty_env("OPSBOOK_STORE_DIR") {
        if let StoreProvider::File(ref mut file_cfg) = cfg.store.provider {
            file_cfg.dir = Some(v);
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn is_blank(v: Option<&str>) -> bool {
    v.map(|s| s.trim().is_empty()).unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_from_path_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[runs]\nbase_dir = \"/tmp/opsbook-runs\"\n[logging]\nlevel = \"debug\"\n",
        )
        .unwrap();

        let cfg = load_from_path(&path).unwrap();
        assert_eq!(cfg.logging.level, "debug");
        if std::env::var("OPSBOOK_RUNS_DIR").is_err() {
            assert_eq!(cfg.runs.base_dir.as_deref(), Some("/tmp/opsbook-runs"));
        }
    }

    #[test]
    fn load_from_path_rejects_malformed_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[engine\nmax_parallel_steps = ").unwrap();
        assert!(load_from_path(&path).is_err());
    }
}
