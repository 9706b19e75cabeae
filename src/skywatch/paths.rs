use anyhow::Result;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct SkywatchPaths {
    pub home: PathBuf,
    pub store_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub config_path: PathBuf,
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

pub fn resolve_paths() -> Result<SkywatchPaths> {
    let home = match env::var("SKYWATCH_HOME") {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => required_home_dir()?.join("skywatch"),
    };

    let store_dir = env_or_default_path("SKYWATCH_STORE_DIR", home.join("store"));
    let logs_dir = env_or_default_path("SKYWATCH_LOGS_DIR", home.join("logs"));
    let config_path = env_or_default_path("SKYWATCH_CONFIG_PATH", home.join("skywatch.toml"));

    Ok(SkywatchPaths {
        home,
        store_dir,
        logs_dir,
        config_path,
    })
}
