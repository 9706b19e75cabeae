use std::env;
use std::path::PathBuf;

include!(concat!(env!("OUT_DIR"), "/skywatch_env_allowlist.rs"));

const ENV_PREFIX: &str = "SKYWATCH_";

fn fallback_dotenv_path(
    skywatch_home: Option<PathBuf>,
    home_dir: Option<PathBuf>,
) -> Option<PathBuf> {
    if let Some(base) = skywatch_home {
        return Some(base.join(".env"));
    }
    Some(home_dir?.join("skywatch/.env"))
}

pub fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let fallback = fallback_dotenv_path(
        env::var_os("SKYWATCH_HOME").map(PathBuf::from),
        dirs::home_dir(),
    );

    let Some(path) = fallback else {
        return;
    };
    if path.is_file() {
        let _ = dotenvy::from_path(&path);
    }
}

/// Prefixed variables that no code path reads, usually typos.
pub fn unknown_env_keys<I>(keys: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut out: Vec<String> = keys
        .into_iter()
        .filter(|k| k.starts_with(ENV_PREFIX))
        .filter(|k| !GENERATED_SKYWATCH_ENV_ALLOWLIST.contains(&k.as_str()))
        .collect();
    out.sort();
    out.dedup();
    out
}
