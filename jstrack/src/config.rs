#![allow(dead_code)]
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize, Clone)]
pub struct DiffConfig {
    pub max_lines: Option<usize>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct Config {
    pub data_dir: Option<PathBuf>,
    pub format: Option<String>,
    pub diff: Option<DiffConfig>,
}

pub fn load_config(path: Option<&Path>) -> Option<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = Path::new("jstrack.yaml");
            if p.exists() { p.to_path_buf() } else { return None; }
        }
    };
    let s = fs::read_to_string(path).ok()?;
    serde_yaml::from_str(&s).ok()
}

/// Option resolution order: explicit flag, then config file, then the
/// built-in default.
pub fn resolve<T>(flag: Option<T>, cfg: Option<T>, default: T) -> T {
    flag.or(cfg).unwrap_or(default)
}
