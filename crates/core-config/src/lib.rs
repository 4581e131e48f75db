//! Configuration loading and parsing (`memax.toml`).
//!
//! Scope: execution limits (`[limits]`) and ring capacities (`[rings]`).
//! Discovery prefers a local `memax.toml` before the platform config dir.
//! Unknown fields are ignored (TOML deserialization tolerance) so the
//! file format can evolve without breaking older binaries; a file that
//! fails to parse falls back to defaults rather than aborting startup.

use anyhow::Result;
use serde::Deserialize;
use std::{fs, path::PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    /// Maximum iterations of one loop block; 0 = unbounded.
    #[serde(default = "LimitsConfig::default_max_loop")]
    pub max_loop: u32,
    /// Maximum macro recursion depth; 0 = unbounded.
    #[serde(default = "LimitsConfig::default_max_macro_depth")]
    pub max_macro_depth: u32,
    /// Maximum array nesting for clone/compare walks.
    #[serde(default = "LimitsConfig::default_max_array_depth")]
    pub max_array_depth: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_loop: Self::default_max_loop(),
            max_macro_depth: Self::default_max_macro_depth(),
            max_array_depth: Self::default_max_array_depth(),
        }
    }
}

impl LimitsConfig {
    const fn default_max_loop() -> u32 {
        2500
    }
    const fn default_max_macro_depth() -> u32 {
        100
    }
    const fn default_max_array_depth() -> u32 {
        32
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RingsConfig {
    #[serde(default = "RingsConfig::default_kill")]
    pub kill: usize,
    #[serde(default = "RingsConfig::default_delete")]
    pub delete: usize,
    #[serde(default = "RingsConfig::default_search")]
    pub search: usize,
    #[serde(default = "RingsConfig::default_replace")]
    pub replace: usize,
}

impl Default for RingsConfig {
    fn default() -> Self {
        Self {
            kill: Self::default_kill(),
            delete: Self::default_delete(),
            search: Self::default_search(),
            replace: Self::default_replace(),
        }
    }
}

impl RingsConfig {
    const fn default_kill() -> usize {
        40
    }
    const fn default_delete() -> usize {
        30
    }
    const fn default_search() -> usize {
        40
    }
    const fn default_replace() -> usize {
        20
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ConfigFile {
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub rings: RingsConfig,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub raw: Option<String>, // original file string (optional)
    pub file: ConfigFile,    // parsed (or default) data
}

/// Best-effort config path following platform conventions.
pub fn discover() -> PathBuf {
    let local = PathBuf::from("memax.toml");
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("memax").join("memax.toml");
    }
    PathBuf::from("memax.toml")
}

pub fn load_from(path: Option<PathBuf>) -> Result<Config> {
    let path = path.unwrap_or_else(discover);
    if let Ok(content) = fs::read_to_string(&path) {
        match toml::from_str::<ConfigFile>(&content) {
            Ok(file) => {
                info!(target: "config", path = %path.display(), "loaded config");
                Ok(Config {
                    raw: Some(content),
                    file,
                })
            }
            Err(_e) => {
                // On parse error fall back to defaults.
                Ok(Config::default())
            }
        }
    } else {
        Ok(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn default_config_when_missing_file() {
        let cfg = load_from(Some(PathBuf::from("__nonexistent_hopefully__.toml"))).unwrap();
        assert_eq!(cfg.file.limits.max_loop, 2500);
        assert_eq!(cfg.file.rings.kill, 40);
    }

    #[test]
    fn parses_limit_and_ring_values() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            "[limits]\nmax_loop = 10\nmax_macro_depth = 4\n[rings]\nkill = 5\n",
        )
        .unwrap();
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(cfg.file.limits.max_loop, 10);
        assert_eq!(cfg.file.limits.max_macro_depth, 4);
        assert_eq!(cfg.file.limits.max_array_depth, 32, "default preserved");
        assert_eq!(cfg.file.rings.kill, 5);
        assert_eq!(cfg.file.rings.search, 40, "default preserved");
    }

    #[test]
    fn unparseable_file_falls_back_to_defaults() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "not [valid toml").unwrap();
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(cfg.file.limits.max_macro_depth, 100);
        assert!(cfg.raw.is_none());
    }
}
