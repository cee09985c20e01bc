use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::HuddleConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["huddle.toml", "huddle.yaml", "huddle.yml", "huddle.json"];

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unsupported config format: .{0}")]
    UnsupportedFormat(String),
    #[error("invalid TOML in {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid YAML in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Load config from an explicit path (any supported format).
pub fn load_config(path: &Path) -> Result<HuddleConfig, Error> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&substitute_env(&raw), path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./huddle.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/huddle/huddle.{toml,yaml,yml,json}` (user-global)
///
/// Returns `HuddleConfig::default()` if no config file is found or the found
/// file fails to parse (with a warning naming the file).
pub fn discover_and_load() -> HuddleConfig {
    let Some(path) = find_config_file() else {
        debug!("no config file found, using defaults");
        return HuddleConfig::default();
    };
    debug!(path = %path.display(), "loading config");
    match load_config(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            HuddleConfig::default()
        },
    }
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    if let Some(dir) = config_dir() {
        for name in CONFIG_FILENAMES {
            let p = dir.join(name);
            if p.exists() {
                return Some(p);
            }
        }
    }

    None
}

/// The user-global config directory (`~/.config/huddle/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "huddle").map(|d| d.config_dir().to_path_buf())
}

fn parse_config(raw: &str, path: &Path) -> Result<HuddleConfig, Error> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => toml::from_str(raw).map_err(|source| Error::Toml {
            path: path.to_path_buf(),
            source,
        }),
        "yaml" | "yml" => serde_yaml::from_str(raw).map_err(|source| Error::Yaml {
            path: path.to_path_buf(),
            source,
        }),
        "json" => serde_json::from_str(raw).map_err(|source| Error::Json {
            path: path.to_path_buf(),
            source,
        }),
        other => Err(Error::UnsupportedFormat(other.to_string())),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, std::io::Write};

    fn write_file(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "huddle.toml", "[server]\nport = 9000\n");
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.server.port, 9000);
    }

    #[test]
    fn loads_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "huddle.yaml", "session:\n  max_sessions: 3\n");
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.session.max_sessions, 3);
    }

    #[test]
    fn loads_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "huddle.json", r#"{"delivery":{"segment_delay_ms":100}}"#);
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.delivery.segment_delay_ms, 100);
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "huddle.ini", "port=1");
        assert!(matches!(
            load_config(&path),
            Err(Error::UnsupportedFormat(ext)) if ext == "ini"
        ));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        assert!(matches!(
            load_config(Path::new("/nonexistent/huddle.toml")),
            Err(Error::Read { .. })
        ));
    }
}
