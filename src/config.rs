use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::query::DEFAULT_MAX_KEYWORDS;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub data: DataConfig,
    #[serde(default)]
    pub query: QueryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueryConfig {
    #[serde(default = "default_max_keywords")]
    pub max_keywords: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_keywords: DEFAULT_MAX_KEYWORDS,
        }
    }
}

fn default_max_keywords() -> usize {
    DEFAULT_MAX_KEYWORDS
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.server.bind.trim().is_empty() {
        anyhow::bail!("server.bind must not be empty");
    }

    if config.query.max_keywords == 0 {
        anyhow::bail!("query.max_keywords must be >= 1");
    }

    // Relative data paths are relative to the config file, not the cwd.
    if config.data.path.is_relative() {
        if let Some(dir) = path.parent() {
            config.data.path = dir.join(&config.data.path);
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(content: &str) -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("courses.toml");
        fs::write(&path, content).unwrap();
        (tmp, path)
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let (tmp, path) = write_config(
            r#"[server]
bind = "127.0.0.1:8000"

[data]
path = "course-data.json"
"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.query.max_keywords, 5);
        assert_eq!(config.data.path, tmp.path().join("course-data.json"));
    }

    #[test]
    fn test_absolute_data_path_kept() {
        let (_tmp, path) = write_config(
            r#"[server]
bind = "0.0.0.0:80"

[data]
path = "/srv/courses.json"

[query]
max_keywords = 8
"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.data.path, PathBuf::from("/srv/courses.json"));
        assert_eq!(config.query.max_keywords, 8);
    }

    #[test]
    fn test_zero_max_keywords_rejected() {
        let (_tmp, path) = write_config(
            r#"[server]
bind = "127.0.0.1:8000"

[data]
path = "x.json"

[query]
max_keywords = 0
"#,
        );
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("max_keywords"));
    }

    #[test]
    fn test_missing_section_rejected() {
        let (_tmp, path) = write_config("[server]\nbind = \"127.0.0.1:8000\"\n");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_missing_file_rejected() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
