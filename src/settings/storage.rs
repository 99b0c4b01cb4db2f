//! AI Configuration Storage
//!
//! Loads the AI configuration file, resolving `${VAR}` and `${VAR:default}`
//! placeholders from the process environment. A missing file is not an
//! error: the default configuration is written to disk and used instead.

use super::AiConfig;
use crate::types::{AppError, AppResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

pub const DEFAULT_CONFIG_PATH: &str = "config/ai_config.json";

/// Result of loading the configuration file
#[derive(Debug, Clone)]
pub struct LoadedAiConfig {
    pub config: AiConfig,
    /// Placeholders that had neither an environment value nor a default
    pub unresolved: Vec<String>,
    /// True when the file did not exist and defaults were persisted
    pub created: bool,
}

/// AI configuration storage manager
pub struct ConfigStorage {
    config_path: PathBuf,
}

impl ConfigStorage {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    async fn ensure_dir(&self) -> AppResult<()> {
        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    AppError::Config(format!("cannot create {}: {e}", parent.display()))
                })?;
            }
        }
        Ok(())
    }

    /// Load the configuration, generating and persisting defaults when the file is missing
    pub async fn load_or_create(&self) -> AppResult<LoadedAiConfig> {
        let created = if fs::try_exists(&self.config_path).await.unwrap_or(false) {
            false
        } else {
            self.save(&AiConfig::default()).await?;
            info!(path = %self.config_path.display(), "No AI config found, wrote default configuration");
            true
        };

        let raw = fs::read_to_string(&self.config_path).await.map_err(|e| {
            AppError::Config(format!("cannot read {}: {e}", self.config_path.display()))
        })?;
        let (resolved, unresolved) = substitute_env(&raw, |name| std::env::var(name).ok());
        let config: AiConfig = serde_json::from_str(&resolved).map_err(|e| {
            AppError::Config(format!("invalid AI config {}: {e}", self.config_path.display()))
        })?;

        Ok(LoadedAiConfig {
            config,
            unresolved,
            created,
        })
    }

    /// Persist a configuration as pretty-printed JSON
    pub async fn save(&self, config: &AiConfig) -> AppResult<()> {
        self.ensure_dir().await?;
        let content = serde_json::to_string_pretty(config)
            .map_err(|e| AppError::Config(format!("cannot serialize AI config: {e}")))?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            AppError::Config(format!("cannot write {}: {e}", self.config_path.display()))
        })
    }
}

impl Default for ConfigStorage {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIG_PATH)
    }
}

/// Replace `${NAME}` / `${NAME:default}` placeholders.
///
/// Values are JSON-escaped because placeholders sit inside JSON strings.
/// Malformed placeholders are left untouched.
pub fn substitute_env<F>(input: &str, lookup: F) -> (String, Vec<String>)
where
    F: Fn(&str) -> Option<String>,
{
    let mut output = String::with_capacity(input.len());
    let mut unresolved = Vec::new();
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            output.push_str(&rest[start..]);
            rest = "";
            break;
        };

        let body = &after[..end];
        let (name, default) = match body.split_once(':') {
            Some((name, default)) => (name, Some(default)),
            None => (body, None),
        };

        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            output.push_str(&rest[start..start + 2 + end + 1]);
        } else {
            let value = match (lookup(name), default) {
                (Some(value), _) => value,
                (None, Some(default)) => default.to_string(),
                (None, None) => {
                    unresolved.push(name.to_string());
                    String::new()
                }
            };
            output.push_str(&json_escape(&value));
        }
        rest = &after[end + 1..];
    }
    output.push_str(rest);

    (output, unresolved)
}

fn json_escape(value: &str) -> String {
    let quoted = serde_json::Value::String(value.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "API_KEY" => Some("sk-123".to_string()),
            "QUOTED" => Some("a\"b".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_substitute_plain_and_default() {
        let (out, unresolved) = substitute_env(r#"{"k": "${API_KEY}", "u": "${URL:http://x:1}"}"#, lookup);
        assert_eq!(out, r#"{"k": "sk-123", "u": "http://x:1"}"#);
        assert!(unresolved.is_empty());
    }

    #[test]
    fn test_substitute_unresolved_and_escaped() {
        let (out, unresolved) = substitute_env(r#"["${MISSING}", "${QUOTED}"]"#, lookup);
        assert_eq!(out, r#"["", "a\"b"]"#);
        assert_eq!(unresolved, vec!["MISSING".to_string()]);
    }

    #[test]
    fn test_substitute_leaves_malformed_placeholders() {
        let (out, _) = substitute_env("${not valid} and ${open", lookup);
        assert_eq!(out, "${not valid} and ${open");
    }

    #[tokio::test]
    async fn test_missing_file_creates_default() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("ai_config.json");
        let storage = ConfigStorage::new(&path);

        let loaded = storage.load_or_create().await.unwrap();
        assert!(loaded.created);
        assert!(path.exists());
        assert!(loaded.config.providers["local"].enabled);

        let again = storage.load_or_create().await.unwrap();
        assert!(!again.created);
        assert_eq!(again.config.provider_priority, loaded.config.provider_priority);
    }

    #[tokio::test]
    async fn test_invalid_file_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ai_config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = ConfigStorage::new(&path).load_or_create().await.unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
