use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::rewrite::{DEFAULT_DISPLAY_HINT, DEFAULT_UNKNOWN_MARKER};

pub const DEFAULT_USER_AGENT: &str = "wikibatch/0.1";
pub const DEFAULT_WRITE_DELAY_MS: u64 = 500;
pub const DEFAULT_READ_DELAY_MS: u64 = 0;
pub const DEFAULT_RATE_LIMIT_COOLDOWN_SECS: u64 = 60;
pub const DEFAULT_ILL_TEMPLATE: &str = "ill";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct BatchConfig {
    #[serde(default)]
    pub wiki: WikiSection,
    #[serde(default)]
    pub batch: BatchSection,
    #[serde(default)]
    pub ill: IllSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikiSection {
    pub api_url: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct BatchSection {
    pub write_delay_ms: Option<u64>,
    pub read_delay_ms: Option<u64>,
    pub rate_limit_cooldown_secs: Option<u64>,
    pub namespace: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct IllSection {
    #[serde(default)]
    pub template_names: Vec<String>,
    pub display_hint: Option<String>,
    pub unknown_marker: Option<String>,
}

impl BatchConfig {
    /// Resolve the wiki API URL: env WIKI_API_URL > config > None.
    pub fn api_url_owned(&self) -> Option<String> {
        if let Some(value) = env_override("WIKI_API_URL") {
            return Some(value);
        }
        self.wiki.api_url.clone()
    }

    /// Resolve user agent: env WIKI_USER_AGENT > config > DEFAULT_USER_AGENT.
    pub fn user_agent(&self) -> String {
        if let Some(value) = env_override("WIKI_USER_AGENT") {
            return value;
        }
        self.wiki
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    pub fn write_delay(&self) -> Duration {
        Duration::from_millis(self.batch.write_delay_ms.unwrap_or(DEFAULT_WRITE_DELAY_MS))
    }

    pub fn read_delay(&self) -> Duration {
        Duration::from_millis(self.batch.read_delay_ms.unwrap_or(DEFAULT_READ_DELAY_MS))
    }

    pub fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_secs(
            self.batch
                .rate_limit_cooldown_secs
                .unwrap_or(DEFAULT_RATE_LIMIT_COOLDOWN_SECS),
        )
    }

    /// Configured category namespace filter; `None` lists every namespace.
    pub fn namespace(&self) -> Option<i32> {
        self.batch.namespace
    }

    /// Namespace filter for category listings: `--all-namespaces`, then
    /// `--namespace`, then the config file, then the job's own default.
    pub fn category_namespace(
        &self,
        flag: Option<i32>,
        all_namespaces: bool,
        job_default: Option<i32>,
    ) -> Option<i32> {
        if all_namespaces {
            return None;
        }
        flag.or(self.namespace()).or(job_default)
    }

    pub fn ill_template_names(&self) -> Vec<String> {
        let names = self
            .ill
            .template_names
            .iter()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        if names.is_empty() {
            vec![DEFAULT_ILL_TEMPLATE.to_string()]
        } else {
            names
        }
    }

    pub fn display_hint(&self) -> &str {
        self.ill.display_hint.as_deref().unwrap_or(DEFAULT_DISPLAY_HINT)
    }

    pub fn unknown_marker(&self) -> &str {
        self.ill
            .unknown_marker
            .as_deref()
            .unwrap_or(DEFAULT_UNKNOWN_MARKER)
    }
}

/// Bot credentials from WIKI_BOT_USER / WIKI_BOT_PASS, when both are set.
pub fn credentials_from_env() -> Option<(String, String)> {
    let username = env_override("WIKI_BOT_USER")?;
    let password = env_override("WIKI_BOT_PASS")?;
    Some((username, password))
}

/// Load and parse a BatchConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<BatchConfig> {
    if !config_path.exists() {
        return Ok(BatchConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: BatchConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

pub fn render_default_config() -> String {
    format!(
        "# wikibatch configuration (written by `wikibatch init`)\n\n[wiki]\n# api_url = \"https://your-wiki.example.org/w/api.php\"\n# user_agent = \"{DEFAULT_USER_AGENT}\"\n\n[batch]\nwrite_delay_ms = {DEFAULT_WRITE_DELAY_MS}\nread_delay_ms = {DEFAULT_READ_DELAY_MS}\nrate_limit_cooldown_secs = {DEFAULT_RATE_LIMIT_COOLDOWN_SECS}\n# namespace = 0  # category listing filter; omit for all namespaces\n\n[ill]\ntemplate_names = [\"{DEFAULT_ILL_TEMPLATE}\"]\ndisplay_hint = \"{DEFAULT_DISPLAY_HINT}\"\nunknown_marker = \"{DEFAULT_UNKNOWN_MARKER}\"\n"
    )
}

fn env_override(key: &str) -> Option<String> {
    let value = env::var(key).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_uses_builtin_values() {
        let config = BatchConfig::default();
        assert!(config.wiki.api_url.is_none());
        assert_eq!(config.write_delay(), Duration::from_millis(500));
        assert_eq!(config.read_delay(), Duration::ZERO);
        assert_eq!(config.rate_limit_cooldown(), Duration::from_secs(60));
        assert_eq!(config.namespace(), None);
        assert_eq!(config.ill_template_names(), vec!["ill"]);
        assert_eq!(config.display_hint(), "thumb");
        assert_eq!(config.unknown_marker(), "UNKNOWN");
    }

    #[test]
    fn load_config_returns_default_for_missing_file() {
        let config = load_config(Path::new("/nonexistent/config.toml")).expect("load config");
        assert_eq!(config, BatchConfig::default());
    }

    #[test]
    fn load_config_parses_all_sections() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(
            &config_path,
            r#"
[wiki]
api_url = "https://shinto.example.org/w/api.php"
user_agent = "test-agent/1.0"

[batch]
write_delay_ms = 1500
read_delay_ms = 300
rate_limit_cooldown_secs = 90
namespace = 14

[ill]
template_names = ["ill", " Interlanguage link ", ""]
display_hint = "frameless"
unknown_marker = "???"
"#,
        )
        .expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert_eq!(
            config.wiki.api_url.as_deref(),
            Some("https://shinto.example.org/w/api.php")
        );
        assert_eq!(config.wiki.user_agent.as_deref(), Some("test-agent/1.0"));
        assert_eq!(config.write_delay(), Duration::from_millis(1500));
        assert_eq!(config.read_delay(), Duration::from_millis(300));
        assert_eq!(config.rate_limit_cooldown(), Duration::from_secs(90));
        assert_eq!(config.namespace(), Some(14));
        assert_eq!(
            config.ill_template_names(),
            vec!["ill".to_string(), "Interlanguage link".to_string()]
        );
        assert_eq!(config.display_hint(), "frameless");
        assert_eq!(config.unknown_marker(), "???");
    }

    #[test]
    fn load_config_tolerates_partial_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, "[batch]\nwrite_delay_ms = 2000\n").expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert!(config.wiki.api_url.is_none());
        assert_eq!(config.write_delay(), Duration::from_millis(2000));
        assert_eq!(config.ill_template_names(), vec!["ill"]);
        assert_eq!(config.namespace(), None);
    }

    #[test]
    fn category_namespace_prefers_flag_then_config_then_job_default() {
        let unset = BatchConfig::default();
        assert_eq!(unset.category_namespace(None, false, None), None);
        assert_eq!(unset.category_namespace(None, false, Some(0)), Some(0));
        assert_eq!(unset.category_namespace(Some(14), false, Some(0)), Some(14));

        let config: BatchConfig = toml::from_str("[batch]\nnamespace = 6\n").expect("parse");
        assert_eq!(config.category_namespace(None, false, Some(0)), Some(6));
        assert_eq!(config.category_namespace(Some(14), false, Some(0)), Some(14));
        assert_eq!(config.category_namespace(None, true, Some(0)), None);
    }

    #[test]
    fn load_config_returns_error_for_invalid_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, "[wiki\napi_url = \"oops\"").expect("write config");
        let error = load_config(&config_path).expect_err("must fail");
        assert!(error.to_string().contains("failed to parse"));
    }

    #[test]
    fn rendered_default_config_parses_back_to_defaults() {
        let parsed: BatchConfig = toml::from_str(&render_default_config()).expect("parse");
        assert!(parsed.wiki.api_url.is_none());
        assert_eq!(parsed.write_delay(), BatchConfig::default().write_delay());
        assert_eq!(parsed.ill_template_names(), vec!["ill"]);
        assert_eq!(parsed.unknown_marker(), "UNKNOWN");
        assert_eq!(parsed.namespace(), None);
    }
}
