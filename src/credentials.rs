//! Connection settings resolved from environment variables or a profile file.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::DbxResult;

pub const HOST_VAR: &str = "DATABRICKS_HOST";
pub const TOKEN_VAR: &str = "DATABRICKS_TOKEN";
pub const USERNAME_VAR: &str = "DATABRICKS_USERNAME";
pub const PASSWORD_VAR: &str = "DATABRICKS_PASSWORD";
pub const INSECURE_VAR: &str = "DATABRICKS_INSECURE";
pub const CONFIG_FILE_VAR: &str = "DATABRICKS_CONFIG_FILE";

const DEFAULT_SECTION: &str = "DEFAULT";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabricksConfig {
    pub host: String,
    pub token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub insecure: bool,
}

impl DatabricksConfig {
    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| get(key).filter(|v| !v.trim().is_empty());
        Self {
            host: non_empty("host").unwrap_or_default(),
            token: non_empty("token"),
            username: non_empty("username"),
            password: non_empty("password"),
            insecure: non_empty("insecure")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
                .unwrap_or(false),
        }
    }

    /// A host plus either a token or a username/password pair.
    pub fn is_valid(&self) -> bool {
        !self.host.is_empty()
            && (self.token.is_some() || (self.username.is_some() && self.password.is_some()))
    }
}

/// Reads `DATABRICKS_*` variables.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentVariableConfigProvider {
    vars: HashMap<String, String>,
}

impl EnvironmentVariableConfigProvider {
    pub fn from_env() -> Self {
        let vars = [HOST_VAR, TOKEN_VAR, USERNAME_VAR, PASSWORD_VAR, INSECURE_VAR]
            .into_iter()
            .filter_map(|key| std::env::var(key).ok().map(|v| (key.to_string(), v)))
            .collect();
        Self { vars }
    }

    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get_config(&self) -> Option<DatabricksConfig> {
        let config = DatabricksConfig::from_lookup(|key| {
            let var = match key {
                "host" => HOST_VAR,
                "token" => TOKEN_VAR,
                "username" => USERNAME_VAR,
                "password" => PASSWORD_VAR,
                "insecure" => INSECURE_VAR,
                _ => return None,
            };
            self.vars.get(var).cloned()
        });
        config.is_valid().then_some(config)
    }
}

type Sections = HashMap<String, HashMap<String, String>>;

/// Minimal INI reader: `[section]` headers, `key = value` (or `key: value`)
/// pairs, indented continuation lines and full-line `#`/`;` comments.
fn parse_profiles(content: &str) -> Sections {
    let mut sections: Sections = HashMap::new();
    let mut current: Option<String> = None;
    let mut last_key: Option<String> = None;

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }

        let Some(section) = current.as_ref() else {
            if let Some(name) = section_header(trimmed) {
                sections.entry(name.clone()).or_default();
                current = Some(name);
            }
            continue;
        };

        if line.starts_with([' ', '\t']) {
            if let Some(key) = &last_key {
                if let Some(value) = sections.get_mut(section).and_then(|s| s.get_mut(key)) {
                    if !value.is_empty() {
                        value.push('\n');
                    }
                    value.push_str(trimmed);
                    continue;
                }
            }
        }

        if let Some(name) = section_header(trimmed) {
            sections.entry(name.clone()).or_default();
            current = Some(name);
            last_key = None;
            continue;
        }

        let Some(pos) = trimmed.find(['=', ':']) else {
            continue;
        };
        let key = trimmed[..pos].trim().to_ascii_lowercase();
        let value = trimmed[pos + 1..].trim().to_string();
        sections
            .entry(section.clone())
            .or_default()
            .insert(key.clone(), value);
        last_key = Some(key);
    }

    sections
}

fn section_header(line: &str) -> Option<String> {
    line.strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .map(|name| name.trim().to_string())
}

/// Reads one named section of the profile file (`~/.databrickscfg` by default).
#[derive(Debug, Clone)]
pub struct ProfileConfigProvider {
    profile: String,
    path: Option<PathBuf>,
}

impl ProfileConfigProvider {
    pub fn new(profile: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
            path: default_profile_path(),
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// Keys missing from the section fall back to `[DEFAULT]`.
    pub fn get_config(&self) -> DbxResult<Option<DatabricksConfig>> {
        let Some(path) = self.path.as_deref() else {
            return Ok(None);
        };
        let Some(sections) = read_profiles(path)? else {
            return Ok(None);
        };

        let Some(section) = sections.get(&self.profile) else {
            return Ok(None);
        };
        let defaults = sections.get(DEFAULT_SECTION);

        let config = DatabricksConfig::from_lookup(|key| {
            section
                .get(key)
                .filter(|v| !v.is_empty())
                .or_else(|| defaults.and_then(|d| d.get(key)))
                .cloned()
        });
        Ok(config.is_valid().then_some(config))
    }
}

fn read_profiles(path: &Path) -> DbxResult<Option<Sections>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    Ok(Some(parse_profiles(&content)))
}

pub fn default_profile_path() -> Option<PathBuf> {
    std::env::var(CONFIG_FILE_VAR)
        .ok()
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|home| home.join(".databrickscfg")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILES: &str = r#"
[DEFAULT]
host = https://default.example.com
token = dapi-default

; staging workspace
[staging]
host = https://staging.example.com
username = ci-bot
password = hunter2

[partial]
token = dapi-partial

[broken]
host =
"#;

    fn provider(profile: &str) -> (tempfile::TempDir, ProfileConfigProvider) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".databrickscfg");
        fs::write(&path, PROFILES).unwrap();
        let provider = ProfileConfigProvider::new(profile).with_path(path);
        (dir, provider)
    }

    #[test]
    fn env_provider_requires_host_and_auth() {
        assert_eq!(
            EnvironmentVariableConfigProvider::from_vars([(HOST_VAR, "https://x")]).get_config(),
            None
        );

        let config = EnvironmentVariableConfigProvider::from_vars([
            (HOST_VAR, "https://x"),
            (TOKEN_VAR, "dapi"),
            (INSECURE_VAR, "True"),
        ])
        .get_config()
        .unwrap();
        assert_eq!(config.token.as_deref(), Some("dapi"));
        assert!(config.insecure);
    }

    #[test]
    fn env_provider_accepts_basic_auth() {
        let config = EnvironmentVariableConfigProvider::from_vars([
            (HOST_VAR, "https://x"),
            (USERNAME_VAR, "me"),
            (PASSWORD_VAR, "secret"),
        ])
        .get_config();
        assert!(config.is_some());
    }

    #[test]
    fn profile_section_is_read() {
        let (_dir, provider) = provider("staging");
        let config = provider.get_config().unwrap().unwrap();
        assert_eq!(config.host, "https://staging.example.com");
        assert_eq!(config.username.as_deref(), Some("ci-bot"));
        // token inherited from [DEFAULT]
        assert_eq!(config.token.as_deref(), Some("dapi-default"));
    }

    #[test]
    fn profile_falls_back_to_default_host() {
        let (_dir, provider) = provider("partial");
        let config = provider.get_config().unwrap().unwrap();
        assert_eq!(config.host, "https://default.example.com");
        assert_eq!(config.token.as_deref(), Some("dapi-partial"));
    }

    #[test]
    fn unknown_profile_yields_nothing() {
        let (_dir, provider) = provider("prod");
        assert_eq!(provider.get_config().unwrap(), None);
    }

    #[test]
    fn empty_host_is_inherited_not_invalid() {
        let (_dir, provider) = provider("broken");
        let config = provider.get_config().unwrap().unwrap();
        assert_eq!(config.host, "https://default.example.com");
    }

    #[test]
    fn indented_lines_continue_the_previous_value() {
        let sections = parse_profiles(
            "[DEFAULT]\nhost = https://a.example.com\ntoken =\n    dapi-\n    wrapped\n",
        );
        assert_eq!(sections["DEFAULT"]["token"], "dapi-\nwrapped");
        assert_eq!(sections["DEFAULT"]["host"], "https://a.example.com");
    }

    #[test]
    fn colon_delimiter_keeps_url_values_intact() {
        let sections = parse_profiles("[ci]\nhost: https://ci.example.com:8443\n");
        assert_eq!(sections["ci"]["host"], "https://ci.example.com:8443");
    }

    #[test]
    fn missing_profile_file_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let provider =
            ProfileConfigProvider::new("DEFAULT").with_path(dir.path().join("absent.cfg"));
        assert_eq!(provider.get_config().unwrap(), None);
    }
}
