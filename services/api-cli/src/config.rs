//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! `API_BASE_URL` overrides `api.base_url`; when it is set the config file
//! becomes optional.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// Remote API settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    /// Prefix for relative request paths, e.g. `https://api.example.com`
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Where the session's tokens live between runs
#[derive(Debug, Default, Deserialize)]
pub struct SessionConfig {
    /// JSON file holding the token pair. Without it the session lasts one run.
    #[serde(default)]
    pub token_file: Option<PathBuf>,
}

fn default_timeout() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let env_base_url = std::env::var("API_BASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty());

        let mut config = match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str::<Config>(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && env_base_url.is_some() => {
                Config {
                    api: ApiConfig::default(),
                    session: SessionConfig::default(),
                }
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(base_url) = env_base_url {
            config.api.base_url = base_url;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {:?}",
                self.api.base_url
            )));
        }

        if self.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("tutor-api.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mutex to serialize tests that mutate environment variables, preventing
    /// data races when tests run in parallel.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn write_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("tutor-api.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    const VALID_TOML: &str = r#"
[api]
base_url = "https://api.example.com"

[session]
token_file = "/var/lib/tutor-api/session.json"
"#;

    #[test]
    fn test_load_valid_config() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("API_BASE_URL") };
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, VALID_TOML);

        let config = Config::load(&path).unwrap();
        assert_eq!(config.api.base_url, "https://api.example.com");
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(
            config.session.token_file,
            Some(PathBuf::from("/var/lib/tutor-api/session.json"))
        );
    }

    #[test]
    fn test_session_section_is_optional() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("API_BASE_URL") };
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "[api]\nbase_url = \"http://localhost:8080\"\n");

        let config = Config::load(&path).unwrap();
        assert!(config.session.token_file.is_none());
    }

    #[test]
    fn test_load_missing_file_without_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("API_BASE_URL") };
        let result = Config::load(Path::new("/nonexistent/path/tutor-api.toml"));
        assert!(matches!(result, Err(common::Error::Io(_))));
    }

    #[test]
    fn test_missing_file_allowed_with_env_base_url() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("API_BASE_URL", "https://env.example.com") };
        let config = Config::load(Path::new("/nonexistent/path/tutor-api.toml")).unwrap();
        unsafe { remove_env("API_BASE_URL") };

        assert_eq!(config.api.base_url, "https://env.example.com");
        assert_eq!(config.api.timeout_secs, 30);
    }

    #[test]
    fn test_env_overrides_file_base_url() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, VALID_TOML);

        unsafe { set_env("API_BASE_URL", "https://staging.example.com") };
        let config = Config::load(&path).unwrap();
        unsafe { remove_env("API_BASE_URL") };

        assert_eq!(config.api.base_url, "https://staging.example.com");
    }

    #[test]
    fn test_load_invalid_toml() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("API_BASE_URL") };
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "not valid {{{{ toml");

        let result = Config::load(&path);
        assert!(matches!(result, Err(common::Error::Toml(_))));
    }

    #[test]
    fn test_rejects_non_http_base_url() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("API_BASE_URL") };
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "[api]\nbase_url = \"api.example.com\"\n");

        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("base_url"), "got: {err}");
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("API_BASE_URL") };
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "[api]\nbase_url = \"https://api.example.com\"\ntimeout_secs = 0\n",
        );

        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("timeout_secs"), "got: {err}");
    }

    #[test]
    fn test_resolve_path_cli_arg() {
        let path = Config::resolve_path(Some("/custom/path.toml"));
        assert_eq!(path, PathBuf::from("/custom/path.toml"));
    }

    #[test]
    fn test_resolve_path_env_var() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/path.toml") };
        let path = Config::resolve_path(None);
        unsafe { remove_env("CONFIG_PATH") };
        assert_eq!(path, PathBuf::from("/env/path.toml"));
    }

    #[test]
    fn test_resolve_path_default() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("CONFIG_PATH") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("tutor-api.toml"));
    }

    #[test]
    fn test_resolve_path_cli_overrides_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/should-lose.toml") };
        let path = Config::resolve_path(Some("/cli/wins.toml"));
        unsafe { remove_env("CONFIG_PATH") };
        assert_eq!(
            path,
            PathBuf::from("/cli/wins.toml"),
            "CLI arg must take precedence over CONFIG_PATH env var"
        );
    }
}
