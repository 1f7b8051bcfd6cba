use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use directories::{BaseDirs, ProjectDirs};
use once_cell::sync::Lazy;

static SESSION_FILE_NAME: &str = "session.json";
static ENV_DATA_DIR: &str = "TASKDECK_DATA_DIR";
static ENV_API_URL: &str = "TASKDECK_API_URL";
static ENV_HTTP_TIMEOUT: &str = "TASKDECK_HTTP_TIMEOUT_SECS";

pub const DEFAULT_API_URL: &str = "http://localhost:4000";
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(15);

static PROJECT_DIRS: Lazy<Option<ProjectDirs>> =
    Lazy::new(|| ProjectDirs::from("dev", "taskdeck", "taskdeck"));

#[derive(Debug, Clone)]
pub struct AppConfig {
    data_dir: PathBuf,
    session_path: PathBuf,
    api_url: String,
    http_timeout: Duration,
}

impl AppConfig {
    /// Construct [`AppConfig`] from optional overrides, environment variables, and platform
    /// defaults. The data directory is created if it does not exist yet.
    pub fn discover(data_dir_override: Option<PathBuf>, api_url: Option<String>) -> Result<Self> {
        let data_dir = resolve_data_dir(data_dir_override)?;
        if !data_dir.exists() {
            fs::create_dir_all(&data_dir).with_context(|| {
                format!("Failed to create data directory at {}", data_dir.display())
            })?;
        }
        let mut config = Self::from_data_dir(data_dir)?;
        if let Some(url) = api_url.or_else(|| env::var(ENV_API_URL).ok()) {
            config = config.with_api_url(url)?;
        }
        if let Ok(raw) = env::var(ENV_HTTP_TIMEOUT) {
            config.http_timeout = parse_timeout(&raw)?;
        }
        Ok(config)
    }

    /// Construct [`AppConfig`] directly from a resolved data directory, with default API settings.
    pub fn from_data_dir(data_dir: PathBuf) -> Result<Self> {
        let session_path = data_dir.join(SESSION_FILE_NAME);
        Ok(Self {
            data_dir,
            session_path,
            api_url: DEFAULT_API_URL.to_string(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        })
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        let trimmed = url.trim().trim_end_matches('/');
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
            return Err(anyhow!("API URL must start with http:// or https://, got '{url}'"));
        }
        self.api_url = trimmed.to_string();
        Ok(self)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn session_path(&self) -> &Path {
        &self.session_path
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn http_timeout(&self) -> Duration {
        self.http_timeout
    }
}

fn parse_timeout(raw: &str) -> Result<Duration> {
    let secs: u64 = raw
        .trim()
        .parse()
        .with_context(|| format!("{ENV_HTTP_TIMEOUT} must be a whole number of seconds"))?;
    if secs == 0 {
        return Err(anyhow!("{ENV_HTTP_TIMEOUT} must be greater than zero"));
    }
    Ok(Duration::from_secs(secs))
}

fn resolve_data_dir(data_dir_override: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = data_dir_override {
        return Ok(dir);
    }

    if let Ok(env_dir) = env::var(ENV_DATA_DIR) {
        return Ok(PathBuf::from(env_dir));
    }

    if cfg!(debug_assertions) {
        let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        let dev_dir = manifest_dir.join("..").join("tmp").join("dev-taskdeck");
        return Ok(dev_dir);
    }

    if let Some(project) = &*PROJECT_DIRS {
        return Ok(project.data_dir().to_path_buf());
    }

    if let Some(base) = BaseDirs::new() {
        return Ok(base.home_dir().join(".taskdeck"));
    }

    Ok(env::current_dir()?.join(".taskdeck"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn explicit_data_dir_is_created_and_holds_session() {
        let dir = TempDir::new().unwrap();
        let data_dir = dir.path().join("state");

        let config =
            AppConfig::discover(Some(data_dir.clone()), Some("https://todo.example/".into()))
                .unwrap();

        assert!(data_dir.is_dir());
        assert_eq!(config.session_path(), data_dir.join("session.json"));
        assert_eq!(config.api_url(), "https://todo.example");
    }

    #[test]
    fn defaults_apply_without_overrides() {
        let config = AppConfig::from_data_dir(PathBuf::from("/tmp/taskdeck")).unwrap();
        assert_eq!(config.api_url(), DEFAULT_API_URL);
        assert_eq!(config.http_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn rejects_urls_without_scheme() {
        let config = AppConfig::from_data_dir(PathBuf::from("/tmp/taskdeck")).unwrap();
        assert!(config.with_api_url("localhost:4000").is_err());
    }

    #[test]
    fn timeout_must_be_positive_seconds() {
        assert_eq!(parse_timeout(" 30 ").unwrap(), Duration::from_secs(30));
        assert!(parse_timeout("0").is_err());
        assert!(parse_timeout("soon").is_err());
    }
}
