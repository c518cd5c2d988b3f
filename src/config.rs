use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} has an invalid value `{value}`")]
    Invalid { key: &'static str, value: String },
}

/// Settings the request handlers and the ingestion pipeline need.
#[derive(Debug, Clone)]
pub struct AppSettings {
    /// Domain used when generating forwarding aliases.
    pub email_domain: String,
    /// Upper bound on the bytes buffered from one webhook request.
    pub max_upload_bytes: usize,
    pub worker: WorkerSettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            email_domain: "yourdomain.com".to_string(),
            max_upload_bytes: 10 * 1024 * 1024,
            worker: WorkerSettings::default(),
        }
    }
}

/// Retry behavior of the ingest worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    /// Attempts after which an ingest job is given up.
    pub max_attempts: i32,
    /// How long a failed job waits before it can be claimed again.
    pub retry_delay: Duration,
    /// A running job untouched for this long is treated as abandoned by its
    /// worker and requeued. Must exceed the classifier timeout.
    pub stale_after: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_delay: Duration::from_secs(15),
            stale_after: Duration::from_secs(300),
        }
    }
}

/// Settings of the chat-completions classifier.
#[derive(Debug, Clone)]
pub struct ClassifierSettings {
    /// Without a key every email falls back to its subject.
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
    pub max_tokens: u32,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            timeout: Duration::from_secs(30),
            max_tokens: 300,
        }
    }
}

pub struct Config {
    pub database_url: String,
    pub server_port: u16,
    pub server_host: String,
    pub upload_dir: PathBuf,
    /// Allowed CORS origin; any origin when unset.
    pub frontend_url: Option<String>,
    pub worker_poll_interval: Duration,
    pub app: AppSettings,
    pub classifier: ClassifierSettings,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let app_defaults = AppSettings::default();
        let worker_defaults = WorkerSettings::default();
        let classifier_defaults = ClassifierSettings::default();

        Ok(Self {
            database_url: lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
            server_port: parse_or(&lookup, "SERVER_PORT", 8080)?,
            server_host: lookup("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            upload_dir: lookup("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("uploads")),
            frontend_url: lookup("FRONTEND_URL").filter(|url| !url.is_empty() && url != "*"),
            worker_poll_interval: Duration::from_secs(parse_or(&lookup, "WORKER_POLL_SECS", 15)?),
            app: AppSettings {
                email_domain: lookup("EMAIL_DOMAIN").unwrap_or(app_defaults.email_domain),
                max_upload_bytes: parse_or(&lookup, "MAX_UPLOAD_BYTES", app_defaults.max_upload_bytes)?,
                worker: WorkerSettings {
                    max_attempts: parse_or(
                        &lookup,
                        "WORKER_MAX_ATTEMPTS",
                        worker_defaults.max_attempts,
                    )?,
                    retry_delay: Duration::from_secs(parse_or(&lookup, "WORKER_RETRY_SECS", 15)?),
                    stale_after: Duration::from_secs(parse_or(&lookup, "WORKER_STALE_SECS", 300)?),
                },
            },
            classifier: ClassifierSettings {
                api_key: lookup("OPENAI_API_KEY").filter(|key| !key.is_empty()),
                base_url: lookup("OPENAI_BASE_URL").unwrap_or(classifier_defaults.base_url),
                model: lookup("OPENAI_MODEL").unwrap_or(classifier_defaults.model),
                timeout: Duration::from_secs(parse_or(&lookup, "CLASSIFIER_TIMEOUT_SECS", 30)?),
                max_tokens: classifier_defaults.max_tokens,
            },
        })
    }

    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.server_host, self.server_port)
    }
}

/// Deployment name reported by `/health`, from `APP_ENV`.
pub fn environment() -> String {
    env::var("APP_ENV")
        .ok()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "development".to_string())
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::from_lookup(lookup_from(&[("DATABASE_URL", "postgres://test")])).unwrap();

        assert_eq!(config.database_url, "postgres://test");
        assert_eq!(config.server_port, 8080);
        assert_eq!(config.server_host, "127.0.0.1");
        assert_eq!(config.upload_dir, PathBuf::from("uploads"));
        assert_eq!(config.app.email_domain, "yourdomain.com");
        assert_eq!(config.app.worker, WorkerSettings::default());
        assert_eq!(config.worker_poll_interval, Duration::from_secs(15));
        assert!(config.classifier.api_key.is_none());
        assert_eq!(config.classifier.model, "gpt-3.5-turbo");
        assert_eq!(config.server_url(), "http://127.0.0.1:8080");
    }

    #[test]
    fn test_config_custom_values() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://test"),
            ("SERVER_PORT", "3000"),
            ("SERVER_HOST", "0.0.0.0"),
            ("EMAIL_DOMAIN", "todone.app"),
            ("OPENAI_API_KEY", "sk-test"),
            ("CLASSIFIER_TIMEOUT_SECS", "5"),
            ("FRONTEND_URL", "*"),
            ("WORKER_MAX_ATTEMPTS", "3"),
            ("WORKER_RETRY_SECS", "60"),
            ("WORKER_STALE_SECS", "900"),
        ]))
        .unwrap();

        assert_eq!(config.server_port, 3000);
        assert_eq!(config.server_host, "0.0.0.0");
        assert_eq!(config.app.email_domain, "todone.app");
        assert_eq!(config.classifier.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.classifier.timeout, Duration::from_secs(5));
        assert!(config.frontend_url.is_none());
        assert_eq!(
            config.app.worker,
            WorkerSettings {
                max_attempts: 3,
                retry_delay: Duration::from_secs(60),
                stale_after: Duration::from_secs(900),
            }
        );
    }

    #[test]
    fn test_config_errors() {
        assert!(matches!(
            Config::from_lookup(lookup_from(&[])),
            Err(ConfigError::Missing("DATABASE_URL"))
        ));
        assert!(matches!(
            Config::from_lookup(lookup_from(&[
                ("DATABASE_URL", "postgres://test"),
                ("SERVER_PORT", "eighty"),
            ])),
            Err(ConfigError::Invalid { key: "SERVER_PORT", .. })
        ));
    }
}
