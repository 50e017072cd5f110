use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub approvals: ApprovalConfig,
    pub mail: MailConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ApprovalConfig {
    /// Permit the global designation-only candidate search when the scoped
    /// search is empty and no explicit project constrains the request.
    pub allow_fallback_lookup: bool,
}

#[derive(Clone, Debug)]
pub struct MailConfig {
    pub from_address: String,
    pub smtp_host: Option<String>,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<SecretString>,
    pub drain_interval_secs: u64,
    pub drain_batch_size: u32,
    pub max_attempts: u32,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub allow_fallback_lookup: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://fundflow.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            approvals: ApprovalConfig { allow_fallback_lookup: true },
            mail: MailConfig {
                from_address: "no-reply@fundflow.local".to_string(),
                smtp_host: None,
                smtp_username: None,
                smtp_password: None,
                drain_interval_secs: 5,
                drain_batch_size: 25,
                max_attempts: 5,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    approvals: Option<ApprovalPatch>,
    mail: Option<MailPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ApprovalPatch {
    allow_fallback_lookup: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct MailPatch {
    from_address: Option<String>,
    smtp_host: Option<String>,
    smtp_username: Option<String>,
    smtp_password: Option<String>,
    drain_interval_secs: Option<u64>,
    drain_batch_size: Option<u32>,
    max_attempts: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("fundflow.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(approvals) = patch.approvals {
            if let Some(allow_fallback_lookup) = approvals.allow_fallback_lookup {
                self.approvals.allow_fallback_lookup = allow_fallback_lookup;
            }
        }

        if let Some(mail) = patch.mail {
            if let Some(from_address) = mail.from_address {
                self.mail.from_address = from_address;
            }
            if let Some(smtp_host) = mail.smtp_host {
                self.mail.smtp_host = Some(smtp_host);
            }
            if let Some(smtp_username) = mail.smtp_username {
                self.mail.smtp_username = Some(smtp_username);
            }
            if let Some(smtp_password) = mail.smtp_password {
                self.mail.smtp_password = Some(smtp_password.into());
            }
            if let Some(drain_interval_secs) = mail.drain_interval_secs {
                self.mail.drain_interval_secs = drain_interval_secs;
            }
            if let Some(drain_batch_size) = mail.drain_batch_size {
                self.mail.drain_batch_size = drain_batch_size;
            }
            if let Some(max_attempts) = mail.max_attempts {
                self.mail.max_attempts = max_attempts;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("FUNDFLOW_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("FUNDFLOW_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("FUNDFLOW_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("FUNDFLOW_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("FUNDFLOW_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("FUNDFLOW_APPROVALS_ALLOW_FALLBACK_LOOKUP") {
            self.approvals.allow_fallback_lookup =
                parse_bool("FUNDFLOW_APPROVALS_ALLOW_FALLBACK_LOOKUP", &value)?;
        }

        if let Some(value) = read_env("FUNDFLOW_MAIL_FROM_ADDRESS") {
            self.mail.from_address = value;
        }
        if let Some(value) = read_env("FUNDFLOW_MAIL_SMTP_HOST") {
            self.mail.smtp_host = Some(value);
        }
        if let Some(value) = read_env("FUNDFLOW_MAIL_SMTP_USERNAME") {
            self.mail.smtp_username = Some(value);
        }
        if let Some(value) = read_env("FUNDFLOW_MAIL_SMTP_PASSWORD") {
            self.mail.smtp_password = Some(value.into());
        }
        if let Some(value) = read_env("FUNDFLOW_MAIL_DRAIN_INTERVAL_SECS") {
            self.mail.drain_interval_secs = parse_u64("FUNDFLOW_MAIL_DRAIN_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = read_env("FUNDFLOW_MAIL_DRAIN_BATCH_SIZE") {
            self.mail.drain_batch_size = parse_u32("FUNDFLOW_MAIL_DRAIN_BATCH_SIZE", &value)?;
        }
        if let Some(value) = read_env("FUNDFLOW_MAIL_MAX_ATTEMPTS") {
            self.mail.max_attempts = parse_u32("FUNDFLOW_MAIL_MAX_ATTEMPTS", &value)?;
        }

        let log_level =
            read_env("FUNDFLOW_LOGGING_LEVEL").or_else(|| read_env("FUNDFLOW_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("FUNDFLOW_LOGGING_FORMAT").or_else(|| read_env("FUNDFLOW_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(allow_fallback_lookup) = overrides.allow_fallback_lookup {
            self.approvals.allow_fallback_lookup = allow_fallback_lookup;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_mail(&self.mail)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("fundflow.toml"), PathBuf::from("config/fundflow.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_mail(mail: &MailConfig) -> Result<(), ConfigError> {
    if !mail.from_address.contains('@') {
        return Err(ConfigError::Validation(
            "mail.from_address must be an email address".to_string(),
        ));
    }

    if mail.drain_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "mail.drain_interval_secs must be greater than zero".to_string(),
        ));
    }

    if mail.drain_batch_size == 0 {
        return Err(ConfigError::Validation(
            "mail.drain_batch_size must be greater than zero".to_string(),
        ));
    }

    if mail.max_attempts == 0 {
        return Err(ConfigError::Validation(
            "mail.max_attempts must be greater than zero".to_string(),
        ));
    }

    if mail.smtp_username.is_some() {
        let missing_password = mail
            .smtp_password
            .as_ref()
            .map(|value| value.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if missing_password {
            return Err(ConfigError::Validation(
                "mail.smtp_password is required when mail.smtp_username is set".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidEnvOverride {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    #[test]
    fn defaults_pass_validation() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.approvals.allow_fallback_lookup);
    }

    #[test]
    fn file_patch_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            r#"
[database]
url = "sqlite://routing.db"
max_connections = 2

[approvals]
allow_fallback_lookup = false

[mail]
from_address = "approvals@example.com"
drain_batch_size = 10

[logging]
level = "debug"
format = "json"
"#
        )
        .expect("write config");

        let config = AppConfig::load(LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            require_file: true,
            overrides: ConfigOverrides::default(),
        })
        .expect("load");

        assert_eq!(config.database.url, "sqlite://routing.db");
        assert_eq!(config.database.max_connections, 2);
        assert!(!config.approvals.allow_fallback_lookup);
        assert_eq!(config.mail.from_address, "approvals@example.com");
        assert_eq!(config.mail.drain_batch_size, 10);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn programmatic_overrides_beat_the_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "[approvals]\nallow_fallback_lookup = true").expect("write config");

        let config = AppConfig::load(LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            require_file: true,
            overrides: ConfigOverrides {
                allow_fallback_lookup: Some(false),
                ..ConfigOverrides::default()
            },
        })
        .expect("load");

        assert!(!config.approvals.allow_fallback_lookup);
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let result = AppConfig::load(LoadOptions {
            config_path: Some("/nonexistent/fundflow.toml".into()),
            require_file: true,
            overrides: ConfigOverrides::default(),
        });
        assert!(matches!(result, Err(ConfigError::MissingConfigFile(_))));
    }

    #[test]
    fn non_sqlite_database_url_fails_validation() {
        let mut config = AppConfig::default();
        config.database.url = "postgres://localhost/fundflow".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn smtp_username_without_password_fails_validation() {
        let mut config = AppConfig::default();
        config.mail.smtp_username = Some("mailer".to_string());
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }
}
