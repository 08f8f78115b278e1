//! Runtime settings read from the environment (optionally via a `.env` file).

use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("DATABASE_URL must be set to a Postgres instance")]
    MissingDatabaseUrl,
    #[error("{name} has invalid value `{value}`")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(ConfigError::Invalid {
                name: "LOG_FORMAT",
                value: value.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    database_url: Option<String>,
    pub max_connections: u32,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let max_connections = match lookup("DB_MAX_CONNECTIONS") {
            Some(value) => value
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::Invalid {
                    name: "DB_MAX_CONNECTIONS",
                    value,
                })?,
            None => 5,
        };
        let log_format = match lookup("LOG_FORMAT") {
            Some(value) => value.parse()?,
            None => LogFormat::default(),
        };

        Ok(Self {
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            max_connections,
            log_format,
        })
    }

    /// Only commands that touch the database need this.
    pub fn database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or(ConfigError::MissingDatabaseUrl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.database_url(), Err(ConfigError::MissingDatabaseUrl));
    }

    #[test]
    fn reads_all_settings() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/school"),
            ("DB_MAX_CONNECTIONS", "12"),
            ("LOG_FORMAT", "JSON"),
        ])
        .unwrap();
        assert_eq!(config.database_url(), Ok("postgres://localhost/school"));
        assert_eq!(config.max_connections, 12);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn rejects_bad_values() {
        assert_eq!(
            config_from(&[("DB_MAX_CONNECTIONS", "0")]),
            Err(ConfigError::Invalid {
                name: "DB_MAX_CONNECTIONS",
                value: "0".to_string()
            })
        );
        assert!(config_from(&[("LOG_FORMAT", "xml")]).is_err());
    }

    #[test]
    fn blank_database_url_counts_as_missing() {
        let config = config_from(&[("DATABASE_URL", "  ")]).unwrap();
        assert!(config.database_url().is_err());
    }
}
