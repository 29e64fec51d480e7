//! Connection settings for the relational store.

use serde::Deserialize;
use std::time::Duration;

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_user() -> String {
    "postgres".to_string()
}

/// PostgreSQL connection settings.
///
/// Either `uri` or the discrete `host`/`port`/`database`/`user`/`password`
/// fields are used; `uri` wins when both are present.
#[derive(Debug, Clone, Deserialize)]
pub struct PostgresConfig {
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default = "default_user", alias = "username")]
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub pool: PoolConfig,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            uri: None,
            host: default_host(),
            port: default_port(),
            database: None,
            user: default_user(),
            password: None,
            pool: PoolConfig::default(),
        }
    }
}

/// Client pool sizing.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "PoolConfig::default_max_size")]
    pub max_size: usize,
    /// Connect timeout in seconds.
    #[serde(default = "PoolConfig::default_timeout")]
    pub timeout: u64,
}

impl PoolConfig {
    fn default_max_size() -> usize {
        1
    }

    fn default_timeout() -> u64 {
        30
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: Self::default_max_size(),
            timeout: Self::default_timeout(),
        }
    }
}

impl PostgresConfig {
    /// Build the driver configuration.
    pub fn to_pg_config(&self) -> Result<tokio_postgres::Config, tokio_postgres::Error> {
        let mut config = match &self.uri {
            Some(uri) => uri.parse::<tokio_postgres::Config>()?,
            None => {
                let mut config = tokio_postgres::Config::new();
                config.host(&self.host).port(self.port).user(&self.user);
                if let Some(database) = &self.database {
                    config.dbname(database);
                }
                if let Some(password) = &self.password {
                    config.password(password);
                }
                config
            }
        };
        config.connect_timeout(self.pool.connect_timeout());
        Ok(config)
    }

    /// Connection target without credentials, for log lines.
    pub fn describe(&self) -> String {
        match &self.uri {
            Some(uri) => match uri.rsplit_once('@') {
                Some((_, host)) => host.to_string(),
                None => uri.clone(),
            },
            None => format!(
                "{}:{}/{}",
                self.host,
                self.port,
                self.database.as_deref().unwrap_or("")
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discrete_fields_with_defaults() {
        let yaml = "database: app\nusername: sync\npassword: secret\n";
        let config: PostgresConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 5432);
        assert_eq!(config.user, "sync");
        assert_eq!(config.pool.max_size, 1);
        assert_eq!(config.pool.timeout, 30);

        let pg = config.to_pg_config().unwrap();
        assert_eq!(pg.get_dbname(), Some("app"));
        assert_eq!(pg.get_user(), Some("sync"));
        assert_eq!(pg.get_connect_timeout(), Some(&Duration::from_secs(30)));
    }

    #[test]
    fn test_uri_takes_precedence() {
        let yaml = "uri: postgresql://u:p@db.internal:6543/orders\nhost: ignored\npool:\n  max_size: 4\n  timeout: 5\n";
        let config: PostgresConfig = serde_yaml::from_str(yaml).unwrap();
        let pg = config.to_pg_config().unwrap();
        assert_eq!(pg.get_dbname(), Some("orders"));
        assert_eq!(pg.get_ports(), &[6543]);
        assert_eq!(config.pool.max_size, 4);
        assert_eq!(config.describe(), "db.internal:6543/orders");
    }
}
