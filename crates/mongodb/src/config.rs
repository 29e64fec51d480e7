//! Connection settings for the document store.

use mongodb::options::Credential;
use serde::Deserialize;
use std::time::Duration;

/// Database used when neither the configuration nor the URI names one.
pub const DEFAULT_DATABASE: &str = "datasync";

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    27017
}

/// MongoDB connection settings.
///
/// Either `uri` or the discrete fields are used; `uri` wins when both are
/// present. `database` always overrides the database in the URI path.
#[derive(Debug, Clone, Deserialize)]
pub struct MongoConfig {
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default, alias = "username")]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub auth_source: Option<String>,
    #[serde(default)]
    pub options: MongoOptions,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: None,
            host: default_host(),
            port: default_port(),
            database: None,
            user: None,
            password: None,
            auth_source: None,
            options: MongoOptions::default(),
        }
    }
}

/// Driver timeouts.
#[derive(Debug, Clone, Deserialize)]
pub struct MongoOptions {
    #[serde(default = "MongoOptions::default_server_selection_timeout_ms")]
    pub server_selection_timeout_ms: u64,
    #[serde(default = "MongoOptions::default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl MongoOptions {
    fn default_server_selection_timeout_ms() -> u64 {
        5000
    }

    fn default_connect_timeout_ms() -> u64 {
        10000
    }

    pub fn server_selection_timeout(&self) -> Duration {
        Duration::from_millis(self.server_selection_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for MongoOptions {
    fn default() -> Self {
        Self {
            server_selection_timeout_ms: Self::default_server_selection_timeout_ms(),
            connect_timeout_ms: Self::default_connect_timeout_ms(),
        }
    }
}

impl MongoConfig {
    /// Connection string handed to the driver.
    ///
    /// Discrete credentials are never embedded here; see [`MongoConfig::credential`].
    pub fn connection_uri(&self) -> String {
        if let Some(uri) = &self.uri {
            return uri.clone();
        }
        let mut uri = format!("mongodb://{}:{}/", self.host, self.port);
        if let Some(database) = &self.database {
            uri.push_str(database);
        }
        uri
    }

    /// Credential built from the discrete `user`/`password`/`auth_source`
    /// fields. `None` when `uri` is set or no user is configured.
    pub fn credential(&self) -> Option<Credential> {
        if self.uri.is_some() {
            return None;
        }
        let user = self.user.clone()?;
        Some(
            Credential::builder()
                .username(user)
                .password(self.password.clone())
                .source(self.auth_source.clone())
                .build(),
        )
    }

    /// Connection target without credentials, for log lines.
    pub fn describe(&self) -> String {
        let uri = self.connection_uri();
        match uri.rsplit_once('@') {
            Some((_, rest)) => rest.to_string(),
            None => uri.trim_start_matches("mongodb://").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_from_discrete_fields() {
        let yaml = "host: mongo\ndatabase: app\nusername: sync\npassword: pw\nauth_source: admin\n";
        let config: MongoConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.connection_uri(), "mongodb://mongo:27017/app");
        assert_eq!(config.describe(), "mongo:27017/app");
        assert_eq!(config.options.server_selection_timeout_ms, 5000);
        assert_eq!(config.options.connect_timeout(), Duration::from_secs(10));

        let credential = config.credential().unwrap();
        assert_eq!(credential.username.as_deref(), Some("sync"));
        assert_eq!(credential.password.as_deref(), Some("pw"));
        assert_eq!(credential.source.as_deref(), Some("admin"));
    }

    #[test]
    fn test_special_characters_stay_out_of_the_uri() {
        let config = MongoConfig {
            user: Some("ops@corp".into()),
            password: Some("p@ss:w/rd".into()),
            ..MongoConfig::default()
        };
        assert_eq!(config.connection_uri(), "mongodb://localhost:27017/");
        let credential = config.credential().unwrap();
        assert_eq!(credential.username.as_deref(), Some("ops@corp"));
        assert_eq!(credential.password.as_deref(), Some("p@ss:w/rd"));
        assert_eq!(credential.source, None);
    }

    #[test]
    fn test_no_credential_without_user() {
        let config = MongoConfig {
            password: Some("pw".into()),
            ..MongoConfig::default()
        };
        assert!(config.credential().is_none());
    }

    #[test]
    fn test_uri_used_verbatim() {
        let yaml = "uri: mongodb://localhost:27017/shop\noptions:\n  server_selection_timeout_ms: 250\n";
        let config: MongoConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.connection_uri(), "mongodb://localhost:27017/shop");
        assert!(config.credential().is_none());
        assert_eq!(
            config.options.server_selection_timeout(),
            Duration::from_millis(250)
        );
    }
}
