//! Environment-variable-driven configuration, following the same
//! `#[serde(default)]` + preset-constructor shape used throughout the
//! jobs subsystem, loaded with the `config` crate's environment source
//! instead of a TOML file.

use serde::{Deserialize, Serialize};

use crate::Result;

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_env() -> String {
    "development".into()
}
fn default_sandbox_count() -> u32 {
    4
}
fn default_temp_dir() -> String {
    "/tmp/dispatch".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobServiceConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for JobServiceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CassandraConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub keyspace: String,
}

impl Default for CassandraConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: 9042,
            keyspace: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RabbitConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub queue_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Auth0Config {
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub audience: String,
    #[serde(default)]
    pub jwks_url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Auth0ClientConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
}

/// Process-wide config. `Config::from_env` is the only expected
/// constructor in production; `Default` exists for tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_env")]
    pub env: String,

    #[serde(default)]
    pub job_service: JobServiceConfig,
    #[serde(default)]
    pub cassandra: CassandraConfig,
    #[serde(default)]
    pub rabbit: RabbitConfig,
    #[serde(default)]
    pub auth0: Auth0Config,
    #[serde(default)]
    pub scheduling_auth0_client: Auth0ClientConfig,
    #[serde(default)]
    pub worker_auth0_client: Auth0ClientConfig,

    #[serde(default)]
    pub worker_id: String,
    #[serde(default = "default_sandbox_count")]
    pub sandbox_count: u32,
    #[serde(default = "default_temp_dir")]
    pub temp_dir: String,
    #[serde(default)]
    pub reporter_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            env: default_env(),
            job_service: JobServiceConfig::default(),
            cassandra: CassandraConfig::default(),
            rabbit: RabbitConfig::default(),
            auth0: Auth0Config::default(),
            scheduling_auth0_client: Auth0ClientConfig::default(),
            worker_auth0_client: Auth0ClientConfig::default(),
            worker_id: String::new(),
            sandbox_count: default_sandbox_count(),
            temp_dir: default_temp_dir(),
            reporter_url: String::new(),
        }
    }
}

impl Config {
    /// Loads configuration from recognized environment variables (§6),
    /// falling back to the documented defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Config::default();

        if let Ok(v) = std::env::var("HOST") {
            cfg.host = v;
        }
        if let Ok(v) = std::env::var("PORT") {
            cfg.port = v.parse().map_err(|_| crate::Error::config("invalid PORT"))?;
        }
        if let Ok(v) = std::env::var("ENV") {
            cfg.env = v;
        }

        if let Ok(v) = std::env::var("JOB_SERVICE_HOST") {
            cfg.job_service.host = v;
        }
        if let Ok(v) = std::env::var("JOB_SERVICE_PORT") {
            cfg.job_service.port = v
                .parse()
                .map_err(|_| crate::Error::config("invalid JOB_SERVICE_PORT"))?;
        }

        if let Ok(v) = std::env::var("CASS_HOST") {
            cfg.cassandra.host = v;
        }
        if let Ok(v) = std::env::var("CASS_PORT") {
            cfg.cassandra.port = v.parse().map_err(|_| crate::Error::config("invalid CASS_PORT"))?;
        }
        if let Ok(v) = std::env::var("CASS_KEYSPACE") {
            cfg.cassandra.keyspace = v;
        }

        if let Ok(v) = std::env::var("RABBIT_HOST") {
            cfg.rabbit.host = v;
        }
        if let Ok(v) = std::env::var("RABBIT_PORT") {
            cfg.rabbit.port = v.parse().map_err(|_| crate::Error::config("invalid RABBIT_PORT"))?;
        }
        if let Ok(v) = std::env::var("RABBIT_USERNAME") {
            cfg.rabbit.username = v;
        }
        if let Ok(v) = std::env::var("RABBIT_PASSWORD") {
            cfg.rabbit.password = v;
        }
        if let Ok(v) = std::env::var("RABBIT_QUEUE_NAME") {
            cfg.rabbit.queue_name = v;
        }
        // RABBIT_LOGGING_USERNAME / RABBIT_LOGGING_PASSWORD feed the `logs`
        // topic exchange, which is out of core scope; recognized but unused.

        if let Ok(v) = std::env::var("VITE_AUTH0_DOMAIN") {
            cfg.auth0.domain = v;
        }
        if let Ok(v) = std::env::var("VITE_AUTH0_AUDIENCE") {
            cfg.auth0.audience = v;
        }
        if let Ok(v) = std::env::var("JWKS_URL") {
            cfg.auth0.jwks_url = v;
        }

        if let Ok(v) = std::env::var("SCHEDULING_AUTH0_CLIENT_ID") {
            cfg.scheduling_auth0_client.client_id = v;
        }
        if let Ok(v) = std::env::var("SCHEDULING_AUTH0_CLIENT_SECRET") {
            cfg.scheduling_auth0_client.client_secret = v;
        }
        if let Ok(v) = std::env::var("WORKER_AUTH0_CLIENT_ID") {
            cfg.worker_auth0_client.client_id = v;
        }
        if let Ok(v) = std::env::var("WORKER_AUTH0_CLIENT_SECRET") {
            cfg.worker_auth0_client.client_secret = v;
        }

        if let Ok(v) = std::env::var("WORKER_ID") {
            cfg.worker_id = v;
        }
        if let Ok(v) = std::env::var("SANDBOX_COUNT") {
            cfg.sandbox_count = v
                .parse()
                .map_err(|_| crate::Error::config("invalid SANDBOX_COUNT"))?;
        }
        if let Ok(v) = std::env::var("TEMP_DIR") {
            cfg.temp_dir = v;
        }
        if let Ok(v) = std::env::var("REPORTER_URL") {
            cfg.reporter_url = v;
        }

        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::default();
        assert_eq!(cfg.sandbox_count, 4);
        assert_eq!(cfg.env, "development");
    }
}
