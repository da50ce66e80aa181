use figment::providers::{Env, Serialized};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Process-wide configuration, resolved once at startup.
///
/// Defaults below are overridden by environment variables prefixed with
/// `TRAINHUB_`, nested sections separated by `__`
/// (e.g. `TRAINHUB_BASIC__BIND`, `TRAINHUB_AUTH__ADMIN_PASSWORD`).
pub static CONFIG: LazyLock<Config> = LazyLock::new(|| {
    Config::load().unwrap_or_else(|e| {
        eprintln!("invalid configuration: {e}");
        std::process::exit(1);
    })
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub basic: Basic,
    pub auth: Auth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Basic {
    pub bind: String,
    pub database_url: String,
    pub loglevel: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Auth {
    /// Bootstrap account created when the users collection is empty.
    pub admin_username: String,
    pub admin_password: String,
    /// Session lifetime in hours.
    pub session_ttl_hours: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            basic: Basic {
                bind: "0.0.0.0:8000".to_string(),
                database_url: "sqlite:trainhub.sqlite".to_string(),
                loglevel: "info".to_string(),
            },
            auth: Auth {
                admin_username: "admin".to_string(),
                admin_password: "admin".to_string(),
                session_ttl_hours: 720,
            },
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Env::prefixed("TRAINHUB_").split("__"))
            .extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_complete() {
        let cfg = Config::default();
        assert_eq!(cfg.basic.bind, "0.0.0.0:8000");
        assert_eq!(cfg.auth.session_ttl_hours, 720);
    }

    #[test]
    fn load_without_env_matches_defaults() {
        let cfg = Config::load().expect("load config");
        assert_eq!(cfg.auth.admin_username, "admin");
    }
}
