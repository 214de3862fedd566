use sambung_domain::dispatch::RetryPolicy;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_env: String,
    pub port: u16,
    pub log_level: String,
    pub data_backend: String,
    pub surreal_endpoint: String,
    pub surreal_ns: String,
    pub surreal_db: String,
    pub surreal_user: String,
    pub surreal_pass: String,
    pub redis_url: String,
    pub jwt_secret: String,
    pub auth_dev_bypass_enabled: bool,
    pub grant_max_attempts: u32,
    pub grant_backoff_base_ms: u64,
    pub grant_backoff_max_ms: u64,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        let cfg = config::Config::builder()
            .set_default("app_env", "development")?
            .set_default("port", 3000)?
            .set_default("log_level", "info")?
            .set_default("data_backend", "memory")?
            .set_default("surreal_endpoint", "ws://127.0.0.1:8000")?
            .set_default("surreal_ns", "sambung")?
            .set_default("surreal_db", "connections")?
            .set_default("surreal_user", "root")?
            .set_default("surreal_pass", "root")?
            .set_default("redis_url", "redis://127.0.0.1:6379")?
            .set_default("jwt_secret", "dev-secret")?
            .set_default("auth_dev_bypass_enabled", false)?
            .set_default("grant_max_attempts", 5)?
            .set_default("grant_backoff_base_ms", 1000)?
            .set_default("grant_backoff_max_ms", 60000)?
            .add_source(config::Environment::default().separator("__"))
            .build()?;
        cfg.try_deserialize()
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.grant_max_attempts,
            backoff_base_ms: self.grant_backoff_base_ms,
            backoff_max_ms: self.grant_backoff_max_ms,
        }
    }
}
