use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use surrealdb::engine::remote::ws::{Client, Ws};
use surrealdb::opt::auth::Root;
use surrealdb::Surreal;
use tokio::net::TcpStream;
use tokio::time::timeout;
use url::Url;

use crate::config::AppConfig;

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub endpoint: String,
    pub namespace: String,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl DbConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            endpoint: config.surreal_endpoint.clone(),
            namespace: config.surreal_ns.clone(),
            database: config.surreal_db.clone(),
            username: config.surreal_user.clone(),
            password: config.surreal_pass.clone(),
        }
    }
}

pub async fn connect(config: &DbConfig) -> anyhow::Result<Arc<Surreal<Client>>> {
    let db = Surreal::<Client>::init();
    db.connect::<Ws>(&config.endpoint)
        .await
        .context("surreal connect failed")?;
    db.signin(Root {
        username: &config.username,
        password: &config.password,
    })
    .await
    .context("surreal signin failed")?;
    db.use_ns(&config.namespace)
        .use_db(&config.database)
        .await
        .context("surreal namespace selection failed")?;
    Ok(Arc::new(db))
}

/// Cheap reachability probe used at startup before the real connection is
/// attempted.
pub async fn health_check(config: &DbConfig) -> anyhow::Result<()> {
    let address = parse_socket_address(&config.endpoint)?;
    let connect = timeout(Duration::from_secs(2), TcpStream::connect(&address))
        .await
        .context("surreal endpoint connect timed out")?;
    connect.context("surreal endpoint connect failed")?;

    tracing::debug!(
        endpoint = config.endpoint,
        namespace = config.namespace,
        database = config.database,
        "surreal health check succeeded"
    );
    Ok(())
}

fn parse_socket_address(endpoint: &str) -> anyhow::Result<String> {
    let normalized = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("ws://{endpoint}")
    };
    let parsed = Url::parse(&normalized)
        .with_context(|| format!("invalid surreal endpoint '{endpoint}'"))?;

    let scheme = parsed.scheme();
    let host = parsed
        .host_str()
        .with_context(|| format!("missing surreal host in endpoint '{endpoint}'"))?;
    let port = parsed.port().unwrap_or(match scheme {
        "wss" | "https" => 443,
        _ => 8000,
    });
    Ok(format!("{host}:{port}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_address_defaults_the_ws_port() {
        assert_eq!(
            parse_socket_address("ws://surreal.internal").unwrap(),
            "surreal.internal:8000"
        );
    }

    #[test]
    fn socket_address_accepts_bare_host_port() {
        assert_eq!(
            parse_socket_address("127.0.0.1:9100").unwrap(),
            "127.0.0.1:9100"
        );
    }
}
