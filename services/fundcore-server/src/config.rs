//! Server configuration
//!
//! Everything comes from the environment (a `.env` file is honored); the
//! only required value is the gateway webhook secret.

use std::time::Duration;

/// Runtime settings for the fundcore server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Shared secret for gateway webhook signatures
    pub gateway_secret: String,
    /// TTL of the settlement idempotency lease
    pub lease_ttl: Duration,
    /// Lifetime of a newly created payment intention
    pub intention_ttl: chrono::Duration,
    /// Interval of the intention expiry sweep
    pub sweep_interval: Duration,
}

impl ServerConfig {
    /// Load from the environment
    pub fn from_env() -> anyhow::Result<Self> {
        let host = std::env::var("FUNDCORE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = match std::env::var("FUNDCORE_PORT") {
            Ok(raw) => raw.parse()?,
            Err(_) => 8080,
        };
        let gateway_secret = std::env::var("FUNDCORE_GATEWAY_SECRET")
            .map_err(|_| anyhow::anyhow!("FUNDCORE_GATEWAY_SECRET must be set"))?;

        let lease_ttl_secs = env_u64("FUNDCORE_LEASE_TTL_SECS", 5)?;
        let intention_ttl_minutes = env_u64("FUNDCORE_INTENTION_TTL_MINUTES", 30)?;
        let sweep_interval_secs = env_u64("FUNDCORE_SWEEP_INTERVAL_SECS", 60)?;

        Ok(Self {
            host,
            port,
            gateway_secret,
            lease_ttl: Duration::from_secs(lease_ttl_secs),
            intention_ttl: chrono::Duration::minutes(intention_ttl_minutes as i64),
            sweep_interval: Duration::from_secs(sweep_interval_secs),
        })
    }
}

fn env_u64(key: &str, default: u64) -> anyhow::Result<u64> {
    match std::env::var(key) {
        Ok(raw) => Ok(raw.parse()?),
        Err(_) => Ok(default),
    }
}
