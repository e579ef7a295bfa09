use std::env;
use std::str::FromStr;

use anyhow::{Context, Result};
use dotenvy::dotenv;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,
    pub database_max_connections: u32,

    // Rate limiting
    pub rate_checkin_per_min: u32,
    pub rate_protected_per_min: u32,

    pub api_prefix: String,

    // QR session and attendance policy
    pub qr_rotating_default_minutes: u32,
    pub qr_static_default_hours: u32,
    pub qr_sweep_interval_secs: u64,
    pub attendance_grace_minutes: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        Ok(Self {
            server_addr: env::var("SERVER_ADDR").context("SERVER_ADDR must be set")?,
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            jwt_secret: env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            database_max_connections: var_or("DATABASE_MAX_CONNECTIONS", 10)?,

            rate_checkin_per_min: var_or("RATE_CHECKIN_PER_MIN", 120)?,
            rate_protected_per_min: var_or("RATE_PROTECTED_PER_MIN", 1000)?,

            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),

            qr_rotating_default_minutes: var_or("QR_ROTATING_DEFAULT_MINUTES", 1)?,
            qr_static_default_hours: var_or("QR_STATIC_DEFAULT_HOURS", 24)?,
            qr_sweep_interval_secs: var_or("QR_SWEEP_INTERVAL_SECS", 60)?,
            attendance_grace_minutes: var_or("ATTENDANCE_GRACE_MINUTES", 5)?,
        })
    }
}

/// Reads an optional variable, falling back to `default` when unset.
fn var_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value '{}'", key, raw)),
        Err(_) => Ok(default),
    }
}
