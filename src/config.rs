//! Runtime configuration loaded from environment variables.
//!
//! Every setting has a default except the alert topic and the vision API key.
//! A missing topic does not stop the process; it fails SOS invocations with a
//! 500 while the other handlers keep working.

use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};

/// Default port if not specified via environment variable.
pub const DEFAULT_PORT: u16 = 3000;

/// Default database path if not specified via environment variable.
pub const DEFAULT_DB_URL: &str = "sqlite:portfolio-edge.db?mode=rwc";

pub const DEFAULT_PROBE_TABLE: &str = "NetProbeLogs";
pub const DEFAULT_REGION: &str = "ap-southeast-1";
pub const DEFAULT_BROADCAST_URL: &str = "https://ntfy.sh";
pub const DEFAULT_GEO_API_URL: &str = "http://ip-api.com";
pub const DEFAULT_GEO_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_FACE_COMPARE_URL: &str = "http://localhost:8700";
pub const DEFAULT_VISION_API_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_VISION_MODEL: &str = "claude-3-haiku-20240307";

/// Local time for telemetry timestamps (Indochina Time).
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 7;

#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub database_url: String,
    /// Telemetry table. Only ASCII alphanumerics and `_` are accepted.
    pub probe_table: String,
    pub region: String,
    /// Broadcast topic for SOS alerts. `None` when unset or blank.
    pub alert_topic: Option<String>,
    pub broadcast_url: String,
    pub geo_api_url: String,
    pub geo_timeout: Duration,
    pub face_compare_url: String,
    pub vision_api_url: String,
    pub vision_api_key: Option<String>,
    pub vision_model: String,
    pub telemetry_offset: FixedOffset,
}

impl Settings {
    /// Load settings from the process environment, reading `.env` first if
    /// one exists.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let text = |key: &str, default: &str| {
            non_blank(lookup(key)).unwrap_or_else(|| default.to_string())
        };
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<i64>().ok());

        let probe_table = non_blank(lookup("PROBE_TABLE"))
            .filter(|name| is_identifier(name))
            .unwrap_or_else(|| {
                if lookup("PROBE_TABLE").is_some() {
                    tracing::warn!("PROBE_TABLE is not a plain identifier, using default");
                }
                DEFAULT_PROBE_TABLE.to_string()
            });

        let offset_hours = parsed("TELEMETRY_UTC_OFFSET_HOURS")
            .and_then(|h| i32::try_from(h).ok())
            .unwrap_or(DEFAULT_UTC_OFFSET_HOURS);
        let telemetry_offset = offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .or_else(|| FixedOffset::east_opt(DEFAULT_UTC_OFFSET_HOURS * 3600))
            .unwrap_or_else(|| Utc.fix());

        Self {
            port: parsed("PORTFOLIO_PORT")
                .and_then(|p| u16::try_from(p).ok())
                .unwrap_or(DEFAULT_PORT),
            database_url: text("PORTFOLIO_DATABASE_URL", DEFAULT_DB_URL),
            probe_table,
            region: text("SERVICE_REGION", DEFAULT_REGION),
            alert_topic: non_blank(lookup("ALERT_TOPIC")),
            broadcast_url: text("ALERT_BROADCAST_URL", DEFAULT_BROADCAST_URL),
            geo_api_url: text("GEO_API_URL", DEFAULT_GEO_API_URL),
            geo_timeout: Duration::from_millis(
                parsed("GEO_TIMEOUT_MS")
                    .and_then(|ms| u64::try_from(ms).ok())
                    .unwrap_or(DEFAULT_GEO_TIMEOUT_MS),
            ),
            face_compare_url: text("FACE_COMPARE_URL", DEFAULT_FACE_COMPARE_URL),
            vision_api_url: text("VISION_API_URL", DEFAULT_VISION_API_URL),
            vision_api_key: non_blank(lookup("VISION_API_KEY")),
            vision_model: text("VISION_MODEL", DEFAULT_VISION_MODEL),
            telemetry_offset,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// True for names safe to splice into SQL as a table identifier.
pub fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit())
}
