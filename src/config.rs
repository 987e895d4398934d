use std::env;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::error::AppError;

/// What the matcher does once every eligible courier has declined or timed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhaustedPoolPolicy {
    Cancel,
    Hold,
}

impl FromStr for ExhaustedPoolPolicy {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "cancel" => Ok(Self::Cancel),
            "hold" => Ok(Self::Hold),
            other => Err(format!("expected cancel|hold, got {other}")),
        }
    }
}

/// What follows an `assigned -> canceled` transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignedCancelPolicy {
    Rematch,
    Finalize,
}

impl FromStr for AssignedCancelPolicy {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "rematch" => Ok(Self::Rematch),
            "finalize" => Ok(Self::Finalize),
            other => Err(format!("expected rematch|finalize, got {other}")),
        }
    }
}

/// Tie-break between overlapping zones containing the same coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneOverlapPolicy {
    Priority,
    NearestCentroid,
}

impl FromStr for ZoneOverlapPolicy {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "priority" => Ok(Self::Priority),
            "nearest_centroid" => Ok(Self::NearestCentroid),
            other => Err(format!("expected priority|nearest_centroid, got {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub courier_response_time: Duration,
    pub order_timeout: Duration,
    pub location_freshness: Duration,
    pub retry_interval: Duration,
    pub exhausted_pool: ExhaustedPoolPolicy,
    pub assigned_cancel: AssignedCancelPolicy,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            courier_response_time: Duration::from_secs(60),
            order_timeout: Duration::from_secs(3_600),
            location_freshness: Duration::from_secs(120),
            retry_interval: Duration::from_secs(30),
            exhausted_pool: ExhaustedPoolPolicy::Cancel,
            assigned_cancel: AssignedCancelPolicy::Rematch,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PricingSettings {
    pub service_fee_rate: Decimal,
    pub average_speed_kmh: f64,
    pub currency: String,
    pub max_declared_value: Decimal,
    pub wait_grace_minutes: u32,
}

impl Default for PricingSettings {
    fn default() -> Self {
        Self {
            service_fee_rate: Decimal::new(15, 2),
            average_speed_kmh: crate::geo::DEFAULT_AVERAGE_SPEED_KMH,
            currency: "USD".to_string(),
            max_declared_value: Decimal::new(500, 0),
            wait_grace_minutes: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub order_queue_size: usize,
    pub event_buffer_size: usize,
    pub zone_overlap: ZoneOverlapPolicy,
    pub dispatch: DispatchSettings,
    pub pricing: PricingSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            order_queue_size: 1024,
            event_buffer_size: 1024,
            zone_overlap: ZoneOverlapPolicy::Priority,
            dispatch: DispatchSettings::default(),
            pricing: PricingSettings::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Config::default();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            order_queue_size: parse_or_default("ORDER_QUEUE_SIZE", defaults.order_queue_size)?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", defaults.event_buffer_size)?,
            zone_overlap: parse_or_default("ZONE_OVERLAP_POLICY", defaults.zone_overlap)?,
            dispatch: DispatchSettings {
                courier_response_time: seconds_or_default(
                    "COURIER_RESPONSE_SECS",
                    defaults.dispatch.courier_response_time,
                )?,
                order_timeout: seconds_or_default(
                    "ORDER_TIMEOUT_SECS",
                    defaults.dispatch.order_timeout,
                )?,
                location_freshness: seconds_or_default(
                    "LOCATION_FRESHNESS_SECS",
                    defaults.dispatch.location_freshness,
                )?,
                retry_interval: seconds_or_default(
                    "MATCH_RETRY_SECS",
                    defaults.dispatch.retry_interval,
                )?,
                exhausted_pool: parse_or_default(
                    "EXHAUSTED_POOL_POLICY",
                    defaults.dispatch.exhausted_pool,
                )?,
                assigned_cancel: parse_or_default(
                    "ASSIGNED_CANCEL_POLICY",
                    defaults.dispatch.assigned_cancel,
                )?,
            },
            pricing: PricingSettings {
                service_fee_rate: parse_or_default(
                    "SERVICE_FEE_RATE",
                    defaults.pricing.service_fee_rate,
                )?,
                average_speed_kmh: parse_or_default(
                    "AVERAGE_SPEED_KMH",
                    defaults.pricing.average_speed_kmh,
                )?,
                currency: env::var("CURRENCY").unwrap_or(defaults.pricing.currency),
                max_declared_value: parse_or_default(
                    "MAX_DECLARED_VALUE",
                    defaults.pricing.max_declared_value,
                )?,
                wait_grace_minutes: parse_or_default(
                    "WAIT_GRACE_MINUTES",
                    defaults.pricing.wait_grace_minutes,
                )?,
            },
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}

fn seconds_or_default(key: &str, default: Duration) -> Result<Duration, AppError> {
    parse_or_default(key, default.as_secs()).map(Duration::from_secs)
}
