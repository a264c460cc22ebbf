//! Environment parsing helpers shared by the server, the kiosk client and the kiosk shell.
use std::{env, fmt::Display, str::FromStr, time::Duration};

use log::*;

/// Parse a boolean flag from a string value, or return the given default value otherwise.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    let value = match value {
        Some(v) => v,
        None => return default,
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

/// Reads `name` from the environment and parses it. Missing values silently fall back to `default`; values that do
/// not parse are logged and also fall back to `default`.
pub fn env_or_default<T>(name: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(name) {
        Ok(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            warn!("🪛️ Invalid configuration value for {name} ({s}). {e} Using the default, {default}, instead.");
            default
        }),
        Err(_) => default,
    }
}

pub fn env_flag(name: &str, default: bool) -> bool {
    parse_boolean_flag(env::var(name).ok(), default)
}

/// Reads a duration, expressed in milliseconds, from the environment.
pub fn env_duration_ms(name: &str, default: Duration) -> Duration {
    Duration::from_millis(env_or_default(name, default.as_millis() as u64))
}

/// Reads a duration, expressed in seconds, from the environment.
pub fn env_duration_secs(name: &str, default: Duration) -> Duration {
    Duration::from_secs(env_or_default(name, default.as_secs()))
}

/// Reads a timer period, expressed in milliseconds. Zero is not a usable period, so it is logged and replaced by
/// `default`.
pub fn env_interval_ms(name: &str, default: Duration) -> Duration {
    non_zero(name, env_duration_ms(name, default), default)
}

/// Reads a timer period, expressed in seconds. Zero is logged and replaced by `default`.
pub fn env_interval_secs(name: &str, default: Duration) -> Duration {
    non_zero(name, env_duration_secs(name, default), default)
}

fn non_zero(name: &str, value: Duration, default: Duration) -> Duration {
    if value.is_zero() {
        warn!("🪛️ {name} cannot be zero. Using the default, {default:?}, instead.");
        default
    } else {
        value
    }
}
