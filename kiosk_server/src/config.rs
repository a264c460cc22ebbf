use std::{env, net::IpAddr, time::Duration as StdDuration};

use chrono::Duration;
use kiosk_common::{
    helpers::{env_flag, env_interval_secs, env_or_default},
    Secret,
};
use log::*;

const DEFAULT_KIOSK_HOST: &str = "127.0.0.1";
const DEFAULT_KIOSK_PORT: u16 = 8360;
const DEFAULT_QR_EXPIRY: Duration = Duration::minutes(15);
const DEFAULT_SSE_KEEPALIVE: StdDuration = StdDuration::from_secs(15);
const DEFAULT_EXPIRY_CHECK_INTERVAL: StdDuration = StdDuration::from_secs(60);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// When set, the payment and event stream endpoints require `Authorization: Bearer <token>`. When unset, they
    /// are open, which is only sensible on a private network.
    pub access_token: Option<Secret<String>>,
    pub webhook: WebhookConfig,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_forwarded: bool,
    /// How long a QR payment may stay unpaid before it is marked as expired.
    pub qr_expiry: Duration,
    /// How often the expiry worker looks for unpaid QR payments.
    pub expiry_check_interval: StdDuration,
    /// How often a comment is written to idle event streams, so that proxies keep them open.
    pub sse_keepalive: StdDuration,
}

#[derive(Clone, Debug, Default)]
pub struct WebhookConfig {
    /// The key the payment gateway signs its callbacks with.
    pub secret: Secret<String>,
    /// If false, webhook signatures are not checked. **DANGER**
    pub hmac_checks: bool,
    /// If supplied, webhook calls are only accepted from these addresses.
    /// To explicitly disable the whitelist, set `KIOSK_WEBHOOK_IP_WHITELIST` to "false", "none", or "0".
    pub whitelist: Option<Vec<IpAddr>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_KIOSK_HOST.to_string(),
            port: DEFAULT_KIOSK_PORT,
            access_token: None,
            webhook: WebhookConfig { hmac_checks: true, ..Default::default() },
            use_x_forwarded_for: false,
            use_forwarded: false,
            qr_expiry: DEFAULT_QR_EXPIRY,
            expiry_check_interval: DEFAULT_EXPIRY_CHECK_INTERVAL,
            sse_keepalive: DEFAULT_SSE_KEEPALIVE,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("KIOSK_HOST").ok().unwrap_or_else(|| DEFAULT_KIOSK_HOST.into());
        let port = env_or_default("KIOSK_PORT", DEFAULT_KIOSK_PORT);
        let access_token = Secret::non_empty(env::var("KIOSK_ACCESS_TOKEN").ok());
        if access_token.is_none() {
            warn!(
                "🪛️ KIOSK_ACCESS_TOKEN is not set. The payment and event stream endpoints are open to anyone who can \
                 reach this server."
            );
        }
        let webhook = WebhookConfig::from_env_or_default();
        let use_x_forwarded_for = env_flag("KIOSK_USE_X_FORWARDED_FOR", false);
        let use_forwarded = env_flag("KIOSK_USE_FORWARDED", false);
        let qr_expiry = configure_qr_expiry();
        let sse_keepalive = env_interval_secs("KIOSK_SSE_KEEPALIVE_SECS", DEFAULT_SSE_KEEPALIVE);
        Self {
            host,
            port,
            access_token,
            webhook,
            use_x_forwarded_for,
            use_forwarded,
            qr_expiry,
            expiry_check_interval: DEFAULT_EXPIRY_CHECK_INTERVAL,
            sse_keepalive,
        }
    }
}

fn configure_qr_expiry() -> Duration {
    env::var("KIOSK_QR_EXPIRY_MINS")
        .map_err(|_| {
            info!(
                "🪛️ KIOSK_QR_EXPIRY_MINS is not set. Using the default value of {} mins.",
                DEFAULT_QR_EXPIRY.num_minutes()
            )
        })
        .and_then(|s| {
            s.parse::<i64>()
                .map(Duration::minutes)
                .map_err(|e| warn!("🪛️ Invalid configuration value for KIOSK_QR_EXPIRY_MINS. {e}"))
        })
        .ok()
        .unwrap_or(DEFAULT_QR_EXPIRY)
}

impl WebhookConfig {
    pub fn from_env_or_default() -> Self {
        let secret = env::var("KIOSK_WEBHOOK_SECRET").ok().unwrap_or_else(|| {
            error!(
                "🪛️ KIOSK_WEBHOOK_SECRET is not set. Please set it to the signing key your payment gateway uses for \
                 webhook calls."
            );
            String::default()
        });
        let hmac_checks = env_flag("KIOSK_WEBHOOK_HMAC_CHECKS", true);
        if !hmac_checks {
            warn!("🚨️ Webhook signature checks are disabled. Anyone can mark orders as paid. 🚨️");
        }
        let whitelist = env::var("KIOSK_WEBHOOK_IP_WHITELIST").ok().and_then(|s| parse_whitelist(&s));
        match &whitelist {
            Some(whitelist) if whitelist.is_empty() => {
                warn!(
                    "🚨️ The webhook IP whitelist was configured, but is empty. The server will run, but won't \
                     authorise any payment gateway callbacks."
                );
            },
            None => {
                info!("🪛️ No webhook IP whitelist is set. Only HMAC validation will be used.");
            },
            Some(v) => {
                let addrs = v.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", ");
                info!("🪛️ Webhook IP whitelist: {addrs}");
            },
        }
        Self { secret: Secret::new(secret), hmac_checks, whitelist }
    }
}

/// Parses a comma-separated list of IP addresses. "none", "false" and "0" disable the whitelist. Invalid entries are
/// logged and skipped.
pub fn parse_whitelist(s: &str) -> Option<Vec<IpAddr>> {
    if ["none", "false", "0"].contains(&s.trim().to_lowercase().as_str()) {
        info!(
            "🪛️ Webhook IP whitelist is disabled. If this is not what you want, set KIOSK_WEBHOOK_IP_WHITELIST to a \
             comma-separated list of IP addresses to enable it."
        );
        return None;
    }
    let ip_addrs = s
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| {
            s.parse::<IpAddr>()
                .map_err(|e| warn!("🪛️ Ignoring invalid IP address ({s}) in KIOSK_WEBHOOK_IP_WHITELIST: {e}"))
                .ok()
        })
        .collect::<Vec<IpAddr>>();
    Some(ip_addrs)
}

//-------------------------------------------------  ServerOptions  ----------------------------------------------------
/// A subset of the server configuration that request handlers need. Secrets are deliberately left out.
#[derive(Clone, Copy, Debug, Default)]
pub struct ServerOptions {
    pub use_x_forwarded_for: bool,
    pub use_forwarded: bool,
}

impl ServerOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self { use_x_forwarded_for: config.use_x_forwarded_for, use_forwarded: config.use_forwarded }
    }
}
