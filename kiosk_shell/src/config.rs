use std::{
    env,
    net::{IpAddr, Ipv4Addr},
    path::PathBuf,
};

use kiosk_common::helpers::{env_flag, env_or_default};
use log::*;

use crate::watchdog::WatchdogConfig;

const DEFAULT_APP_URL: &str = "http://127.0.0.1:3000";
const DEFAULT_RENDERER: &str = "chromium";
const DEFAULT_RENDERER_ARGS: &str = "--kiosk --noerrdialogs --disable-infobars --no-first-run";
const DEFAULT_IPC_PORT: u16 = 8370;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RendererConfig {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self { program: DEFAULT_RENDERER.into(), args: split_args(DEFAULT_RENDERER_ARGS) }
    }
}

impl RendererConfig {
    /// Parses a command line such as `chromium --kiosk`. Arguments are split on whitespace.
    pub fn from_command(command: &str) -> Option<Self> {
        let mut parts = split_args(command).into_iter();
        let program = parts.next()?;
        Some(Self { program, args: parts.collect() })
    }
}

fn split_args(s: &str) -> Vec<String> {
    s.split_whitespace().map(String::from).collect()
}

#[derive(Clone, Debug)]
pub struct ShellConfig {
    /// The kiosk web app the renderer shows.
    pub app_url: String,
    pub renderer: RendererConfig,
    /// The IPC bridge always listens on the loopback interface.
    pub ipc_host: IpAddr,
    pub ipc_port: u16,
    /// Where the receipt printer is attached, e.g. `/dev/usb/lp0`. Printing is unavailable when this is not set.
    pub printer_device: Option<PathBuf>,
    pub settings_path: PathBuf,
    pub watchdog: WatchdogConfig,
    /// If false, the watchdog neither pings the renderer nor watches the liveness probe. Crashes are still recovered.
    pub watchdog_enabled: bool,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            app_url: DEFAULT_APP_URL.into(),
            renderer: RendererConfig::default(),
            ipc_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            ipc_port: DEFAULT_IPC_PORT,
            printer_device: None,
            settings_path: default_settings_path(),
            watchdog: WatchdogConfig::default(),
            watchdog_enabled: true,
        }
    }
}

impl ShellConfig {
    pub fn from_env_or_default() -> Self {
        let app_url = env::var("KIOSK_APP_URL").ok().unwrap_or_else(|| {
            info!("🪛️ KIOSK_APP_URL is not set. Using the default value of {DEFAULT_APP_URL}.");
            DEFAULT_APP_URL.into()
        });
        let renderer = env::var("KIOSK_RENDERER_CMD")
            .ok()
            .and_then(|s| {
                RendererConfig::from_command(&s).or_else(|| {
                    warn!("🪛️ KIOSK_RENDERER_CMD is empty. Using the default renderer.");
                    None
                })
            })
            .unwrap_or_default();
        let ipc_port = env_or_default("KIOSK_IPC_PORT", DEFAULT_IPC_PORT);
        let printer_device = env::var("KIOSK_PRINTER_DEVICE").ok().filter(|s| !s.trim().is_empty()).map(PathBuf::from);
        if printer_device.is_none() {
            info!("🪛️ KIOSK_PRINTER_DEVICE is not set. Receipt printing is disabled.");
        }
        let settings_path = env::var("KIOSK_SETTINGS_PATH").ok().map(PathBuf::from).unwrap_or_else(default_settings_path);
        Self {
            app_url,
            renderer,
            ipc_port,
            printer_device,
            settings_path,
            watchdog: WatchdogConfig::from_env_or_default(),
            watchdog_enabled: env_flag("KIOSK_WATCHDOG", true),
            ..Default::default()
        }
    }

    pub fn ipc_url(&self) -> String {
        format!("http://{}:{}/ipc", self.ipc_host, self.ipc_port)
    }
}

fn default_settings_path() -> PathBuf {
    dirs::config_dir().or_else(dirs::home_dir).unwrap_or_else(env::temp_dir).join("kiosk").join("settings.json")
}
