use std::path::PathBuf;

use clap::Parser;
use url::Url;

use crate::config::{RendererConfig, ShellConfig};

/// Command line overrides. Anything not given here comes from the environment (see `ShellConfig`).
#[derive(Parser, Debug, Default)]
#[command(version, about = "Runs the bakery kiosk display and keeps it alive")]
pub struct Arguments {
    /// The kiosk web app to display
    #[arg(short = 'u', long = "app-url")]
    pub app_url: Option<Url>,
    /// The renderer command, e.g. "chromium --kiosk"
    #[arg(short = 'r', long = "renderer")]
    pub renderer: Option<String>,
    /// The loopback port for the IPC bridge
    #[arg(short = 'p', long = "ipc-port")]
    pub ipc_port: Option<u16>,
    #[arg(short = 's', long = "settings")]
    pub settings_path: Option<PathBuf>,
    /// The receipt printer device, e.g. /dev/usb/lp0
    #[arg(long = "printer")]
    pub printer_device: Option<PathBuf>,
    /// Do not ping the display or watch the liveness probe
    #[arg(long = "no-watchdog")]
    pub no_watchdog: bool,
}

impl Arguments {
    pub fn apply(self, mut config: ShellConfig) -> ShellConfig {
        if let Some(url) = self.app_url {
            config.app_url = url.to_string();
        }
        if let Some(renderer) = self.renderer.as_deref().and_then(RendererConfig::from_command) {
            config.renderer = renderer;
        }
        if let Some(port) = self.ipc_port {
            config.ipc_port = port;
        }
        if let Some(path) = self.settings_path {
            config.settings_path = path;
        }
        if self.printer_device.is_some() {
            config.printer_device = self.printer_device;
        }
        if self.no_watchdog {
            config.watchdog_enabled = false;
        }
        config
    }
}
