use std::{net::TcpListener, sync::Arc};

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use kiosk_shell::{
    cli::Arguments,
    config::ShellConfig,
    ipc::{new_session_token, start_ipc_server, IpcState},
    printer::ReceiptPrinter,
    relaunch::SelfRelauncher,
    renderer::ChildProcessSurface,
    settings::SettingsStore,
    watchdog::{spawn_monitor, DisplaySurface, HeartbeatProbe, Watchdog},
};
use log::*;
use tokio::sync::mpsc;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();
    let args = Arguments::parse();
    let config = args.apply(ShellConfig::from_env_or_default());
    info!("🚀️ Starting kiosk shell for {}", config.app_url);

    let settings = SettingsStore::load(&config.settings_path).await.context("Loading kiosk settings")?;
    let token = new_session_token();
    let listener = TcpListener::bind((config.ipc_host, config.ipc_port))
        .with_context(|| format!("Binding the IPC bridge to port {}", config.ipc_port))?;

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let surface =
        ChildProcessSurface::new(config.renderer.clone(), &config.app_url, &config.ipc_url(), token.clone(), events_tx);
    let pings = surface.pings();
    surface.launch().context("Starting the renderer")?;
    let relauncher = SelfRelauncher::from_current_process()?;
    let watchdog = Watchdog::new(surface, relauncher, config.watchdog);

    // The monitor thread stops when this handle is dropped
    let _monitor = if config.watchdog_enabled {
        let _heartbeat = watchdog.run_heartbeat();
        let probe = HeartbeatProbe::new();
        let _ticker = probe.start(config.watchdog.probe_interval);
        let dog = watchdog.clone();
        let monitor = spawn_monitor(probe, config.watchdog.probe_interval, config.watchdog.probe_timeout, move || {
            dog.on_probe_unresponsive();
        })?;
        Some(monitor)
    } else {
        warn!("🐕️ The watchdog is disabled. Crashed renderers are still restarted.");
        None
    };

    let dog = watchdog.clone();
    tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            let _ = dog.handle_surface_event(event);
        }
    });

    let state = IpcState {
        token,
        supervisor: Arc::new(watchdog.clone()),
        pings,
        settings: Arc::new(settings),
        printer: ReceiptPrinter::new(config.printer_device.clone()),
    };
    let server = start_ipc_server(listener, state)?;
    let handle = server.handle();
    tokio::select! {
        result = server => result.context("The IPC bridge stopped")?,
        _ = tokio::signal::ctrl_c() => {
            info!("🚀️ Shutting down");
            handle.stop(true).await;
        },
    }
    if let Err(e) = watchdog.surface().terminate() {
        debug!("🐕️ {e}");
    }
    info!("🚀️ Bye!");
    Ok(())
}
