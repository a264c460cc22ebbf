//! The primary display surface: a kiosk-mode browser (or any renderer command) running as a child process.
//!
//! The renderer is given the app URL as its last argument and learns how to reach the IPC bridge from the
//! `KIOSK_IPC_URL` and `KIOSK_IPC_TOKEN` environment variables. If it exits on its own, the surface reports
//! [`SurfaceEvent::RenderProcessGone`] so the watchdog can bring it back.
use std::{
    process::Stdio,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
        Mutex,
        MutexGuard,
    },
    time::Duration,
};

use kiosk_common::Secret;
use log::*;
use tokio::{process::Child, sync::mpsc};

use crate::{
    config::RendererConfig,
    watchdog::{DisplaySurface, SurfaceError, SurfaceEvent},
};

const EXIT_CHECK_INTERVAL: Duration = Duration::from_secs(1);

pub struct ChildProcessSurface {
    renderer: RendererConfig,
    app_url: String,
    ipc_url: String,
    ipc_token: Secret<String>,
    events: mpsc::UnboundedSender<SurfaceEvent>,
    child: Arc<Mutex<Option<Child>>>,
    // bumped on every launch, so exit watchers of replaced renderers stay quiet
    generation: Arc<AtomicU64>,
    pings: Arc<AtomicU64>,
}

impl ChildProcessSurface {
    pub fn new(
        renderer: RendererConfig,
        app_url: &str,
        ipc_url: &str,
        ipc_token: Secret<String>,
        events: mpsc::UnboundedSender<SurfaceEvent>,
    ) -> Self {
        Self {
            renderer,
            app_url: app_url.to_string(),
            ipc_url: ipc_url.to_string(),
            ipc_token,
            events,
            child: Arc::new(Mutex::new(None)),
            generation: Arc::new(AtomicU64::new(0)),
            pings: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The number of pings sent so far. The renderer polls this over IPC and answers each new value with a pong.
    pub fn pings(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.pings)
    }

    pub fn is_running(&self) -> bool {
        self.lock_child().is_some()
    }

    /// Starts the renderer, replacing any renderer that is already running.
    pub fn launch(&self) -> Result<(), SurfaceError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mut slot = self.lock_child();
        if let Some(mut old) = slot.take() {
            let _ = old.start_kill();
        }
        let child = tokio::process::Command::new(&self.renderer.program)
            .args(&self.renderer.args)
            .arg(&self.app_url)
            .env("KIOSK_IPC_URL", &self.ipc_url)
            .env("KIOSK_IPC_TOKEN", self.ipc_token.reveal())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SurfaceError::Launch(format!("{}: {e}", self.renderer.program)))?;
        info!("🐕️ Renderer started (pid {:?}) showing {}", child.id(), self.app_url);
        *slot = Some(child);
        drop(slot);
        self.watch_exit(generation);
        Ok(())
    }

    fn watch_exit(&self, generation: u64) {
        let child = Arc::clone(&self.child);
        let current = Arc::clone(&self.generation);
        let events = self.events.clone();
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(EXIT_CHECK_INTERVAL);
            loop {
                timer.tick().await;
                if current.load(Ordering::SeqCst) != generation {
                    break;
                }
                let mut slot = child.lock().unwrap_or_else(|e| e.into_inner());
                let exited = match slot.as_mut().map(|c| c.try_wait()) {
                    Some(Ok(Some(status))) => {
                        warn!("🐕️ The renderer exited ({status})");
                        true
                    },
                    Some(Ok(None)) => false,
                    Some(Err(e)) => {
                        warn!("🐕️ Could not check on the renderer. {e}");
                        true
                    },
                    None => break,
                };
                if exited {
                    slot.take();
                    drop(slot);
                    let _ = events.send(SurfaceEvent::RenderProcessGone);
                    break;
                }
            }
        });
    }

    fn lock_child(&self) -> MutexGuard<'_, Option<Child>> {
        self.child.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl DisplaySurface for ChildProcessSurface {
    async fn reload(&self) -> Result<(), SurfaceError> {
        info!("🐕️ Restarting the renderer");
        self.launch()
    }

    async fn ping(&self) -> Result<(), SurfaceError> {
        if !self.is_running() {
            return Err(SurfaceError::NotRunning);
        }
        let n = self.pings.fetch_add(1, Ordering::SeqCst) + 1;
        trace!("🐕️ Ping #{n} sent to the renderer");
        Ok(())
    }

    fn terminate(&self) -> Result<(), SurfaceError> {
        self.generation.fetch_add(1, Ordering::SeqCst);
        match self.lock_child().take() {
            Some(mut child) => {
                info!("🐕️ Stopping the renderer");
                child.start_kill()?;
                Ok(())
            },
            None => Err(SurfaceError::NotRunning),
        }
    }
}
