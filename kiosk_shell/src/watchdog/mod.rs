//! Keeps the kiosk display alive without anyone having to walk over and restart it.
//!
//! The watchdog has two ways of recovering:
//!
//! * A *recovery* reloads the display surface after a short grace period. Crashes, failed loads, unresponsive
//!   renderers and missed heartbeats all lead here. Overlapping triggers collapse into a single recovery, and the
//!   guard is only released once the reload has finished (or timed out).
//! * A *relaunch* replaces the whole shell process. It happens when a reload fails, or when the liveness probe shows
//!   that the shell's own event loop has frozen, in which case a reload would never run. A relaunch happens at most
//!   once per process.
mod probe;
mod surface;

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use kiosk_common::helpers::{env_duration_ms, env_duration_secs, env_interval_ms, env_interval_secs};
use log::*;
pub use probe::{spawn_monitor, HeartbeatProbe, MonitorHandle, ProbeMonitor, ProbeState};
pub use surface::{DisplaySurface, ProcessControl, SurfaceError, SurfaceEvent};
use tokio::{
    task::JoinHandle,
    time::{interval_at, sleep, timeout, Instant, MissedTickBehavior},
};

pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(3);
pub const DEFAULT_RELOAD_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);
// tokio intervals need a non-zero period
pub(crate) const MIN_TIMER_PERIOD: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogConfig {
    /// How long to wait before reloading, so that a burst of failure reports only causes one reload.
    pub grace_period: Duration,
    /// How long a reload may take before the watchdog gives up on it and relaunches the shell.
    pub reload_timeout: Duration,
    pub heartbeat_interval: Duration,
    /// A recovery is triggered if the display has not answered a ping for this long.
    pub heartbeat_timeout: Duration,
    pub probe_interval: Duration,
    /// The shell is relaunched if the liveness probe has not ticked for this long.
    pub probe_timeout: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
            reload_timeout: DEFAULT_RELOAD_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            probe_interval: DEFAULT_PROBE_INTERVAL,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl WatchdogConfig {
    pub fn from_env_or_default() -> Self {
        Self {
            grace_period: env_duration_ms("KIOSK_WATCHDOG_GRACE_MS", DEFAULT_GRACE_PERIOD),
            reload_timeout: env_duration_secs("KIOSK_WATCHDOG_RELOAD_TIMEOUT_SECS", DEFAULT_RELOAD_TIMEOUT),
            heartbeat_interval: env_interval_secs("KIOSK_HEARTBEAT_INTERVAL_SECS", DEFAULT_HEARTBEAT_INTERVAL),
            heartbeat_timeout: env_duration_secs("KIOSK_HEARTBEAT_TIMEOUT_SECS", DEFAULT_HEARTBEAT_TIMEOUT),
            probe_interval: env_interval_ms("KIOSK_PROBE_INTERVAL_MS", DEFAULT_PROBE_INTERVAL),
            probe_timeout: env_duration_secs("KIOSK_PROBE_TIMEOUT_SECS", DEFAULT_PROBE_TIMEOUT),
        }
    }
}

//--------------------------------------        Watchdog       ---------------------------------------------------------
pub struct Watchdog<S: DisplaySurface, P: ProcessControl> {
    inner: Arc<WatchdogState<S, P>>,
}

impl<S: DisplaySurface, P: ProcessControl> Clone for Watchdog<S, P> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

struct WatchdogState<S, P> {
    surface: S,
    process: P,
    config: WatchdogConfig,
    recovering: AtomicBool,
    relaunching: AtomicBool,
    started: Instant,
    // milliseconds after `started`
    last_heartbeat: AtomicU64,
    recoveries: AtomicU64,
    // set when a failed relaunch left the display closed
    display_lost: AtomicBool,
}

impl<S: DisplaySurface, P: ProcessControl> Watchdog<S, P> {
    pub fn new(surface: S, process: P, config: WatchdogConfig) -> Self {
        let inner = WatchdogState {
            surface,
            process,
            config,
            recovering: AtomicBool::new(false),
            relaunching: AtomicBool::new(false),
            started: Instant::now(),
            last_heartbeat: AtomicU64::new(0),
            recoveries: AtomicU64::new(0),
            display_lost: AtomicBool::new(false),
        };
        Self { inner: Arc::new(inner) }
    }

    pub fn config(&self) -> &WatchdogConfig {
        &self.inner.config
    }

    pub fn surface(&self) -> &S {
        &self.inner.surface
    }

    pub fn is_recovering(&self) -> bool {
        self.inner.recovering.load(Ordering::SeqCst)
    }

    pub fn is_relaunching(&self) -> bool {
        self.inner.relaunching.load(Ordering::SeqCst)
    }

    /// The number of recoveries started so far.
    pub fn recoveries(&self) -> u64 {
        self.inner.recoveries.load(Ordering::SeqCst)
    }

    pub fn handle_surface_event(&self, event: SurfaceEvent) -> Option<JoinHandle<()>> {
        warn!("🐕️ The display reported {event}");
        self.trigger_recovery()
    }

    /// Starts a recovery unless one is already under way. Returns the handle of the recovery task if one was started.
    pub fn trigger_recovery(&self) -> Option<JoinHandle<()>> {
        if self.is_relaunching() {
            debug!("🐕️ The shell is being relaunched. Not starting a recovery.");
            return None;
        }
        if self.inner.recovering.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            debug!("🐕️ A recovery is already in progress");
            return None;
        }
        let n = self.inner.recoveries.fetch_add(1, Ordering::SeqCst) + 1;
        info!("🐕️ Starting recovery #{n}. Reloading the display in {:?}", self.inner.config.grace_period);
        let inner = Arc::clone(&self.inner);
        Some(tokio::spawn(async move {
            inner.recover().await;
            inner.recovering.store(false, Ordering::SeqCst);
        }))
    }

    /// Called when the display answers a ping.
    pub fn record_heartbeat(&self) {
        trace!("🐕️ Heartbeat received");
        self.inner.touch_heartbeat();
    }

    pub fn heartbeat_age(&self) -> Duration {
        self.inner.heartbeat_age()
    }

    /// Triggers a recovery if the display has missed its heartbeats or was left closed by a failed relaunch. The
    /// heartbeat clock restarts either way, so a display that stays silent triggers at most one recovery per timeout
    /// period.
    pub fn check_heartbeat(&self) -> Option<JoinHandle<()>> {
        let age = self.heartbeat_age();
        if self.inner.display_lost.load(Ordering::SeqCst) {
            warn!("🐕️ The display was closed for a relaunch that never happened. Bringing it back.");
        } else if age <= self.inner.config.heartbeat_timeout {
            return None;
        } else {
            warn!("🐕️ No heartbeat from the display for {age:?}");
        }
        self.inner.touch_heartbeat();
        self.trigger_recovery()
    }

    /// Pings the display every heartbeat interval and checks that it is still answering. Runs until the shell is
    /// relaunched.
    pub fn run_heartbeat(&self) -> JoinHandle<()> {
        let watchdog = self.clone();
        let interval = self.inner.config.heartbeat_interval.max(MIN_TIMER_PERIOD);
        tokio::spawn(async move {
            let mut timer = interval_at(Instant::now() + interval, interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!("🐕️ Heartbeat monitor started");
            loop {
                timer.tick().await;
                if watchdog.is_relaunching() {
                    break;
                }
                if let Err(e) = watchdog.inner.surface.ping().await {
                    warn!("🐕️ Could not ping the display. {e}");
                }
                let _ = watchdog.check_heartbeat();
            }
        })
    }

    /// Called from the probe monitor thread when the shell's event loop stops ticking.
    pub fn on_probe_unresponsive(&self) -> bool {
        error!("🐕️ The liveness probe stopped ticking. The shell's event loop is frozen.");
        self.inner.relaunch("the liveness probe is unresponsive")
    }

    /// Replaces the shell process. Only the first call does anything. Returns false if a relaunch was already under
    /// way, or if starting the new process failed; in that case the display is brought back by the next heartbeat
    /// check or recovery instead.
    pub fn relaunch(&self, reason: &str) -> bool {
        self.inner.relaunch(reason)
    }
}

impl<S: DisplaySurface, P: ProcessControl> WatchdogState<S, P> {
    async fn recover(&self) {
        sleep(self.config.grace_period).await;
        if self.relaunching.load(Ordering::SeqCst) {
            return;
        }
        match timeout(self.config.reload_timeout, self.surface.reload()).await {
            Ok(Ok(())) => {
                info!("🐕️ The display was reloaded");
                self.display_lost.store(false, Ordering::SeqCst);
                self.touch_heartbeat();
            },
            Ok(Err(e)) => {
                error!("🐕️ Reloading the display failed. {e}");
                self.relaunch("the display could not be reloaded");
            },
            Err(_) => {
                error!("🐕️ Reloading the display did not finish within {:?}", self.config.reload_timeout);
                self.relaunch("the display reload timed out");
            },
        }
    }

    fn relaunch(&self, reason: &str) -> bool {
        if self.relaunching.swap(true, Ordering::SeqCst) {
            debug!("🐕️ A relaunch is already in progress");
            return false;
        }
        warn!("🐕️ Relaunching the shell because {reason}");
        if let Err(e) = self.surface.terminate() {
            warn!("🐕️ Could not close the display cleanly. {e}");
        }
        match self.process.relaunch() {
            Ok(()) => true,
            Err(e) => {
                error!("🐕️ Could not relaunch the shell. {e}. Falling back to restarting the display.");
                self.display_lost.store(true, Ordering::SeqCst);
                self.relaunching.store(false, Ordering::SeqCst);
                false
            },
        }
    }

    fn touch_heartbeat(&self) {
        let now = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.last_heartbeat.store(now, Ordering::SeqCst);
    }

    fn heartbeat_age(&self) -> Duration {
        let last = Duration::from_millis(self.last_heartbeat.load(Ordering::SeqCst));
        self.started.elapsed().saturating_sub(last)
    }
}
