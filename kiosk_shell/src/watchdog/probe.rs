//! Detects a frozen shell.
//!
//! [`HeartbeatProbe`] ticks a counter from a task on the shell's own event loop. [`ProbeMonitor`] watches that counter
//! from a dedicated OS thread, so it keeps running when the event loop does not. If the counter stops moving for
//! longer than the probe timeout, the monitor reports the probe as unresponsive, exactly once.
use std::{
    io,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use log::*;
use tokio::task::JoinHandle;

use super::MIN_TIMER_PERIOD;

#[derive(Clone, Default)]
pub struct HeartbeatProbe {
    beats: Arc<AtomicU64>,
}

impl HeartbeatProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn beats(&self) -> u64 {
        self.beats.load(Ordering::SeqCst)
    }

    pub fn tick(&self) {
        self.beats.fetch_add(1, Ordering::SeqCst);
    }

    /// Ticks every `interval` on the current runtime.
    pub fn start(&self, interval: Duration) -> JoinHandle<()> {
        let probe = self.clone();
        let interval = interval.max(MIN_TIMER_PERIOD);
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            loop {
                timer.tick().await;
                probe.tick();
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Alive,
    /// The probe has not ticked since the last observation, but it has not been silent for long enough to act on,
    /// or it has already been reported.
    Stalled,
    /// The probe has been silent for longer than the timeout. Only reported once.
    Unresponsive,
}

pub struct ProbeMonitor {
    probe: HeartbeatProbe,
    timeout: Duration,
    last_seen: u64,
    last_change: Instant,
    reported: bool,
}

impl ProbeMonitor {
    pub fn new(probe: HeartbeatProbe, timeout: Duration, now: Instant) -> Self {
        let last_seen = probe.beats();
        Self { probe, timeout, last_seen, last_change: now, reported: false }
    }

    pub fn observe(&mut self, now: Instant) -> ProbeState {
        let beats = self.probe.beats();
        if beats != self.last_seen {
            self.last_seen = beats;
            self.last_change = now;
            return ProbeState::Alive;
        }
        let silent_for = now.saturating_duration_since(self.last_change);
        if silent_for > self.timeout && !self.reported {
            self.reported = true;
            ProbeState::Unresponsive
        } else {
            ProbeState::Stalled
        }
    }
}

pub struct MonitorHandle {
    stop: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl MonitorHandle {
    /// Stops the monitor thread and waits for it to finish.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

/// Watches the probe from a new OS thread, checking every `check_interval`. `on_unresponsive` runs on that thread.
pub fn spawn_monitor<F>(
    probe: HeartbeatProbe,
    check_interval: Duration,
    timeout: Duration,
    on_unresponsive: F,
) -> io::Result<MonitorHandle>
where
    F: Fn() + Send + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let stopped = Arc::clone(&stop);
    let thread = thread::Builder::new().name("kiosk-probe-monitor".into()).spawn(move || {
        let mut monitor = ProbeMonitor::new(probe, timeout, Instant::now());
        debug!("🐕️ Probe monitor started. Timeout: {timeout:?}");
        while !stopped.load(Ordering::SeqCst) {
            thread::sleep(check_interval);
            if monitor.observe(Instant::now()) == ProbeState::Unresponsive {
                on_unresponsive();
            }
        }
        debug!("🐕️ Probe monitor stopped");
    })?;
    Ok(MonitorHandle { stop, thread: Some(thread) })
}

#[cfg(test)]
mod test {
    use std::sync::mpsc;

    use super::*;

    #[test]
    fn silent_probes_are_reported_once() {
        let probe = HeartbeatProbe::new();
        let t0 = Instant::now();
        let mut monitor = ProbeMonitor::new(probe.clone(), Duration::from_secs(10), t0);
        probe.tick();
        assert_eq!(monitor.observe(t0 + Duration::from_secs(1)), ProbeState::Alive);
        assert_eq!(monitor.observe(t0 + Duration::from_secs(5)), ProbeState::Stalled);
        assert_eq!(monitor.observe(t0 + Duration::from_secs(11)), ProbeState::Stalled);
        assert_eq!(monitor.observe(t0 + Duration::from_secs(12)), ProbeState::Unresponsive);
        assert_eq!(monitor.observe(t0 + Duration::from_secs(30)), ProbeState::Stalled);
        probe.tick();
        assert_eq!(monitor.observe(t0 + Duration::from_secs(31)), ProbeState::Alive);
        assert_eq!(monitor.observe(t0 + Duration::from_secs(60)), ProbeState::Stalled);
    }

    #[test]
    fn ticking_probes_stay_alive() {
        let probe = HeartbeatProbe::new();
        let t0 = Instant::now();
        let mut monitor = ProbeMonitor::new(probe.clone(), Duration::from_secs(10), t0);
        for s in 1..=60 {
            probe.tick();
            assert_eq!(monitor.observe(t0 + Duration::from_secs(s)), ProbeState::Alive);
        }
    }

    #[test]
    fn monitor_thread_fires_when_the_probe_stops() {
        let (tx, rx) = mpsc::channel();
        let probe = HeartbeatProbe::new();
        let handle =
            spawn_monitor(probe, Duration::from_millis(10), Duration::from_millis(50), move || tx.send(()).unwrap())
                .unwrap();
        assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        handle.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn probe_ticks_on_the_runtime() {
        let probe = HeartbeatProbe::new();
        let task = probe.start(Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(probe.beats(), 4);
        task.abort();
    }
}
