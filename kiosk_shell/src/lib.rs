//! # Kiosk shell
//!
//! The shell is the process that owns the kiosk screen. It starts the renderer (a kiosk-mode browser pointed at the
//! kiosk web app), and then supervises it:
//!
//! * [`watchdog`] reloads the display when it crashes, fails to load or stops answering heartbeats, and relaunches
//!   the whole shell when a reload does not help or the shell itself has frozen.
//! * [`ipc`] is the loopback HTTP bridge the web app uses to answer heartbeats, report failures, read and write
//!   [`settings`] and print receipts on the [`printer`].
//!
//! Configuration comes from `KIOSK_*` environment variables (see [`config::ShellConfig`]), with command line
//! overrides from [`cli::Arguments`].
pub mod cli;
pub mod config;
pub mod errors;
pub mod ipc;
pub mod printer;
pub mod relaunch;
pub mod renderer;
pub mod settings;
pub mod watchdog;
