use std::{fmt::Display, future::Future, io, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures reported by the display surface. Each of them triggers the same recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SurfaceEvent {
    /// The renderer process crashed or was killed.
    RenderProcessGone,
    /// The kiosk app failed to load.
    DidFailLoad,
    /// The renderer stopped responding to input.
    Unresponsive,
}

impl Display for SurfaceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SurfaceEvent::RenderProcessGone => write!(f, "render-process-gone"),
            SurfaceEvent::DidFailLoad => write!(f, "did-fail-load"),
            SurfaceEvent::Unresponsive => write!(f, "unresponsive"),
        }
    }
}

impl FromStr for SurfaceEvent {
    type Err = SurfaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "render-process-gone" => Ok(Self::RenderProcessGone),
            "did-fail-load" => Ok(Self::DidFailLoad),
            "unresponsive" => Ok(Self::Unresponsive),
            _ => Err(SurfaceError::UnknownEvent(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("Could not start the renderer. {0}")]
    Launch(String),
    #[error("The renderer is not running")]
    NotRunning,
    #[error("Could not relaunch the shell. {0}")]
    Relaunch(String),
    #[error("Unknown surface event: {0}")]
    UnknownEvent(String),
    #[error("I/O error. {0}")]
    Io(#[from] io::Error),
}

/// The primary kiosk display.
pub trait DisplaySurface: Send + Sync + 'static {
    /// Reloads the kiosk app. Resolves once the surface is showing the app again.
    fn reload(&self) -> impl Future<Output = Result<(), SurfaceError>> + Send;

    /// Asks the surface to prove it is alive. The answer arrives separately, as a pong.
    fn ping(&self) -> impl Future<Output = Result<(), SurfaceError>> + Send;

    /// Tears the surface down. This must not depend on the async runtime, since it is called when the runtime is
    /// frozen.
    fn terminate(&self) -> Result<(), SurfaceError>;
}

/// Control over the shell process itself.
pub trait ProcessControl: Send + Sync + 'static {
    /// Starts a fresh shell process and exits this one. Only returns if something went wrong.
    fn relaunch(&self) -> Result<(), SurfaceError>;
}
