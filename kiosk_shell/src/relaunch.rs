use std::{env, path::PathBuf, process};

use log::*;

use crate::watchdog::{ProcessControl, SurfaceError};

/// Relaunches the shell by starting a copy of the current executable, with the same arguments, and exiting.
pub struct SelfRelauncher {
    program: PathBuf,
    args: Vec<String>,
}

impl SelfRelauncher {
    pub fn new(program: PathBuf, args: Vec<String>) -> Self {
        Self { program, args }
    }

    pub fn from_current_process() -> Result<Self, SurfaceError> {
        let program = env::current_exe()?;
        let args = env::args().skip(1).collect();
        Ok(Self { program, args })
    }

    /// Starts the replacement process without exiting.
    pub fn spawn_replacement(&self) -> Result<u32, SurfaceError> {
        let child = process::Command::new(&self.program)
            .args(&self.args)
            .spawn()
            .map_err(|e| SurfaceError::Relaunch(format!("{}: {e}", self.program.display())))?;
        Ok(child.id())
    }
}

impl ProcessControl for SelfRelauncher {
    fn relaunch(&self) -> Result<(), SurfaceError> {
        let pid = self.spawn_replacement()?;
        info!("🐕️ Replacement shell started (pid {pid}). Exiting.");
        log::logger().flush();
        process::exit(0)
    }
}
