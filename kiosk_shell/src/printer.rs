//! Receipt printing for thermal printers that speak ESC/POS.
//!
//! Receipts are plain lines of text. The printer is a character device (e.g. `/dev/usb/lp0`) and each receipt is
//! written to it in one go.
use std::path::{Path, PathBuf};

use log::*;
use serde::{Deserialize, Serialize};
use tokio::{fs::OpenOptions, io::AsyncWriteExt};

use crate::errors::ShellError;

const ESC: u8 = 0x1b;
const GS: u8 = 0x1d;
const LF: u8 = 0x0a;
/// Lines fed after the last line, so the tear-off edge clears the printed text.
const FEED_LINES: u8 = 4;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub lines: Vec<String>,
    #[serde(default = "default_cut")]
    pub cut: bool,
}

fn default_cut() -> bool {
    true
}

impl Receipt {
    pub fn new<I: IntoIterator<Item = S>, S: Into<String>>(lines: I) -> Self {
        Self { lines: lines.into_iter().map(Into::into).collect(), cut: true }
    }

    /// The ESC/POS byte stream for this receipt: initialise, the lines, feed, and optionally a full cut.
    pub fn to_escpos(&self) -> Vec<u8> {
        let mut out = vec![ESC, b'@'];
        for line in &self.lines {
            // Control characters inside a line would be taken as printer commands
            out.extend(line.chars().filter(|c| !c.is_control()).collect::<String>().as_bytes());
            out.push(LF);
        }
        out.extend_from_slice(&[ESC, b'd', FEED_LINES]);
        if self.cut {
            out.extend_from_slice(&[GS, b'V', 0]);
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct ReceiptPrinter {
    device: Option<PathBuf>,
}

impl ReceiptPrinter {
    pub fn new(device: Option<PathBuf>) -> Self {
        Self { device }
    }

    pub fn device(&self) -> Option<&Path> {
        self.device.as_deref()
    }

    pub async fn print(&self, receipt: &Receipt) -> Result<(), ShellError> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| ShellError::PrinterUnavailable("No printer device is configured.".into()))?;
        if receipt.lines.is_empty() {
            return Err(ShellError::InvalidRequestBody("A receipt needs at least one line".into()));
        }
        let mut file = OpenOptions::new()
            .write(true)
            .create(false)
            .append(true)
            .open(device)
            .await
            .map_err(|e| ShellError::PrinterUnavailable(format!("{}: {e}", device.display())))?;
        file.write_all(&receipt.to_escpos()).await?;
        file.flush().await?;
        info!("🧾️ Printed a receipt of {} lines on {}", receipt.lines.len(), device.display());
        Ok(())
    }
}
