use std::fmt::Debug;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use super::message::OutgoingMessage;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("recipients rejected: {0}")]
    RecipientsRejected(String),
    #[error("transport failure: {0}")]
    Failure(String),
}

/// Outbound mail boundary. Session setup and authentication happen before a
/// transport is handed to the dispatch engine.
pub trait MailTransport: Debug {
    /// The authenticated sender identity.
    fn sender(&self) -> &str;
    fn submit(&self, message: &OutgoingMessage) -> Result<(), TransportError>;
}

/// Drops each accepted message as an `.eml` file into a pickup directory
/// drained by a relay or mail client.
#[derive(Debug)]
pub struct PickupDirectoryTransport {
    sender: String,
    directory: PathBuf,
    sequence: AtomicU64,
}

impl PickupDirectoryTransport {
    pub fn new(sender: impl Into<String>, directory: impl Into<PathBuf>) -> io::Result<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory)?;
        Ok(Self {
            sender: sender.into(),
            directory,
            sequence: AtomicU64::new(1),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn write_message(&self, contents: &str) -> io::Result<PathBuf> {
        loop {
            let id = self.sequence.fetch_add(1, Ordering::Relaxed);
            let path = self.directory.join(format!("lcr-{id:06}.eml"));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(contents.as_bytes())?;
                    file.sync_all()?;
                    return Ok(path);
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(err),
            }
        }
    }
}

impl MailTransport for PickupDirectoryTransport {
    fn sender(&self) -> &str {
        &self.sender
    }

    fn submit(&self, message: &OutgoingMessage) -> Result<(), TransportError> {
        if message.to.is_empty() {
            return Err(TransportError::RecipientsRejected(
                "no recipients".to_string(),
            ));
        }
        let rejected: Vec<&str> = message
            .to
            .iter()
            .map(String::as_str)
            .filter(|address| !is_plausible_address(address))
            .collect();
        if !rejected.is_empty() {
            return Err(TransportError::RecipientsRejected(rejected.join(", ")));
        }

        let path = self
            .write_message(&message.render())
            .map_err(|err| TransportError::Failure(err.to_string()))?;
        debug!(path = %path.display(), to = %message.to_line(), "message queued");
        Ok(())
    }
}

/// `local@domain` with no whitespace or angle brackets and a dotted domain.
fn is_plausible_address(address: &str) -> bool {
    if address
        .chars()
        .any(|c| c.is_whitespace() || c == '<' || c == '>' || c == ',')
    {
        return false;
    }
    match address.rsplit_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}
