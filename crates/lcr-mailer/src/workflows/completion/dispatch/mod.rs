mod message;
mod recipients;
mod transport;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::domain::{RecordKey, RecordSet, TestRecord, Unit, UnitId, UnitState};
use super::layout::WorkspaceLayout;
use super::registry::UnitRegistry;

pub use message::{MessageAttachment, OutgoingMessage};
pub use recipients::{recipient_line, recipients_for};
pub use transport::{MailTransport, PickupDirectoryTransport, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("{} holds {count} attachment(s); exactly one is required", folder.display())]
    AttachmentCountInvalid { folder: PathBuf, count: usize },
    #[error("unit '{unit}' is {} and cannot be dispatched", state.label())]
    NotReady { unit: UnitId, state: UnitState },
    #[error("unit '{unit}' refers to unknown record {key}")]
    UnknownRecord { unit: UnitId, key: RecordKey },
    #[error("dispatch io failure at {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

/// A transport refusal for one unit. Recorded, never raised: the batch goes on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("dispatch failed for '{unit}': {cause}")]
pub struct DispatchFailed {
    pub unit: UnitId,
    pub cause: TransportError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeferralReason {
    /// Neither guardian address is on file; no attempt was made.
    NoRecipients,
    Failed(DispatchFailed),
}

impl DeferralReason {
    pub fn summary(&self) -> String {
        match self {
            DeferralReason::NoRecipients => "no email address on file".to_string(),
            DeferralReason::Failed(failed) => failed.cause.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentUnit {
    pub unit: UnitId,
    pub addressee: String,
    pub recipients: String,
    pub attachment: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredUnit {
    pub unit: UnitId,
    pub addressee: String,
    pub reason: DeferralReason,
    /// Where the deliverable now lives inside the deferred area.
    pub moved_to: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub sent: Vec<SentUnit>,
    pub deferred: Vec<DeferredUnit>,
}

/// Written into a unit folder once its message is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReceipt {
    pub unit: UnitId,
    pub recipients: Vec<String>,
    pub subject: String,
    pub attachment: String,
    pub sent_at: DateTime<Local>,
}

enum UnitOutcome {
    Sent(SentUnit),
    Deferred(DeferredUnit),
}

/// Walks ready units one at a time, submitting each through the transport
/// and routing anything undeliverable to the deferred area.
pub struct DispatchEngine<'a, T: MailTransport + ?Sized> {
    transport: &'a T,
    layout: &'a WorkspaceLayout,
}

impl<'a, T: MailTransport + ?Sized> DispatchEngine<'a, T> {
    pub fn new(transport: &'a T, layout: &'a WorkspaceLayout) -> Self {
        Self { transport, layout }
    }

    pub fn dispatch(
        &self,
        registry: &mut UnitRegistry,
        records: &RecordSet,
    ) -> Result<DispatchReport, DispatchError> {
        self.verify_ready(registry)?;

        let print_dir = self.layout.print_dir();
        fs::create_dir_all(&print_dir).map_err(|source| DispatchError::Io {
            path: print_dir.clone(),
            source,
        })?;

        let mut report = DispatchReport::default();
        for id in registry.ids_in_state(UnitState::Ready) {
            let Some(unit) = registry.get(&id).cloned() else {
                continue;
            };
            let record = records
                .get(&unit.key)
                .ok_or_else(|| DispatchError::UnknownRecord {
                    unit: unit.id.clone(),
                    key: unit.key.clone(),
                })?;

            let outcome = self.dispatch_unit(&unit, record, &print_dir)?;
            if let Some(entry) = registry.get_mut(&id) {
                match &outcome {
                    UnitOutcome::Sent(sent) => {
                        entry.state = UnitState::Dispatched;
                        entry.attachment = Some(sent.attachment.clone());
                    }
                    UnitOutcome::Deferred(deferred) => {
                        entry.state = UnitState::Deferred;
                        entry.attachment = Some(deferred.moved_to.clone());
                    }
                }
            }
            match outcome {
                UnitOutcome::Sent(sent) => report.sent.push(sent),
                UnitOutcome::Deferred(deferred) => report.deferred.push(deferred),
            }
        }

        info!(
            sent = report.sent.len(),
            deferred = report.deferred.len(),
            "dispatch complete"
        );
        Ok(report)
    }

    /// Units that were staged but never reconciled block the whole batch, as
    /// does any ready folder that no longer holds exactly one attachment.
    fn verify_ready(&self, registry: &UnitRegistry) -> Result<(), DispatchError> {
        for state in [UnitState::Staged, UnitState::AwaitingAttachment] {
            if let Some(unit) = registry.in_state(state).next() {
                return Err(DispatchError::NotReady {
                    unit: unit.id.clone(),
                    state,
                });
            }
        }

        for unit in registry.in_state(UnitState::Ready) {
            let count = self.attachment_count(&unit.folder)?;
            if count != 1 || unit.attachment.is_none() {
                return Err(DispatchError::AttachmentCountInvalid {
                    folder: unit.folder.clone(),
                    count,
                });
            }
        }
        Ok(())
    }

    fn attachment_count(&self, folder: &Path) -> Result<usize, DispatchError> {
        let entries = fs::read_dir(folder).map_err(|source| DispatchError::Io {
            path: folder.to_path_buf(),
            source,
        })?;
        let mut count = 0;
        for entry in entries {
            let entry = entry.map_err(|source| DispatchError::Io {
                path: folder.to_path_buf(),
                source,
            })?;
            if entry.path().is_file() && self.layout.is_attachment(&entry.path()) {
                count += 1;
            }
        }
        Ok(count)
    }

    fn dispatch_unit(
        &self,
        unit: &Unit,
        record: &TestRecord,
        print_dir: &Path,
    ) -> Result<UnitOutcome, DispatchError> {
        let addressee = record.full_name();
        let recipients = recipients_for(record);

        let attachment = self.rename_attachment(unit, record)?;

        if recipients.is_empty() {
            let moved_to = self.defer(&attachment, print_dir)?;
            info!(unit = %unit.id, %addressee, to = %moved_to.display(), "no email address; report must be printed");
            return Ok(UnitOutcome::Deferred(DeferredUnit {
                unit: unit.id.clone(),
                addressee,
                reason: DeferralReason::NoRecipients,
                moved_to,
            }));
        }

        let message = self.assemble(unit, record, &recipients, &attachment)?;
        match self.transport.submit(&message) {
            Ok(()) => {
                info!(unit = %unit.id, %addressee, to = %message.to_line(), "report sent");
                self.write_receipt(unit, &message);
                Ok(UnitOutcome::Sent(SentUnit {
                    unit: unit.id.clone(),
                    addressee,
                    recipients: message.to_line(),
                    attachment,
                }))
            }
            Err(cause) => {
                warn!(unit = %unit.id, %addressee, to = %message.to_line(), %cause, "failed to send report");
                let moved_to = self.defer(&attachment, print_dir)?;
                Ok(UnitOutcome::Deferred(DeferredUnit {
                    unit: unit.id.clone(),
                    addressee,
                    reason: DeferralReason::Failed(DispatchFailed {
                        unit: unit.id.clone(),
                        cause,
                    }),
                    moved_to,
                }))
            }
        }
    }

    /// Gives the attachment its delivery name inside the unit folder.
    fn rename_attachment(&self, unit: &Unit, record: &TestRecord) -> Result<PathBuf, DispatchError> {
        let canonical = unit
            .folder
            .join(record.delivery_file_name(self.layout.attachment_extension()));
        let current = unit
            .attachment
            .clone()
            .ok_or_else(|| DispatchError::AttachmentCountInvalid {
                folder: unit.folder.clone(),
                count: 0,
            })?;

        if current != canonical {
            fs::rename(&current, &canonical).map_err(|source| DispatchError::Io {
                path: current.clone(),
                source,
            })?;
        }
        Ok(canonical)
    }

    fn assemble(
        &self,
        unit: &Unit,
        record: &TestRecord,
        recipients: &[String],
        attachment: &Path,
    ) -> Result<OutgoingMessage, DispatchError> {
        let body_path = self.layout.body_path(&unit.folder);
        let html_body = fs::read_to_string(&body_path).map_err(|source| DispatchError::Io {
            path: body_path.clone(),
            source,
        })?;
        let bytes = fs::read(attachment).map_err(|source| DispatchError::Io {
            path: attachment.to_path_buf(),
            source,
        })?;
        let file_name = attachment
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(OutgoingMessage {
            from: self.transport.sender().to_string(),
            to: recipients.to_vec(),
            subject: record.message_subject(),
            html_body,
            attachment: MessageAttachment::octet_stream(file_name, bytes),
            date: Local::now(),
        })
    }

    fn defer(&self, attachment: &Path, print_dir: &Path) -> Result<PathBuf, DispatchError> {
        move_into(attachment, print_dir).map_err(|source| DispatchError::Io {
            path: attachment.to_path_buf(),
            source,
        })
    }

    fn write_receipt(&self, unit: &Unit, message: &OutgoingMessage) {
        let receipt = DispatchReceipt {
            unit: unit.id.clone(),
            recipients: message.to.clone(),
            subject: message.subject.clone(),
            attachment: message.attachment.file_name.clone(),
            sent_at: message.date,
        };
        let path = self.layout.receipt_path(&unit.folder);
        let result = serde_json::to_vec_pretty(&receipt)
            .map_err(io::Error::from)
            .and_then(|bytes| fs::write(&path, bytes));
        if let Err(err) = result {
            error!(unit = %unit.id, path = %path.display(), %err, "report sent but receipt not written; a re-run would send it again");
        }
    }
}

/// Moves `file` into `dir` without overwriting: `name.pdf`, `name (2).pdf`, ...
fn move_into(file: &Path, dir: &Path) -> io::Result<PathBuf> {
    let file_name = file
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let mut target = dir.join(file_name);

    let stem = file
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = file
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    let mut attempt = 2;
    while target.exists() {
        target = dir.join(format!("{stem} ({attempt}){extension}"));
        attempt += 1;
    }

    fs::rename(file, &target)?;
    Ok(target)
}
