use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::layout::{has_extension, WorkspaceLayout};

/// Why a location needs operator attention before dispatch can start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentIssue {
    /// Deliverables sitting directly in the working root.
    StrayAtRoot { count: usize },
    /// A unit folder with no deliverable.
    Missing,
    /// A unit folder with more than one deliverable.
    Multiple { count: usize },
    /// A registered unit whose folder is gone.
    FolderMissing,
}

impl fmt::Display for AttachmentIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachmentIssue::StrayAtRoot { count } => write!(
                f,
                "{count} report(s) have not been placed in a unit folder"
            ),
            AttachmentIssue::Missing => write!(f, "no report found in folder"),
            AttachmentIssue::Multiple { count } => {
                write!(f, "{count} reports found in folder; expected exactly one")
            }
            AttachmentIssue::FolderMissing => write!(f, "unit folder is missing"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorAction {
    pub reason: AttachmentIssue,
    pub location: PathBuf,
}

impl fmt::Display for OperatorAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location.display(), self.reason)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Every unit folder holds exactly one deliverable, keyed folder -> file.
    AllClear { attachments: BTreeMap<PathBuf, PathBuf> },
    NeedsOperatorAction { actions: Vec<OperatorAction> },
}

impl ReconcileOutcome {
    pub fn is_clear(&self) -> bool {
        matches!(self, ReconcileOutcome::AllClear { .. })
    }
}

/// Counts deliverables per unit folder after the manual import step.
#[derive(Debug, Clone)]
pub struct AttachmentReconciler {
    extension: String,
}

impl AttachmentReconciler {
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
        }
    }

    /// Counts files carrying the layout's attachment extension.
    pub fn for_layout(layout: &WorkspaceLayout) -> Self {
        Self::new(layout.attachment_extension())
    }

    /// The root must hold no deliverables and each subdirectory outside
    /// `exceptions` exactly one. All problems are reported, not only the first.
    pub fn reconcile(&self, root: &Path, exceptions: &[PathBuf]) -> io::Result<ReconcileOutcome> {
        let mut actions = Vec::new();
        let mut attachments = BTreeMap::new();

        let stray = self.deliverables_in(root)?;
        if !stray.is_empty() {
            actions.push(OperatorAction {
                reason: AttachmentIssue::StrayAtRoot { count: stray.len() },
                location: root.to_path_buf(),
            });
        }

        let mut folders = Vec::new();
        for entry in fs::read_dir(root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                folders.push(entry.path());
            }
        }
        folders.sort();

        for folder in folders {
            if exceptions.iter().any(|exception| *exception == folder) {
                continue;
            }

            let mut found = self.deliverables_in(&folder)?;
            match found.len() {
                1 => {
                    attachments.insert(folder, found.remove(0));
                }
                0 => actions.push(OperatorAction {
                    reason: AttachmentIssue::Missing,
                    location: folder,
                }),
                count => actions.push(OperatorAction {
                    reason: AttachmentIssue::Multiple { count },
                    location: folder,
                }),
            }
        }

        if actions.is_empty() {
            info!(folders = attachments.len(), "attachments reconciled");
            Ok(ReconcileOutcome::AllClear { attachments })
        } else {
            for action in &actions {
                warn!(location = %action.location.display(), issue = %action.reason, "attachment check failed");
            }
            Ok(ReconcileOutcome::NeedsOperatorAction { actions })
        }
    }

    fn deliverables_in(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_file() && has_extension(&path, &self.extension) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}
