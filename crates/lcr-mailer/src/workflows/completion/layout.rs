use std::path::{Path, PathBuf};

use crate::config::LayoutConfig;

use super::domain::UnitId;

/// Receipt written into a unit folder once its message was accepted.
pub const RECEIPT_FILE_NAME: &str = ".lcr-sent.json";

/// Absolute addressing for the staging tree rooted at the working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceLayout {
    root: PathBuf,
    print_dir_name: String,
    body_file_name: String,
    attachment_extension: String,
    extra_exceptions: Vec<PathBuf>,
}

impl WorkspaceLayout {
    pub fn new(root: impl Into<PathBuf>, config: &LayoutConfig) -> Self {
        Self {
            root: root.into(),
            print_dir_name: config.print_dir_name.clone(),
            body_file_name: config.body_file_name.clone(),
            attachment_extension: config.attachment_extension.clone(),
            extra_exceptions: Vec::new(),
        }
    }

    /// Exclude another directory (such as a pickup outbox) from unit discovery.
    pub fn with_exception(mut self, dir: impl Into<PathBuf>) -> Self {
        self.extra_exceptions.push(dir.into());
        self
    }

    /// `To Print` deferred area, `email.html` bodies, `pdf` attachments.
    pub fn with_defaults(root: impl Into<PathBuf>) -> Self {
        Self::new(
            root,
            &LayoutConfig {
                print_dir_name: "To Print".to_string(),
                attachment_extension: "pdf".to_string(),
                body_file_name: "email.html".to_string(),
            },
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn print_dir(&self) -> PathBuf {
        self.root.join(&self.print_dir_name)
    }

    pub fn unit_folder(&self, id: &UnitId) -> PathBuf {
        self.root.join(id.as_str())
    }

    pub fn body_path(&self, folder: &Path) -> PathBuf {
        folder.join(&self.body_file_name)
    }

    pub fn receipt_path(&self, folder: &Path) -> PathBuf {
        folder.join(RECEIPT_FILE_NAME)
    }

    pub fn attachment_extension(&self) -> &str {
        &self.attachment_extension
    }

    /// Directories under the root that never hold units.
    pub fn exceptions(&self) -> Vec<PathBuf> {
        let mut exceptions = vec![self.print_dir()];
        exceptions.extend(self.extra_exceptions.iter().cloned());
        exceptions
    }

    pub fn is_attachment(&self, path: &Path) -> bool {
        has_extension(path, &self.attachment_extension)
    }
}

/// Case-insensitive extension match; `extension` carries no leading dot.
pub fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}
