use crate::cli::{MailArgs, WorkspaceArgs};
use lcr_mailer::config::AppConfig;
use lcr_mailer::error::AppError;
use lcr_mailer::telemetry;
use lcr_mailer::workflows::completion::{PickupDirectoryTransport, PipelineInputs, WorkspaceLayout};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Resolved configuration for one invocation. Every path is absolute.
pub(crate) struct Session {
    pub(crate) config: AppConfig,
    pub(crate) layout: WorkspaceLayout,
    pub(crate) inputs: PipelineInputs,
    pub(crate) outbox: PathBuf,
}

impl Session {
    pub(crate) fn open(workspace: &WorkspaceArgs, mail: &MailArgs) -> Result<Self, AppError> {
        let mut config = AppConfig::load()?;

        if let Some(template) = workspace.template.clone() {
            config.inputs.template = template;
        }
        if let Some(totals) = workspace.totals.clone() {
            config.inputs.totals = totals;
        }
        if let Some(sender) = mail.sender.clone() {
            config.mail.sender = Some(sender);
        }
        if let Some(outbox) = mail.outbox.clone() {
            config.mail.outbox = Some(outbox);
        }

        telemetry::init(&config.telemetry)?;

        let cwd = env::current_dir()?;
        let root = fs::canonicalize(&workspace.dir)?;
        config.inputs.template = absolute(&cwd, &config.inputs.template);
        config.inputs.totals = absolute(&cwd, &config.inputs.totals);

        let outbox = config
            .mail
            .outbox
            .as_deref()
            .map(|outbox| absolute(&root, outbox))
            .unwrap_or_else(|| root.join("Outbox"));

        let layout = WorkspaceLayout::new(&root, &config.layout).with_exception(outbox.clone());
        let inputs = PipelineInputs::from_config(&root, &config.inputs);
        debug!(root = %root.display(), outbox = %outbox.display(), "session opened");

        Ok(Self {
            config,
            layout,
            inputs,
            outbox,
        })
    }

    /// The sender is only required once something is about to be sent.
    pub(crate) fn transport(&self) -> Result<PickupDirectoryTransport, AppError> {
        let sender = self.config.mail.require_sender()?;
        Ok(PickupDirectoryTransport::new(sender, &self.outbox)?)
    }
}

fn absolute(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_resolve_against_base() {
        let base = Path::new("/work");
        assert_eq!(
            absolute(base, Path::new("Outbox")),
            PathBuf::from("/work/Outbox")
        );
        assert_eq!(
            absolute(base, Path::new("/srv/outbox")),
            PathBuf::from("/srv/outbox")
        );
    }
}
