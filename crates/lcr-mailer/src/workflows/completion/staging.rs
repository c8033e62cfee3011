use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::domain::{RecordKey, RecordSet, TestRecord, UnitId, UnitState};
use super::layout::WorkspaceLayout;
use super::registry::UnitRegistry;
use super::template::{BodyTemplate, TemplateError};

#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("failed to render body for '{unit}': {source}")]
    Render {
        unit: UnitId,
        source: TemplateError,
    },
    #[error("failed to stage {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

/// What a staging pass did with each record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagingReport {
    pub created: Vec<UnitId>,
    pub resumed: Vec<UnitId>,
    pub previously_sent: Vec<UnitId>,
    pub not_passing: Vec<RecordKey>,
}

/// Materializes one folder per passing record with its rendered body.
pub struct UnitStager<'a> {
    template: &'a BodyTemplate,
    layout: &'a WorkspaceLayout,
}

impl<'a> UnitStager<'a> {
    pub fn new(template: &'a BodyTemplate, layout: &'a WorkspaceLayout) -> Self {
        Self { template, layout }
    }

    /// Stage every record, registering each unit. Safe to re-run over a
    /// partially staged tree: folders that already hold a body are left as-is.
    pub fn stage(
        &self,
        records: &RecordSet,
        registry: &mut UnitRegistry,
    ) -> Result<StagingReport, StageError> {
        let mut report = StagingReport::default();

        for record in records.iter() {
            let id = UnitId::for_record(record);
            let folder = self.layout.unit_folder(&id);

            if !record.passing {
                debug!(record = %record.key, "not passing; no unit staged");
                registry.register(id, record.key.clone(), folder, UnitState::Pending);
                report.not_passing.push(record.key.clone());
                continue;
            }

            let created = match fs::create_dir(&folder) {
                Ok(()) => true,
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => false,
                Err(source) => {
                    return Err(StageError::Io {
                        path: folder,
                        source,
                    })
                }
            };

            let body_path = self.layout.body_path(&folder);
            if created || !body_path.exists() {
                if !created {
                    warn!(unit = %id, "folder exists without a body; rendering again");
                }
                self.render_body(&id, record, &body_path)?;
                report.created.push(id.clone());
            } else {
                report.resumed.push(id.clone());
            }

            let state = if self.layout.receipt_path(&folder).exists() {
                report.previously_sent.push(id.clone());
                UnitState::Dispatched
            } else {
                UnitState::Staged
            };
            registry.register(id, record.key.clone(), folder, state);
        }

        info!(
            created = report.created.len(),
            resumed = report.resumed.len(),
            not_passing = report.not_passing.len(),
            "staging complete"
        );
        Ok(report)
    }

    fn render_body(&self, id: &UnitId, record: &TestRecord, path: &Path) -> Result<(), StageError> {
        let body = self
            .template
            .render(&record.template_fields())
            .map_err(|source| StageError::Render {
                unit: id.clone(),
                source,
            })?;
        write_atomically(path, body.as_bytes()).map_err(|source| StageError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Writes beside the target and renames into place so an interrupted run
/// never leaves a truncated body behind.
fn write_atomically(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut partial = path.as_os_str().to_owned();
    partial.push(".partial");
    let partial = PathBuf::from(partial);
    fs::write(&partial, contents)?;
    fs::rename(&partial, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::completion::tests::common::{joined_records, snapshot_tree, test_record};
    use crate::workflows::completion::domain::RecordSet;

    fn template() -> BodyTemplate {
        BodyTemplate::from_source(
            "email.html",
            "<p>$FirstName finished $Subject $Type in $Time minutes \
             (${suggestedTime} suggested) scoring $Score/$totalMarks.</p>",
        )
    }

    #[test]
    fn stages_one_folder_per_passing_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = WorkspaceLayout::with_defaults(dir.path());
        let records = joined_records();
        let template = template();
        let mut registry = UnitRegistry::new();

        let report = UnitStager::new(&template, &layout)
            .stage(&records, &mut registry)
            .expect("staging succeeds");

        assert_eq!(report.created.len(), 1);
        assert_eq!(report.not_passing.len(), 1);

        let folder = dir.path().join("John Doe Level 3A --- Math 1");
        let body = fs::read_to_string(folder.join("email.html")).expect("body written");
        assert_eq!(
            body,
            "<p>John finished Math 3A in 18 minutes (20 suggested) scoring 190/200.</p>"
        );
        assert!(!dir.path().join("Jane Roe Level 3A --- Math 2").exists());
        assert_eq!(registry.count(UnitState::Staged), 1);
        assert_eq!(registry.count(UnitState::Pending), 1);
    }

    #[test]
    fn second_pass_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = WorkspaceLayout::with_defaults(dir.path());
        let records = joined_records();
        let template = template();
        let stager = UnitStager::new(&template, &layout);

        stager
            .stage(&records, &mut UnitRegistry::new())
            .expect("first pass");
        let before = snapshot_tree(dir.path());

        let mut registry = UnitRegistry::new();
        let report = stager.stage(&records, &mut registry).expect("second pass");

        assert!(report.created.is_empty());
        assert_eq!(report.resumed.len(), 1);
        assert_eq!(snapshot_tree(dir.path()), before);
        assert_eq!(registry.count(UnitState::Staged), 1);
    }

    #[test]
    fn existing_body_is_never_re_rendered() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = WorkspaceLayout::with_defaults(dir.path());
        let records = joined_records();
        let template = template();
        let stager = UnitStager::new(&template, &layout);
        stager
            .stage(&records, &mut UnitRegistry::new())
            .expect("first pass");

        let body = dir
            .path()
            .join("John Doe Level 3A --- Math 1")
            .join("email.html");
        fs::write(&body, "edited by hand").expect("edit body");

        stager
            .stage(&records, &mut UnitRegistry::new())
            .expect("second pass");
        assert_eq!(fs::read_to_string(&body).expect("body"), "edited by hand");
    }

    #[test]
    fn interrupted_folder_without_body_is_completed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = WorkspaceLayout::with_defaults(dir.path());
        let folder = dir.path().join("John Doe Level 3A --- Math 1");
        fs::create_dir(&folder).expect("pre-create folder");

        let template = template();
        let report = UnitStager::new(&template, &layout)
            .stage(&joined_records(), &mut UnitRegistry::new())
            .expect("staging succeeds");

        assert_eq!(report.created.len(), 1);
        assert!(folder.join("email.html").exists());
        assert!(!folder.join("email.html.partial").exists());
    }

    #[test]
    fn unknown_placeholder_names_the_unit() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = WorkspaceLayout::with_defaults(dir.path());
        let template = BodyTemplate::from_source("email.html", "$Nickname");
        let records: RecordSet = [test_record("John", "Doe", "Math", "3A", 1)]
            .into_iter()
            .collect();

        let error = UnitStager::new(&template, &layout)
            .stage(&records, &mut UnitRegistry::new())
            .expect_err("render fails");
        match error {
            StageError::Render { unit, .. } => {
                assert_eq!(unit.as_str(), "John Doe Level 3A --- Math 1")
            }
            other => panic!("expected render error, got {other:?}"),
        }
    }

    #[test]
    fn units_with_a_receipt_are_registered_as_dispatched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = WorkspaceLayout::with_defaults(dir.path());
        let template = template();
        let stager = UnitStager::new(&template, &layout);
        stager
            .stage(&joined_records(), &mut UnitRegistry::new())
            .expect("first pass");
        let folder = dir.path().join("John Doe Level 3A --- Math 1");
        fs::write(layout.receipt_path(&folder), "{}").expect("receipt");

        let mut registry = UnitRegistry::new();
        let report = stager
            .stage(&joined_records(), &mut registry)
            .expect("second pass");

        assert_eq!(report.previously_sent.len(), 1);
        assert_eq!(registry.count(UnitState::Dispatched), 1);
        assert_eq!(registry.count(UnitState::Staged), 0);
    }
}
