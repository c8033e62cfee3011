use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::InputConfig;

use super::dispatch::{DeferredUnit, DispatchEngine, DispatchError, MailTransport, SentUnit};
use super::domain::{RecordSet, UnitId, UnitState};
use super::join::{join, JoinError};
use super::layout::WorkspaceLayout;
use super::loader::{load_reference_totals, load_test_records, LoadError};
use super::reconcile::{AttachmentIssue, AttachmentReconciler, OperatorAction, ReconcileOutcome};
use super::registry::UnitRegistry;
use super::staging::{StageError, StagingReport, UnitStager};
use super::template::{BodyTemplate, TemplateError};

/// The reference workbook holds one sheet per subject group.
pub const REFERENCE_SHEETS: [usize; 2] = [0, 1];

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{artifact} not found at {}", location.display())]
    MissingInput {
        artifact: &'static str,
        location: PathBuf,
    },
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Join(#[from] JoinError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Stage(#[from] StageError),
    #[error("failed to inspect {}: {source}", root.display())]
    Reconcile { root: PathBuf, source: io::Error },
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("run aborted with {outstanding} attachment issue(s) outstanding")]
    OperatorAborted { outstanding: usize },
}

/// Source artifacts for one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineInputs {
    pub spreadsheets: Vec<PathBuf>,
    pub totals: PathBuf,
    pub totals_sheets: Vec<usize>,
    pub template: PathBuf,
}

impl PipelineInputs {
    /// Test-record spreadsheets live in the working directory; the template
    /// and reference workbook are taken as configured.
    pub fn from_config(work_dir: &Path, config: &InputConfig) -> Self {
        Self {
            spreadsheets: config
                .spreadsheets
                .iter()
                .map(|name| work_dir.join(name))
                .collect(),
            totals: config.totals.clone(),
            totals_sheets: REFERENCE_SHEETS.to_vec(),
            template: config.template.clone(),
        }
    }
}

/// Loaded, joined and staged records with their registry.
#[derive(Debug, Clone)]
pub struct PreparedBatch {
    pub records: RecordSet,
    pub registry: UnitRegistry,
    pub staging: StagingReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Recheck,
    Abort,
}

/// The operator-facing pause points of a run.
pub trait OperatorGate {
    /// Called once staging is done and documents must be placed into unit folders.
    fn await_attachment_import(&mut self, root: &Path) -> GateDecision;
    /// Called each time reconciliation finds folders that need fixing.
    fn await_correction(&mut self, actions: &[OperatorAction]) -> GateDecision;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub staged: usize,
    pub resumed: usize,
    pub not_passing: usize,
    pub sent: Vec<SentUnit>,
    pub deferred: Vec<DeferredUnit>,
    pub previously_sent: Vec<UnitId>,
}

/// Every input must exist before anything is read.
pub fn check_inputs(inputs: &PipelineInputs) -> Result<(), PipelineError> {
    let required = inputs
        .spreadsheets
        .iter()
        .map(|path| ("test-record spreadsheet", path))
        .chain([
            ("reference workbook", &inputs.totals),
            ("body template", &inputs.template),
        ]);

    for (artifact, location) in required {
        if !location.is_file() {
            return Err(PipelineError::MissingInput {
                artifact,
                location: location.clone(),
            });
        }
    }
    Ok(())
}

/// Setup checks, load, join and staging. Staged units come back awaiting
/// their attachment.
pub fn prepare(
    inputs: &PipelineInputs,
    layout: &WorkspaceLayout,
) -> Result<PreparedBatch, PipelineError> {
    check_inputs(inputs)?;

    let mut records = load_test_records(&inputs.spreadsheets)?;
    let totals = load_reference_totals(&inputs.totals, &inputs.totals_sheets)?;
    info!(
        records = records.len(),
        totals = totals.len(),
        "spreadsheets loaded"
    );
    join(&totals, &mut records)?;

    let template = BodyTemplate::from_path(&inputs.template)?;
    let mut registry = UnitRegistry::new();
    let staging = UnitStager::new(&template, layout).stage(&records, &mut registry)?;
    registry.transition_all(UnitState::Staged, UnitState::AwaitingAttachment);

    Ok(PreparedBatch {
        records,
        registry,
        staging,
    })
}

/// Check the staging tree and, when every folder is in order, mark waiting
/// units ready with their attachment. Folders of units sent on an earlier
/// run are left out of the walk.
pub fn reconcile_units(
    registry: &mut UnitRegistry,
    layout: &WorkspaceLayout,
) -> Result<ReconcileOutcome, PipelineError> {
    let mut exceptions = layout.exceptions();
    exceptions.extend(
        registry
            .in_state(UnitState::Dispatched)
            .map(|unit| unit.folder.clone()),
    );

    let outcome = AttachmentReconciler::for_layout(layout)
        .reconcile(layout.root(), &exceptions)
        .map_err(|source| PipelineError::Reconcile {
            root: layout.root().to_path_buf(),
            source,
        })?;

    let mut actions: Vec<OperatorAction> = registry
        .in_state(UnitState::AwaitingAttachment)
        .filter(|unit| !unit.folder.is_dir())
        .map(|unit| OperatorAction {
            reason: AttachmentIssue::FolderMissing,
            location: unit.folder.clone(),
        })
        .collect();
    for action in &actions {
        warn!(location = %action.location.display(), issue = %action.reason, "attachment check failed");
    }

    let mut attachments = match outcome {
        ReconcileOutcome::NeedsOperatorAction {
            actions: mut found,
        } => {
            found.append(&mut actions);
            return Ok(ReconcileOutcome::NeedsOperatorAction { actions: found });
        }
        ReconcileOutcome::AllClear { .. } if !actions.is_empty() => {
            return Ok(ReconcileOutcome::NeedsOperatorAction { actions });
        }
        ReconcileOutcome::AllClear { attachments } => attachments,
    };

    attachments.retain(|folder, _| {
        let owned = registry.owns_folder(folder);
        if !owned {
            warn!(folder = %folder.display(), "folder does not belong to this batch; ignored");
        }
        owned
    });

    for id in registry.ids_in_state(UnitState::AwaitingAttachment) {
        if let Some(unit) = registry.get_mut(&id) {
            unit.attachment = attachments.get(&unit.folder).cloned();
            unit.state = UnitState::Ready;
        }
    }

    Ok(ReconcileOutcome::AllClear { attachments })
}

/// One full batch: prepare, wait for the import, reconcile until clear,
/// dispatch.
pub fn run<T, G>(
    inputs: &PipelineInputs,
    layout: &WorkspaceLayout,
    transport: &T,
    gate: &mut G,
) -> Result<RunSummary, PipelineError>
where
    T: MailTransport + ?Sized,
    G: OperatorGate + ?Sized,
{
    let mut batch = prepare(inputs, layout)?;

    if batch.registry.count(UnitState::AwaitingAttachment) > 0 {
        if gate.await_attachment_import(layout.root()) == GateDecision::Abort {
            return Err(PipelineError::OperatorAborted { outstanding: 0 });
        }
        loop {
            match reconcile_units(&mut batch.registry, layout)? {
                ReconcileOutcome::AllClear { .. } => break,
                ReconcileOutcome::NeedsOperatorAction { actions } => {
                    if gate.await_correction(&actions) == GateDecision::Abort {
                        return Err(PipelineError::OperatorAborted {
                            outstanding: actions.len(),
                        });
                    }
                }
            }
        }
    } else {
        info!("no units awaiting attachments");
    }

    let report = DispatchEngine::new(transport, layout).dispatch(&mut batch.registry, &batch.records)?;

    Ok(RunSummary {
        staged: batch.staging.created.len(),
        resumed: batch.staging.resumed.len(),
        not_passing: batch.staging.not_passing.len(),
        sent: report.sent,
        deferred: report.deferred,
        previously_sent: batch.staging.previously_sent,
    })
}
