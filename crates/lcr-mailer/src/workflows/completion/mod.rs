//! Level completion report distribution.
//!
//! Test-record spreadsheets are joined against the reference totals, one
//! folder per passing record is staged with its rendered body, the operator
//! drops a report document into each folder, and every ready unit is then
//! dispatched through a [`MailTransport`] or moved to the print area.

pub mod dispatch;
pub mod domain;
pub mod join;
pub mod layout;
pub mod loader;
pub mod pipeline;
pub mod reconcile;
pub mod registry;
pub mod staging;
pub mod template;

#[cfg(test)]
mod tests;

pub use dispatch::{
    DeferralReason, DeferredUnit, DispatchEngine, DispatchError, DispatchFailed, DispatchReceipt,
    DispatchReport, MailTransport, OutgoingMessage, PickupDirectoryTransport, SentUnit,
    TransportError,
};
pub use domain::{RecordKey, RecordSet, ReferenceTable, TestRecord, Unit, UnitId, UnitState};
pub use join::JoinError;
pub use layout::WorkspaceLayout;
pub use loader::LoadError;
pub use pipeline::{
    prepare, reconcile_units, run, GateDecision, OperatorGate, PipelineError, PipelineInputs,
    PreparedBatch, RunSummary,
};
pub use reconcile::{AttachmentIssue, OperatorAction, ReconcileOutcome};
pub use registry::UnitRegistry;
pub use staging::{StageError, StagingReport};
pub use template::{BodyTemplate, TemplateError};
