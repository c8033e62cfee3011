use lcr_mailer::workflows::completion::{
    DeferralReason, ReconcileOutcome, RunSummary, StagingReport,
};
use std::path::Path;

pub(crate) fn summary_lines(summary: &RunSummary) -> Vec<String> {
    let mut lines = vec![String::new(), "Level completion reports".to_string()];

    if summary.sent.is_empty() {
        lines.push("\nSent: none".to_string());
    } else {
        lines.push("\nSent".to_string());
        for sent in &summary.sent {
            lines.push(format!("- {} -> {}", sent.addressee, sent.recipients));
        }
    }

    if summary.deferred.is_empty() {
        lines.push("\nTo print: none".to_string());
    } else {
        lines.push("\nTo print".to_string());
        for deferred in &summary.deferred {
            let reason = match &deferred.reason {
                DeferralReason::NoRecipients => deferred.reason.summary(),
                DeferralReason::Failed(failed) => format!("not sent: {}", failed.cause),
            };
            lines.push(format!(
                "- {} ({}), report at {}",
                deferred.addressee,
                reason,
                deferred.moved_to.display()
            ));
        }
    }

    if !summary.previously_sent.is_empty() {
        lines.push("\nSent on an earlier run".to_string());
        for unit in &summary.previously_sent {
            lines.push(format!("- {unit}"));
        }
    }

    lines.push(format!(
        "\nTotals: {} sent, {} to print, {} previously sent, {} not passing ({} staged, {} resumed)",
        summary.sent.len(),
        summary.deferred.len(),
        summary.previously_sent.len(),
        summary.not_passing,
        summary.staged,
        summary.resumed
    ));
    lines
}

pub(crate) fn staging_lines(report: &StagingReport, root: &Path) -> Vec<String> {
    let mut lines = vec![format!("Staged units under {}", root.display())];
    for unit in &report.created {
        lines.push(format!("- {unit} (new)"));
    }
    for unit in &report.resumed {
        lines.push(format!("- {unit} (existing)"));
    }
    lines.push(format!(
        "{} new, {} existing, {} already sent, {} not passing",
        report.created.len(),
        report.resumed.len(),
        report.previously_sent.len(),
        report.not_passing.len()
    ));
    lines
}

pub(crate) fn check_lines(outcome: &ReconcileOutcome) -> Vec<String> {
    match outcome {
        ReconcileOutcome::AllClear { attachments } => vec![format!(
            "All clear: {} folder(s) hold exactly one report",
            attachments.len()
        )],
        ReconcileOutcome::NeedsOperatorAction { actions } => {
            let mut lines = vec![format!("{} folder(s) need attention", actions.len())];
            lines.extend(actions.iter().map(|action| format!("- {action}")));
            lines
        }
    }
}
