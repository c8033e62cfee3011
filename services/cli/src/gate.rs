use lcr_mailer::workflows::completion::{GateDecision, OperatorAction, OperatorGate};
use std::io::{self, BufRead, Write};
use std::path::Path;
use tracing::warn;

/// Waits on the terminal at each pause point. An empty line continues;
/// `q`, `quit`, `abort` or end of input stops the run.
pub(crate) struct PromptGate<R, W> {
    input: R,
    output: W,
}

impl PromptGate<io::StdinLock<'static>, io::Stdout> {
    pub(crate) fn stdin() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> PromptGate<R, W> {
    pub(crate) fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn prompt(&mut self, lines: &[String]) -> GateDecision {
        match self.try_prompt(lines) {
            Ok(decision) => decision,
            Err(err) => {
                warn!(%err, "operator prompt failed; aborting");
                GateDecision::Abort
            }
        }
    }

    fn try_prompt(&mut self, lines: &[String]) -> io::Result<GateDecision> {
        for line in lines {
            writeln!(self.output, "{line}")?;
        }
        write!(
            self.output,
            "Press Enter to continue, or type q to abort: "
        )?;
        self.output.flush()?;

        let mut answer = String::new();
        if self.input.read_line(&mut answer)? == 0 {
            return Ok(GateDecision::Abort);
        }
        Ok(match answer.trim().to_ascii_lowercase().as_str() {
            "q" | "quit" | "abort" => GateDecision::Abort,
            _ => GateDecision::Recheck,
        })
    }
}

impl<R: BufRead, W: Write> OperatorGate for PromptGate<R, W> {
    fn await_attachment_import(&mut self, root: &Path) -> GateDecision {
        self.prompt(&[
            String::new(),
            "Unit folders are staged.".to_string(),
            format!(
                "Place exactly one report into each folder under {}.",
                root.display()
            ),
        ])
    }

    fn await_correction(&mut self, actions: &[OperatorAction]) -> GateDecision {
        let mut lines = vec![String::new(), "These folders need attention:".to_string()];
        lines.extend(actions.iter().map(|action| format!("- {action}")));
        lines.push("Fix them, then re-check.".to_string());
        self.prompt(&lines)
    }
}

/// Never waits: proceeds straight to the check and aborts on any issue.
pub(crate) struct UnattendedGate;

impl OperatorGate for UnattendedGate {
    fn await_attachment_import(&mut self, _root: &Path) -> GateDecision {
        GateDecision::Recheck
    }

    fn await_correction(&mut self, actions: &[OperatorAction]) -> GateDecision {
        for action in actions {
            warn!(location = %action.location.display(), issue = %action.reason, "unattended run cannot continue");
        }
        GateDecision::Abort
    }
}
