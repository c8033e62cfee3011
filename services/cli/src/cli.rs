use crate::gate::{PromptGate, UnattendedGate};
use crate::report::{check_lines, staging_lines, summary_lines};
use crate::session::Session;
use clap::{Args, Parser, Subcommand};
use lcr_mailer::error::AppError;
use lcr_mailer::workflows::completion::pipeline::{self, OperatorGate};
use lcr_mailer::workflows::completion::{prepare, reconcile_units};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "lcr",
    about = "Stage and send level completion reports to parents",
    version
)]
pub(crate) struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Full batch: stage, wait for the reports, check the folders and send
    Run(RunArgs),
    /// Load, join and stage unit folders only
    Stage(WorkspaceArgs),
    /// Stage (idempotent) and report whether every folder holds one report
    Check(WorkspaceArgs),
    /// Stage, check and send without prompting; fails if any folder needs attention
    Send(SendArgs),
}

#[derive(Args, Debug, Clone)]
pub(crate) struct WorkspaceArgs {
    /// Working directory holding the test-record spreadsheets
    #[arg(long)]
    pub(crate) dir: PathBuf,
    /// Override the configured body template
    #[arg(long)]
    pub(crate) template: Option<PathBuf>,
    /// Override the configured reference workbook
    #[arg(long)]
    pub(crate) totals: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, Default)]
pub(crate) struct MailArgs {
    /// Sender address; overrides LCR_SENDER
    #[arg(long)]
    pub(crate) sender: Option<String>,
    /// Pickup directory for outgoing messages; defaults to <dir>/Outbox
    #[arg(long)]
    pub(crate) outbox: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    workspace: WorkspaceArgs,
    #[command(flatten)]
    mail: MailArgs,
    /// Do not wait for the operator; abort if any folder needs attention
    #[arg(long)]
    yes: bool,
}

#[derive(Args, Debug)]
struct SendArgs {
    #[command(flatten)]
    workspace: WorkspaceArgs,
    #[command(flatten)]
    mail: MailArgs,
}

pub(crate) fn run() -> Result<(), AppError> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => {
            let session = Session::open(&args.workspace, &args.mail)?;
            if args.yes {
                dispatch_batch(&session, &mut UnattendedGate)
            } else {
                dispatch_batch(&session, &mut PromptGate::stdin())
            }
        }
        Command::Send(args) => {
            let session = Session::open(&args.workspace, &args.mail)?;
            dispatch_batch(&session, &mut UnattendedGate)
        }
        Command::Stage(args) => {
            let session = Session::open(&args, &MailArgs::default())?;
            let batch = prepare(&session.inputs, &session.layout)?;
            print_lines(staging_lines(&batch.staging, session.layout.root()));
            Ok(())
        }
        Command::Check(args) => {
            let session = Session::open(&args, &MailArgs::default())?;
            let mut batch = prepare(&session.inputs, &session.layout)?;
            let outcome = reconcile_units(&mut batch.registry, &session.layout)?;
            print_lines(check_lines(&outcome));
            Ok(())
        }
    }
}

fn dispatch_batch(session: &Session, gate: &mut dyn OperatorGate) -> Result<(), AppError> {
    let transport = session.transport()?;
    info!(
        root = %session.layout.root().display(),
        outbox = %transport.directory().display(),
        "starting report run"
    );
    let summary = pipeline::run(&session.inputs, &session.layout, &transport, gate)?;
    print_lines(summary_lines(&summary));
    Ok(())
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{line}");
    }
}
