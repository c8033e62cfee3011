mod cli;
mod gate;
mod report;
mod session;

use lcr_mailer::error::AppError;

pub fn run() -> Result<(), AppError> {
    cli::run()
}
