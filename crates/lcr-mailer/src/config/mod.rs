use std::env;
use std::fmt;
use std::path::PathBuf;

/// Top-level configuration for a report distribution run.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub telemetry: TelemetryConfig,
    pub inputs: InputConfig,
    pub layout: LayoutConfig,
    pub mail: MailConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let log_level = env::var("LCR_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let template = PathBuf::from(
            env::var("LCR_TEMPLATE").unwrap_or_else(|_| "TemplateEmail.html".to_string()),
        );
        let totals = PathBuf::from(
            env::var("LCR_TOTALS").unwrap_or_else(|_| "AchievementTestData.xls".to_string()),
        );
        let spreadsheets = parse_spreadsheet_list(
            &env::var("LCR_SPREADSHEETS").unwrap_or_else(|_| "math.xls,reading.xls".to_string()),
        )?;

        let print_dir_name = non_empty_var("LCR_PRINT_DIR").unwrap_or_else(|| "To Print".into());
        let attachment_extension = non_empty_var("LCR_ATTACHMENT_EXT")
            .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
            .unwrap_or_else(|| "pdf".to_string());
        let body_file_name =
            non_empty_var("LCR_BODY_FILE").unwrap_or_else(|| "email.html".to_string());

        let sender = non_empty_var("LCR_SENDER");
        let outbox = non_empty_var("LCR_OUTBOX").map(PathBuf::from);

        Ok(Self {
            telemetry: TelemetryConfig { log_level },
            inputs: InputConfig {
                template,
                totals,
                spreadsheets,
            },
            layout: LayoutConfig {
                print_dir_name,
                attachment_extension,
                body_file_name,
            },
            mail: MailConfig { sender, outbox },
        })
    }
}

/// Source artifacts read at the start of a run.
#[derive(Debug, Clone)]
pub struct InputConfig {
    /// Notification body template.
    pub template: PathBuf,
    /// Reference workbook holding total marks and suggested times.
    pub totals: PathBuf,
    /// Test-record spreadsheet file names expected in the working directory.
    pub spreadsheets: Vec<String>,
}

/// Naming rules for the staging tree.
#[derive(Debug, Clone)]
pub struct LayoutConfig {
    pub print_dir_name: String,
    pub attachment_extension: String,
    pub body_file_name: String,
}

/// Outbound mail settings.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub sender: Option<String>,
    pub outbox: Option<PathBuf>,
}

impl MailConfig {
    pub fn require_sender(&self) -> Result<&str, ConfigError> {
        self.sender.as_deref().ok_or(ConfigError::MissingSender)
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

#[derive(Debug)]
pub enum ConfigError {
    NoSpreadsheets,
    MissingSender,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NoSpreadsheets => {
                write!(f, "LCR_SPREADSHEETS must name at least one spreadsheet")
            }
            ConfigError::MissingSender => write!(
                f,
                "a sender address is required; set LCR_SENDER or pass --sender"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_spreadsheet_list(raw: &str) -> Result<Vec<String>, ConfigError> {
    let names: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();

    if names.is_empty() {
        return Err(ConfigError::NoSpreadsheets);
    }
    Ok(names)
}
