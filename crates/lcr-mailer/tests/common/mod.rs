#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use lcr_mailer::workflows::completion::{
    GateDecision, MailTransport, OperatorAction, OperatorGate, OutgoingMessage, PipelineInputs,
    TransportError, WorkspaceLayout,
};
use rust_xlsxwriter::{Workbook, XlsxError};

pub const TEST_HEADER: [&str; 9] = [
    "FirstName",
    "LastName",
    "Subject",
    "Type",
    "Time",
    "Score",
    "FatherEmail",
    "MotherEmail",
    "Passing",
];

/// One spreadsheet row: first, last, subject, level, time, score, father, mother, passing.
pub struct Row {
    pub first: &'static str,
    pub last: &'static str,
    pub subject: &'static str,
    pub level: &'static str,
    pub time: f64,
    pub score: f64,
    pub father: &'static str,
    pub mother: &'static str,
    pub passing: &'static str,
}

pub fn write_records(path: &Path, rows: &[Row]) -> Result<(), XlsxError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (col, header) in TEST_HEADER.iter().enumerate() {
        sheet.write_string(0, col as u16, *header)?;
    }
    for (index, row) in rows.iter().enumerate() {
        let r = index as u32 + 1;
        sheet.write_string(r, 0, row.first)?;
        sheet.write_string(r, 1, row.last)?;
        sheet.write_string(r, 2, row.subject)?;
        sheet.write_string(r, 3, row.level)?;
        sheet.write_number(r, 4, row.time)?;
        sheet.write_number(r, 5, row.score)?;
        if !row.father.is_empty() {
            sheet.write_string(r, 6, row.father)?;
        }
        if !row.mother.is_empty() {
            sheet.write_string(r, 7, row.mother)?;
        }
        sheet.write_string(r, 8, row.passing)?;
    }
    workbook.save(path)
}

/// A reference workbook with one sheet per entry of `sheets`, each holding
/// `(level, totalMarks, suggestedTime)` rows.
pub fn write_totals(path: &Path, sheets: &[(&str, &[(&str, f64, f64)])]) -> Result<(), XlsxError> {
    let mut workbook = Workbook::new();
    for (name, rows) in sheets {
        let sheet = workbook.add_worksheet();
        sheet.set_name(*name)?;
        sheet.write_string(0, 0, "level")?;
        sheet.write_string(0, 1, "totalMarks")?;
        sheet.write_string(0, 2, "suggestedTime")?;
        for (index, (level, marks, time)) in rows.iter().enumerate() {
            let r = index as u32 + 1;
            sheet.write_string(r, 0, *level)?;
            sheet.write_number(r, 1, *marks)?;
            sheet.write_number(r, 2, *time)?;
        }
    }
    workbook.save(path)
}

pub fn john_doe() -> Row {
    Row {
        first: "John",
        last: "Doe",
        subject: "Math",
        level: "3A",
        time: 18.5,
        score: 190.0,
        father: "",
        mother: "m@x.com",
        passing: "Yes",
    }
}

/// Math and Reading spreadsheets in `root`; totals and template in a
/// `sources` directory beside the units.
pub fn workspace(root: &Path, math: &[Row], reading: &[Row]) -> PipelineInputs {
    let sources = root.join("sources");
    fs::create_dir_all(&sources).expect("sources dir");

    let math_path = root.join("math.xlsx");
    let reading_path = root.join("reading.xlsx");
    write_records(&math_path, math).expect("math workbook");
    write_records(&reading_path, reading).expect("reading workbook");

    let totals = sources.join("AchievementTestData.xlsx");
    write_totals(
        &totals,
        &[
            ("Math", &[("Math 3A", 200.0, 20.0), ("Math 4A", 180.0, 25.0)][..]),
            ("Reading", &[("Reading 2B", 50.0, 15.0)][..]),
        ],
    )
    .expect("totals workbook");

    let template = sources.join("TemplateEmail.html");
    fs::write(
        &template,
        "<p>$FirstName completed $Subject level $Type in $Time minutes \
         (suggested $suggestedTime) with $Score of ${totalMarks} marks.</p>",
    )
    .expect("template");

    PipelineInputs {
        spreadsheets: vec![math_path, reading_path],
        totals,
        totals_sheets: vec![0, 1],
        template,
    }
}

pub fn layout(root: &Path) -> WorkspaceLayout {
    WorkspaceLayout::with_defaults(root).with_exception(root.join("sources"))
}

/// Answers every submission the same way and keeps what it was given.
#[derive(Debug, Default)]
pub struct StubTransport {
    pub answer: Option<TransportError>,
    pub submitted: Arc<Mutex<Vec<OutgoingMessage>>>,
}

impl StubTransport {
    pub fn answering(answer: TransportError) -> Self {
        Self {
            answer: Some(answer),
            ..Self::default()
        }
    }

    pub fn submitted(&self) -> Vec<OutgoingMessage> {
        self.submitted.lock().expect("stub log").clone()
    }
}

impl MailTransport for StubTransport {
    fn sender(&self) -> &str {
        "office@example.com"
    }

    fn submit(&self, message: &OutgoingMessage) -> Result<(), TransportError> {
        self.submitted
            .lock()
            .expect("stub log")
            .push(message.clone());
        match &self.answer {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

/// Puts one scan into every unit folder that has a body but no scan when
/// asked for the import, and aborts on any correction request.
#[derive(Debug, Default)]
pub struct ScanningGate {
    pub imports: usize,
    pub corrections: Vec<Vec<OperatorAction>>,
}

impl OperatorGate for ScanningGate {
    fn await_attachment_import(&mut self, root: &Path) -> GateDecision {
        self.imports += 1;
        for entry in fs::read_dir(root).expect("root readable") {
            let path = entry.expect("entry").path();
            if !path.join("email.html").is_file() {
                continue;
            }
            let holds_scan = fs::read_dir(&path)
                .expect("unit readable")
                .any(|file| {
                    file.expect("file")
                        .path()
                        .extension()
                        .map(|ext| ext == "pdf")
                        .unwrap_or(false)
                });
            if !holds_scan {
                fs::write(path.join("scan.pdf"), b"%PDF-1.4 level report").expect("scan placed");
            }
        }
        GateDecision::Recheck
    }

    fn await_correction(&mut self, actions: &[OperatorAction]) -> GateDecision {
        self.corrections.push(actions.to_vec());
        GateDecision::Abort
    }
}
