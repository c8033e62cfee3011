use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Column headers the test-record spreadsheets must carry.
pub mod columns {
    pub const FIRST_NAME: &str = "FirstName";
    pub const LAST_NAME: &str = "LastName";
    pub const SUBJECT: &str = "Subject";
    pub const LEVEL: &str = "Type";
    pub const TIME: &str = "Time";
    pub const SCORE: &str = "Score";
    pub const FATHER_EMAIL: &str = "FatherEmail";
    pub const MOTHER_EMAIL: &str = "MotherEmail";
    pub const PASSING: &str = "Passing";

    pub const REFERENCE_LEVEL: &str = "level";
    pub const TOTAL_MARKS: &str = "totalMarks";
    pub const SUGGESTED_TIME: &str = "suggestedTime";

    pub const TEST_RECORD: [&str; 9] = [
        FIRST_NAME,
        LAST_NAME,
        SUBJECT,
        LEVEL,
        TIME,
        SCORE,
        FATHER_EMAIL,
        MOTHER_EMAIL,
        PASSING,
    ];

    pub const REFERENCE: [&str; 3] = [REFERENCE_LEVEL, TOTAL_MARKS, SUGGESTED_TIME];
}

/// Identity of a test record: its subject plus the spreadsheet row it came from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub subject: String,
    pub ordinal: usize,
}

impl RecordKey {
    pub fn new(subject: impl Into<String>, ordinal: usize) -> Self {
        Self {
            subject: subject.into(),
            ordinal,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.subject, self.ordinal)
    }
}

/// Expected total marks and suggested time for one subject/level pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceTotal {
    /// `"<subject> <level>"`, e.g. `Math 3A`.
    pub key: String,
    pub total_marks: String,
    pub suggested_time: String,
    /// Every column of the reference row, verbatim.
    pub fields: BTreeMap<String, String>,
}

/// One student's attempt at a level test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRecord {
    pub key: RecordKey,
    pub first_name: String,
    pub last_name: String,
    pub subject: String,
    pub level: String,
    pub time: String,
    pub score: String,
    pub passing: bool,
    pub mother_email: String,
    pub father_email: String,
    pub reference: Option<ReferenceTotal>,
    /// Every column of the source row, verbatim (trimmed).
    pub columns: BTreeMap<String, String>,
}

impl TestRecord {
    /// The lookup key into the reference table.
    pub fn totals_key(&self) -> String {
        format!("{} {}", self.subject.trim(), self.level.trim())
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Values available to the body template: the source columns, the merged
    /// reference columns, and whole-number forms of time, score, total marks
    /// and suggested time.
    pub fn template_fields(&self) -> BTreeMap<String, String> {
        let mut fields = self.columns.clone();
        let whole = |value: &str| truncate_fraction(value).to_string();
        fields.insert(columns::TIME.to_string(), whole(&self.time));
        fields.insert(columns::SCORE.to_string(), whole(&self.score));
        if let Some(reference) = &self.reference {
            fields.extend(reference.fields.clone());
            fields.insert(columns::TOTAL_MARKS.to_string(), whole(&reference.total_marks));
            fields.insert(
                columns::SUGGESTED_TIME.to_string(),
                whole(&reference.suggested_time),
            );
        }
        fields
    }

    /// `"<LastName>, <FirstName> - <Subject> <Level> level completion report.<ext>"`
    pub fn delivery_file_name(&self, extension: &str) -> String {
        sanitize_path_component(&format!(
            "{}, {} - {} {} level completion report.{}",
            self.last_name, self.first_name, self.subject, self.level, extension
        ))
    }

    pub fn message_subject(&self) -> String {
        format!("{}'s Level Completion Report", self.first_name)
    }
}

/// Drops any fractional textual suffix: `"20.0"` becomes `"20"`, `"19.9"` becomes `"19"`.
pub fn truncate_fraction(value: &str) -> &str {
    match value.split_once('.') {
        Some((whole, _)) => whole,
        None => value,
    }
}

/// Parses the spreadsheet's boolean-like passing column.
pub fn parse_passing_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "yes" | "y" | "true" | "1" | "pass" | "passed" => Some(true),
        "no" | "n" | "false" | "0" | "fail" | "failed" => Some(false),
        _ => None,
    }
}

/// Replaces characters that cannot appear in a single path component.
pub fn sanitize_path_component(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Folder-derived identity of a unit.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitId(pub String);

impl UnitId {
    pub fn for_record(record: &TestRecord) -> Self {
        Self(sanitize_path_component(&format!(
            "{} {} Level {} --- {}",
            record.first_name.trim(),
            record.last_name.trim(),
            record.level.trim(),
            record.key
        )))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    /// Registered but not staged; not-passing records stay here for good.
    Pending,
    Staged,
    AwaitingAttachment,
    Ready,
    Dispatched,
    Deferred,
}

impl UnitState {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Staged => "Staged",
            Self::AwaitingAttachment => "Awaiting Attachment",
            Self::Ready => "Ready",
            Self::Dispatched => "Dispatched",
            Self::Deferred => "Deferred",
        }
    }
}

/// The delivery job for a single test record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub id: UnitId,
    pub key: RecordKey,
    pub folder: PathBuf,
    pub state: UnitState,
    pub attachment: Option<PathBuf>,
}

/// Loaded test records, keyed and ordered by record identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSet {
    records: BTreeMap<RecordKey, TestRecord>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record, handing it back if its key is already taken.
    pub fn insert(&mut self, record: TestRecord) -> Result<(), TestRecord> {
        if self.records.contains_key(&record.key) {
            return Err(record);
        }
        self.records.insert(record.key.clone(), record);
        Ok(())
    }

    pub fn get(&self, key: &RecordKey) -> Option<&TestRecord> {
        self.records.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TestRecord> {
        self.records.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut TestRecord> {
        self.records.values_mut()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<TestRecord> for RecordSet {
    fn from_iter<I: IntoIterator<Item = TestRecord>>(iter: I) -> Self {
        let records = iter
            .into_iter()
            .map(|record| (record.key.clone(), record))
            .collect();
        Self { records }
    }
}

/// Reference totals keyed by `"<subject> <level>"`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceTable {
    totals: BTreeMap<String, ReferenceTotal>,
}

impl ReferenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a total, handing it back if its key is already taken.
    pub fn insert(&mut self, total: ReferenceTotal) -> Result<(), ReferenceTotal> {
        if self.totals.contains_key(&total.key) {
            return Err(total);
        }
        self.totals.insert(total.key.clone(), total);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&ReferenceTotal> {
        self.totals.get(key)
    }

    pub fn len(&self) -> usize {
        self.totals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }
}
