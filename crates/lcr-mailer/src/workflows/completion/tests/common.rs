use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::workflows::completion::dispatch::{MailTransport, OutgoingMessage, TransportError};
use crate::workflows::completion::domain::{
    columns, RecordKey, RecordSet, ReferenceTable, ReferenceTotal, TestRecord,
};
use crate::workflows::completion::join::join;

/// A passing record with no guardian addresses; every test-record column is filled.
pub(crate) fn test_record(
    first: &str,
    last: &str,
    subject: &str,
    level: &str,
    ordinal: usize,
) -> TestRecord {
    let columns = BTreeMap::from([
        (columns::FIRST_NAME.to_string(), first.to_string()),
        (columns::LAST_NAME.to_string(), last.to_string()),
        (columns::SUBJECT.to_string(), subject.to_string()),
        (columns::LEVEL.to_string(), level.to_string()),
        (columns::TIME.to_string(), "18.5".to_string()),
        (columns::SCORE.to_string(), "190.0".to_string()),
        (columns::FATHER_EMAIL.to_string(), String::new()),
        (columns::MOTHER_EMAIL.to_string(), String::new()),
        (columns::PASSING.to_string(), "Yes".to_string()),
    ]);

    TestRecord {
        key: RecordKey::new(subject, ordinal),
        first_name: first.to_string(),
        last_name: last.to_string(),
        subject: subject.to_string(),
        level: level.to_string(),
        time: "18.5".to_string(),
        score: "190.0".to_string(),
        passing: true,
        mother_email: String::new(),
        father_email: String::new(),
        reference: None,
        columns,
    }
}

/// Reference totals from `(key, totalMarks, suggestedTime)` triples.
pub(crate) fn reference_table(entries: &[(&str, &str, &str)]) -> ReferenceTable {
    let mut table = ReferenceTable::new();
    for (key, marks, time) in entries {
        let total = ReferenceTotal {
            key: key.to_string(),
            total_marks: marks.to_string(),
            suggested_time: time.to_string(),
            fields: BTreeMap::from([
                (columns::REFERENCE_LEVEL.to_string(), key.to_string()),
                (columns::TOTAL_MARKS.to_string(), marks.to_string()),
                (columns::SUGGESTED_TIME.to_string(), time.to_string()),
            ]),
        };
        table.insert(total).expect("unique reference key");
    }
    table
}

/// John Doe (passing) and Jane Roe (not passing), both Math 3A, joined to 200/20.
pub(crate) fn joined_records() -> RecordSet {
    let john = test_record("John", "Doe", "Math", "3A", 1);
    let mut jane = test_record("Jane", "Roe", "Math", "3A", 2);
    jane.passing = false;
    jane.columns
        .insert(columns::PASSING.to_string(), "No".to_string());

    let mut records: RecordSet = [john, jane].into_iter().collect();
    join(&reference_table(&[("Math 3A", "200.0", "20")]), &mut records).expect("join succeeds");
    records
}

/// Every file under `root`, keyed by its path relative to `root`.
pub(crate) fn snapshot_tree(root: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut files = BTreeMap::new();
    collect(root, root, &mut files);
    files
}

fn collect(root: &Path, dir: &Path, files: &mut BTreeMap<String, Vec<u8>>) {
    for entry in fs::read_dir(dir).expect("readable dir") {
        let path = entry.expect("dir entry").path();
        if path.is_dir() {
            collect(root, &path, files);
        } else {
            let relative = path
                .strip_prefix(root)
                .expect("under root")
                .to_string_lossy()
                .into_owned();
            files.insert(relative, fs::read(&path).expect("readable file"));
        }
    }
}

/// Records every submission and answers with a fixed outcome, or with a
/// per-address rejection when one is configured.
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingTransport {
    submitted: Arc<Mutex<Vec<OutgoingMessage>>>,
    failure: Option<TransportError>,
    rejected_address: Option<String>,
}

impl RecordingTransport {
    pub(crate) fn accepting() -> Self {
        Self::default()
    }

    pub(crate) fn failing(error: TransportError) -> Self {
        Self {
            failure: Some(error),
            ..Self::default()
        }
    }

    pub(crate) fn rejecting(address: &str) -> Self {
        Self {
            rejected_address: Some(address.to_string()),
            ..Self::default()
        }
    }

    pub(crate) fn submitted(&self) -> Vec<OutgoingMessage> {
        self.submitted.lock().expect("transport log").clone()
    }
}

impl MailTransport for RecordingTransport {
    fn sender(&self) -> &str {
        "office@example.com"
    }

    fn submit(&self, message: &OutgoingMessage) -> Result<(), TransportError> {
        self.submitted
            .lock()
            .expect("transport log")
            .push(message.clone());

        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        if let Some(address) = &self.rejected_address {
            if message.to.iter().any(|to| to == address) {
                return Err(TransportError::RecipientsRejected(address.clone()));
            }
        }
        Ok(())
    }
}
