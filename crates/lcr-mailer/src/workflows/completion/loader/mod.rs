mod grid;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

use super::domain::{
    columns, parse_passing_flag, RecordKey, RecordSet, ReferenceTable, ReferenceTotal, TestRecord,
};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to open spreadsheet {}: {source}", path.display())]
    Open {
        path: PathBuf,
        source: calamine::Error,
    },
    #[error("failed to read CSV {}: {source}", path.display())]
    Csv { path: PathBuf, source: csv::Error },
    #[error("{} has no sheet {}", path.display(), sheet_index + 1)]
    SheetMissing { path: PathBuf, sheet_index: usize },
    #[error("{sheet} has no header row")]
    EmptySheet { sheet: String },
    #[error("missing column '{column}' in {sheet}")]
    ColumnMissing { column: String, sheet: String },
    #[error("duplicate key '{key}' in {sheet}")]
    DuplicateKey { key: String, sheet: String },
}

/// One data row of a sheet with every column copied by header name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRow {
    /// 1-based row number; the header is row 0.
    pub ordinal: usize,
    pub cells: BTreeMap<String, String>,
}

impl SheetRow {
    pub fn cell(&self, column: &str) -> &str {
        self.cells.get(column).map(String::as_str).unwrap_or("")
    }
}

/// A parsed sheet: headers plus rows keyed by the requested key columns.
#[derive(Debug, Clone)]
pub struct SheetTable {
    pub sheet: String,
    pub headers: Vec<String>,
    pub rows: BTreeMap<String, SheetRow>,
}

pub struct SpreadsheetLoader;

impl SpreadsheetLoader {
    /// Parse one sheet into rows keyed by the space-joined values of
    /// `key_columns`, with the row ordinal appended when `include_row_in_key`
    /// is set. Every header in `required_columns` must be present before any
    /// row is parsed.
    pub fn load<P: AsRef<Path>>(
        source: P,
        sheet_index: usize,
        required_columns: &[&str],
        key_columns: &[&str],
        include_row_in_key: bool,
    ) -> Result<SheetTable, LoadError> {
        let grid = grid::read_grid(source.as_ref(), sheet_index)?;
        let sheet = grid.sheet;
        let mut rows = grid.rows.into_iter();

        let headers: Vec<String> = rows
            .next()
            .ok_or_else(|| LoadError::EmptySheet {
                sheet: sheet.clone(),
            })?
            .into_iter()
            .map(|header| header.trim().to_string())
            .collect();

        check_required_columns(&headers, required_columns, &sheet)?;
        check_required_columns(&headers, key_columns, &sheet)?;

        let mut table = SheetTable {
            sheet,
            headers,
            rows: BTreeMap::new(),
        };

        for (index, values) in rows.enumerate() {
            let ordinal = index + 1;
            if values.iter().all(|value| value.trim().is_empty()) {
                continue;
            }

            let cells: BTreeMap<String, String> = table
                .headers
                .iter()
                .zip(values.into_iter().chain(std::iter::repeat(String::new())))
                .filter(|(header, _)| !header.is_empty())
                .map(|(header, value)| (header.clone(), value.trim().to_string()))
                .collect();

            let row = SheetRow { ordinal, cells };
            let key = row_key(&row, key_columns, include_row_in_key);
            if table.rows.contains_key(&key) {
                return Err(LoadError::DuplicateKey {
                    key,
                    sheet: table.sheet.clone(),
                });
            }
            table.rows.insert(key, row);
        }

        debug!(sheet = %table.sheet, rows = table.rows.len(), "sheet loaded");
        Ok(table)
    }
}

fn row_key(row: &SheetRow, key_columns: &[&str], include_row_in_key: bool) -> String {
    let joined = key_columns
        .iter()
        .map(|column| row.cell(column))
        .collect::<Vec<_>>()
        .join(" ");
    if include_row_in_key {
        format!("{} {}", joined, row.ordinal)
    } else {
        joined.trim().to_string()
    }
}

/// Checks the header row against a column contract. Every missing column is
/// logged; the first one is returned.
pub fn check_required_columns(
    headers: &[String],
    required: &[&str],
    sheet: &str,
) -> Result<(), LoadError> {
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|column| !headers.iter().any(|header| header == column))
        .collect();

    for column in &missing {
        error!(%sheet, column, "missing required column");
    }

    match missing.first() {
        Some(column) => Err(LoadError::ColumnMissing {
            column: column.to_string(),
            sheet: sheet.to_string(),
        }),
        None => Ok(()),
    }
}

/// Load the test-record spreadsheets (first sheet of each) into one record set.
pub fn load_test_records<P: AsRef<Path>>(sources: &[P]) -> Result<RecordSet, LoadError> {
    let mut records = RecordSet::new();

    for source in sources {
        let table = SpreadsheetLoader::load(
            source,
            0,
            &columns::TEST_RECORD,
            &[columns::SUBJECT],
            true,
        )?;

        for row in table.rows.values() {
            let record = test_record_from_row(row, &table.sheet);
            if let Err(duplicate) = records.insert(record) {
                return Err(LoadError::DuplicateKey {
                    key: duplicate.key.to_string(),
                    sheet: table.sheet.clone(),
                });
            }
        }
    }

    Ok(records)
}

/// Load the reference totals from the given sheets of the reference workbook.
pub fn load_reference_totals<P: AsRef<Path>>(
    source: P,
    sheet_indices: &[usize],
) -> Result<ReferenceTable, LoadError> {
    let mut totals = ReferenceTable::new();

    for &sheet_index in sheet_indices {
        let table = SpreadsheetLoader::load(
            source.as_ref(),
            sheet_index,
            &columns::REFERENCE,
            &[columns::REFERENCE_LEVEL],
            false,
        )?;

        for (key, row) in table.rows {
            let total = ReferenceTotal {
                key,
                total_marks: row.cell(columns::TOTAL_MARKS).to_string(),
                suggested_time: row.cell(columns::SUGGESTED_TIME).to_string(),
                fields: row.cells,
            };
            if let Err(duplicate) = totals.insert(total) {
                return Err(LoadError::DuplicateKey {
                    key: duplicate.key,
                    sheet: table.sheet.clone(),
                });
            }
        }
    }

    Ok(totals)
}

/// Only a recognised negative flag withholds a record; blank or unknown
/// values count as passing.
fn test_record_from_row(row: &SheetRow, sheet: &str) -> TestRecord {
    let raw_passing = row.cell(columns::PASSING);
    let passing = parse_passing_flag(raw_passing).unwrap_or_else(|| {
        warn!(
            %sheet,
            row = row.ordinal,
            value = raw_passing,
            "unrecognised passing flag; treating record as passing"
        );
        true
    });

    let subject = row.cell(columns::SUBJECT).to_string();

    TestRecord {
        key: RecordKey::new(subject.clone(), row.ordinal),
        first_name: row.cell(columns::FIRST_NAME).to_string(),
        last_name: row.cell(columns::LAST_NAME).to_string(),
        subject,
        level: row.cell(columns::LEVEL).to_string(),
        time: row.cell(columns::TIME).to_string(),
        score: row.cell(columns::SCORE).to_string(),
        passing,
        mother_email: row.cell(columns::MOTHER_EMAIL).to_string(),
        father_email: row.cell(columns::FATHER_EMAIL).to_string(),
        reference: None,
        columns: row.cells.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const HEADER: &str =
        "FirstName,LastName,Subject,Type,Time,Score,FatherEmail,MotherEmail,Passing,Notes";

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).expect("write fixture");
        path
    }

    #[test]
    fn keys_join_columns_and_append_row_ordinal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write(
            dir.path(),
            "math.csv",
            &format!(
                "{HEADER}\n\
                 John,Doe,Math,3A,18.5,190,,m@x.com,Yes,first\n\
                 Jane,Roe,Math,3A,20,150,f@x.com,,No, \n"
            ),
        );

        let table = SpreadsheetLoader::load(&path, 0, &columns::TEST_RECORD, &["Subject"], true)
            .expect("sheet loads");

        let keys: Vec<&str> = table.rows.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["Math 1", "Math 2"]);
        let first = &table.rows["Math 1"];
        assert_eq!(first.cell("FirstName"), "John");
        assert_eq!(first.cell("Subject"), "Math");
        assert_eq!(first.cell("Notes"), "first");
        assert_eq!(table.rows["Math 2"].cell("Notes"), "");
    }

    #[test]
    fn keys_without_row_ordinal_collide_on_duplicates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write(
            dir.path(),
            "totals.csv",
            "level,totalMarks,suggestedTime\nMath 3A,200,20\nMath 3A,180,25\n",
        );

        let error = SpreadsheetLoader::load(&path, 0, &columns::REFERENCE, &["level"], false)
            .expect_err("duplicate rejected");
        match error {
            LoadError::DuplicateKey { key, .. } => assert_eq!(key, "Math 3A"),
            other => panic!("expected duplicate key, got {other:?}"),
        }
    }

    #[test]
    fn missing_required_column_names_column_and_sheet() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write(
            dir.path(),
            "reading.csv",
            "FirstName,LastName,Subject,Type,Time,Score,FatherEmail,Passing\n",
        );

        let error = load_test_records(&[path]).expect_err("column check fails");
        match error {
            LoadError::ColumnMissing { column, sheet } => {
                assert_eq!(column, "MotherEmail");
                assert_eq!(sheet, "reading.csv (sheet 1)");
            }
            other => panic!("expected missing column, got {other:?}"),
        }
    }

    #[test]
    fn blank_rows_are_skipped_but_keep_ordinals() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write(
            dir.path(),
            "math.csv",
            &format!("{HEADER}\n,,,,,,,,,\nJohn,Doe,Math,3A,18,190,,,Yes,\n"),
        );

        let records = load_test_records(&[path]).expect("records load");
        assert_eq!(records.len(), 1);
        let record = records.iter().next().expect("one record");
        assert_eq!(record.key, RecordKey::new("Math", 2));
        assert!(record.passing);
    }

    #[test]
    fn only_a_negative_flag_withholds_a_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write(
            dir.path(),
            "math.csv",
            &format!(
                "{HEADER}\n\
                 John,Doe,Math,3A,18,190,,,,\n\
                 Jane,Roe,Math,3A,18,190,,,perhaps,\n\
                 Sam,Park,Math,3A,18,190,,,Yes,\n\
                 Ann,Lee,Math,3A,18,120,,,no,\n"
            ),
        );

        let records = load_test_records(&[path]).expect("records load");

        let passing: Vec<(&str, bool)> = records
            .iter()
            .map(|record| (record.first_name.as_str(), record.passing))
            .collect();
        assert_eq!(
            passing,
            vec![("John", true), ("Jane", true), ("Sam", true), ("Ann", false)]
        );
    }

    #[test]
    fn records_from_two_sources_with_same_subject_and_row_collide() {
        let dir = tempfile::tempdir().expect("tempdir");
        let contents = format!("{HEADER}\nJohn,Doe,Math,3A,18,190,,,Yes,\n");
        let first = write(dir.path(), "math.csv", &contents);
        let second = write(dir.path(), "math-copy.csv", &contents);

        match load_test_records(&[first, second]).expect_err("duplicate rejected") {
            LoadError::DuplicateKey { key, sheet } => {
                assert_eq!(key, "Math 1");
                assert_eq!(sheet, "math-copy.csv (sheet 1)");
            }
            other => panic!("expected duplicate key, got {other:?}"),
        }
    }

    #[test]
    fn csv_sources_only_have_one_sheet() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write(dir.path(), "totals.csv", "level,totalMarks,suggestedTime\n");
        assert!(matches!(
            load_reference_totals(&path, &[0, 1]),
            Err(LoadError::SheetMissing { sheet_index: 1, .. })
        ));
    }

    #[test]
    fn missing_workbook_reports_open_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let error = load_reference_totals(dir.path().join("absent.xlsx"), &[0])
            .expect_err("missing file fails");
        assert!(matches!(error, LoadError::Open { .. }));
    }
}
