use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};

use super::LoadError;

/// A sheet read into text cells; row 0 is the header row.
#[derive(Debug)]
pub(crate) struct Grid {
    pub(crate) sheet: String,
    pub(crate) rows: Vec<Vec<String>>,
}

pub(crate) fn sheet_label(path: &Path, sheet_index: usize) -> String {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    format!("{} (sheet {})", name, sheet_index + 1)
}

pub(crate) fn read_grid(path: &Path, sheet_index: usize) -> Result<Grid, LoadError> {
    let sheet = sheet_label(path, sheet_index);
    let is_csv = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);

    let rows = if is_csv {
        read_csv(path, sheet_index)?
    } else {
        read_workbook(path, sheet_index)?
    };

    Ok(Grid { sheet, rows })
}

fn read_csv(path: &Path, sheet_index: usize) -> Result<Vec<Vec<String>>, LoadError> {
    if sheet_index != 0 {
        return Err(LoadError::SheetMissing {
            path: path.to_path_buf(),
            sheet_index,
        });
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

fn read_workbook(path: &Path, sheet_index: usize) -> Result<Vec<Vec<String>>, LoadError> {
    let mut workbook = open_workbook_auto(path).map_err(|source| LoadError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let range = workbook
        .worksheet_range_at(sheet_index)
        .ok_or_else(|| LoadError::SheetMissing {
            path: path.to_path_buf(),
            sheet_index,
        })?
        .map_err(|source| LoadError::Open {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect())
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(n) => {
            // Whole numbers without a decimal point
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{}", *n as i64)
            } else {
                format!("{}", n)
            }
        }
        Data::Int(n) => n.to_string(),
        Data::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Data::Error(e) => format!("#{:?}", e),
        Data::DateTime(dt) => format!("{}", dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
    }
}
