use tracing::debug;

use super::domain::{RecordSet, ReferenceTable};

#[derive(Debug, thiserror::Error)]
pub enum JoinError {
    #[error("no reference total for '{key}'")]
    MissingReferenceTotal { key: String },
}

/// Merge each record's reference total into it. Every record must resolve
/// before any is touched, so a failed join leaves the set unchanged.
pub fn join(totals: &ReferenceTable, records: &mut RecordSet) -> Result<(), JoinError> {
    for record in records.iter() {
        let key = record.totals_key();
        if totals.get(&key).is_none() {
            return Err(JoinError::MissingReferenceTotal { key });
        }
    }

    for record in records.iter_mut() {
        let key = record.totals_key();
        if let Some(total) = totals.get(&key) {
            debug!(record = %record.key, totals = %key, "reference total joined");
            record.reference = Some(total.clone());
        }
    }

    Ok(())
}
