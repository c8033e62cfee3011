use crate::workflows::completion::domain::TestRecord;

/// Distinct, non-empty guardian addresses for a record, mother first.
pub fn recipients_for(record: &TestRecord) -> Vec<String> {
    let mut recipients: Vec<String> = Vec::with_capacity(2);
    for address in [&record.mother_email, &record.father_email] {
        let address = address.trim();
        if address.is_empty() || recipients.iter().any(|known| known == address) {
            continue;
        }
        recipients.push(address.to_string());
    }
    recipients
}

/// The `To` header form: addresses joined with `", "`; empty when there are none.
pub fn recipient_line(recipients: &[String]) -> String {
    recipients.join(", ")
}
