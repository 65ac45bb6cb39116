use chrono::Utc;

/// Build a fresh record id of the form `{prefix}-{timestamp_millis}-{random}`.
///
/// Ids sort roughly by creation time. The random suffix keeps ids minted in the
/// same millisecond distinct.
pub fn generate(prefix: &str) -> String {
    format!(
        "{prefix}-{}-{:016x}",
        Utc::now().timestamp_millis(),
        rand::random::<u64>()
    )
}
