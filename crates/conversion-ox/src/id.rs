use chrono::Utc;

/// Length of the random suffix
const RANDOM_SUFFIX_LEN: usize = 8;

/// Build an identifier of the form `{prefix}-{unix_nanos}-{8 alphanumerics}`.
#[must_use]
pub fn generate_id(prefix: &str) -> String {
    let nanos = Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_else(|| Utc::now().timestamp_micros().saturating_mul(1_000));
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}-{nanos}-{}", &random[..RANDOM_SUFFIX_LEN])
}
