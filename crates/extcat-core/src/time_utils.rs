/// Returns the current Unix timestamp in milliseconds.
pub fn current_unix_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

/// Milliseconds elapsed from `mark_ms` to `now_ms`, zero when the mark is ahead of now.
pub fn elapsed_ms_since(mark_ms: u64, now_ms: u64) -> u64 {
    now_ms.saturating_sub(mark_ms)
}
