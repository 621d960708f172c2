#![no_main]

use extcat_remote::normalize_repo_url;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    let normalized = normalize_repo_url(&raw);
    assert_eq!(normalize_repo_url(&normalized), normalized);
    if normalized != raw.trim() {
        assert!(normalized.starts_with("https://raw.githubusercontent.com/"));
        assert!(normalized.ends_with(".json"));
    }
});
