#![no_main]

use extcat_remote::{
    extension_lib_version, parse_extension_manifest, LIB_VERSION_MAX, LIB_VERSION_MIN,
};
use libfuzzer_sys::fuzz_target;

const MANIFEST_URL: &str = "https://raw.githubusercontent.com/fuzz/repo/repo/index.min.json";

fuzz_target!(|data: &[u8]| {
    let payload = String::from_utf8_lossy(data);
    if let Ok(entries) = parse_extension_manifest(&payload, "fuzz-repo", MANIFEST_URL) {
        for entry in entries {
            assert_eq!(entry.repo, "fuzz-repo");
            assert!(entry.icon_url.ends_with(".png"));
            let lib = extension_lib_version(&entry.version_name)
                .expect("accepted entries carry a lib version");
            assert!((LIB_VERSION_MIN..=LIB_VERSION_MAX).contains(&lib));
        }
    }
});
