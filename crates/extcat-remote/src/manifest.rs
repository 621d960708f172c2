//! Repository manifest (`index.min.json`) parsing.

use extcat_types::RemoteExtensionEntry;
use serde::Deserialize;

/// Lowest extension library version this catalog accepts.
pub const LIB_VERSION_MIN: f64 = 1.3;
/// Highest extension library version this catalog accepts.
pub const LIB_VERSION_MAX: f64 = 1.5;

const NAME_PREFIX: &str = "Tachiyomi: ";

#[derive(Debug, Deserialize)]
struct ManifestExtension {
    name: String,
    pkg: String,
    apk: String,
    lang: String,
    code: i64,
    version: String,
    #[serde(default)]
    nsfw: NsfwFlag,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NsfwFlag {
    Int(i64),
    Bool(bool),
}

impl Default for NsfwFlag {
    fn default() -> Self {
        Self::Int(0)
    }
}

impl NsfwFlag {
    fn is_set(&self) -> bool {
        match self {
            Self::Int(value) => *value != 0,
            Self::Bool(value) => *value,
        }
    }
}

/// Library version encoded in an extension version name: everything before the
/// last dot, e.g. `"1.4.190"` -> `1.4`.
pub fn extension_lib_version(version_name: &str) -> Option<f64> {
    let (lib, _) = version_name.trim().rsplit_once('.')?;
    lib.parse::<f64>().ok()
}

/// Parses a manifest payload fetched from `manifest_url` for the configured `repo`.
///
/// Entries built against an unsupported extension library are skipped.
pub fn parse_extension_manifest(
    payload: &str,
    repo: &str,
    manifest_url: &str,
) -> Result<Vec<RemoteExtensionEntry>, serde_json::Error> {
    let raw = serde_json::from_str::<Vec<ManifestExtension>>(payload)?;
    let icon_base = manifest_url
        .rsplit_once('/')
        .map(|(base, _)| base)
        .unwrap_or(manifest_url);

    let entries = raw
        .into_iter()
        .filter(|extension| {
            let supported = extension_lib_version(&extension.version)
                .is_some_and(|lib| (LIB_VERSION_MIN..=LIB_VERSION_MAX).contains(&lib));
            if !supported {
                tracing::debug!(
                    repo = repo,
                    pkg = %extension.pkg,
                    version = %extension.version,
                    "skipping extension with unsupported library version"
                );
            }
            supported
        })
        .map(|extension| RemoteExtensionEntry {
            name: extension
                .name
                .strip_prefix(NAME_PREFIX)
                .unwrap_or(&extension.name)
                .to_string(),
            icon_url: format!("{icon_base}/icon/{}.png", extension.pkg),
            pkg_name: extension.pkg,
            repo: repo.to_string(),
            version_name: extension.version,
            version_code: extension.code,
            lang: extension.lang,
            is_nsfw: extension.nsfw.is_set(),
            apk_name: extension.apk,
        })
        .collect();
    Ok(entries)
}
