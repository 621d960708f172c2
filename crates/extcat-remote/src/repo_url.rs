//! Rewrites shorthand repository URLs into direct manifest URLs.

const GITHUB_PREFIXES: [&str; 2] = ["https://github.com/", "https://www.github.com/"];
const RAW_CONTENT_BASE: &str = "https://raw.githubusercontent.com";

/// Ref used when a GitHub repository URL does not name one.
pub const DEFAULT_REPO_REF: &str = "repo";
/// Manifest file used when a GitHub repository URL does not name one.
pub const DEFAULT_MANIFEST_FILE: &str = "index.min.json";

#[derive(Debug, PartialEq, Eq)]
struct GithubRepoLocation<'a> {
    owner: &'a str,
    project: &'a str,
    git_ref: Option<&'a str>,
    file: Option<String>,
}

impl GithubRepoLocation<'_> {
    fn raw_manifest_url(&self) -> String {
        format!(
            "{RAW_CONTENT_BASE}/{}/{}/{}/{}",
            self.owner,
            self.project,
            self.git_ref.unwrap_or(DEFAULT_REPO_REF),
            self.file.as_deref().unwrap_or(DEFAULT_MANIFEST_FILE)
        )
    }
}

/// Returns the machine-readable manifest URL for `repo_url`.
///
/// `https://github.com/{owner}/{project}[/tree|blob/{ref}][/{file}.json]` is
/// rewritten to the raw-content URL of that file; anything else is assumed to
/// already point at a manifest and is returned trimmed but otherwise unchanged.
pub fn normalize_repo_url(repo_url: &str) -> String {
    let trimmed = repo_url.trim();
    match parse_github_repo_url(trimmed) {
        Some(location) => location.raw_manifest_url(),
        None => trimmed.to_string(),
    }
}

fn parse_github_repo_url(url: &str) -> Option<GithubRepoLocation<'_>> {
    let path = GITHUB_PREFIXES
        .iter()
        .find_map(|prefix| url.strip_prefix(prefix))?;
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let path = path.trim_end_matches('/');

    let mut segments = path.split('/');
    let owner = segments.next().filter(|value| !value.is_empty())?;
    let project = segments.next().filter(|value| !value.is_empty())?;
    let rest = segments.collect::<Vec<_>>();

    let (git_ref, file_segments) = match rest.first().copied() {
        Some("tree" | "blob") => {
            let git_ref = rest.get(1).copied().filter(|value| !value.is_empty())?;
            (Some(git_ref), &rest[2..])
        }
        _ => (None, &rest[..]),
    };

    let file = if file_segments.is_empty() {
        None
    } else {
        if file_segments.iter().any(|segment| segment.is_empty()) {
            return None;
        }
        let joined = file_segments.join("/");
        if !joined.ends_with(".json") {
            return None;
        }
        Some(joined)
    };

    Some(GithubRepoLocation {
        owner,
        project,
        git_ref,
        file,
    })
}
