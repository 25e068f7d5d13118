use aho_corasick::AhoCorasick;
use anyhow::Result;
use camino::Utf8Path;

/// Substrings that mark a path as test code.
const TEST_MARKERS: &[&str] = &[
    "/test/",
    "/tests/",
    "/__tests__/",
    ".test.",
    ".spec.",
    "_test.",
    "_spec.",
];

const TEST_FILE_PREFIXES: &[&str] = &["test_", "spec_"];

const TEST_ROOT_DIRS: &[&str] = &["test", "tests", "spec", "__tests__"];

/// Path-based test file heuristic. Matching is case-insensitive.
pub struct TestClassifier {
    markers: AhoCorasick,
}

impl TestClassifier {
    pub fn new() -> Result<Self> {
        Ok(Self {
            markers: AhoCorasick::new(TEST_MARKERS)?,
        })
    }

    pub fn is_test(&self, path: &str) -> bool {
        let normalized = path.replace('\\', "/").to_lowercase();
        if self.markers.is_match(&normalized) {
            return true;
        }

        let path = Utf8Path::new(&normalized);
        if path
            .file_name()
            .is_some_and(|name| TEST_FILE_PREFIXES.iter().any(|p| name.starts_with(p)))
        {
            return true;
        }
        // a top-level test directory; `tests/foo.rs` has no leading slash to match
        path.iter()
            .next()
            .is_some_and(|first| path.file_name() != Some(first) && TEST_ROOT_DIRS.contains(&first))
    }
}

/// Suffixes that name a test after its subject, checked after the extension
/// is cut off: `parser_test`, `AppTest`, `user_spec`.
const TEST_NAME_SUFFIXES: &[&str] = &[
    "_tests", "_test", "_spec", "-test", "-spec", "tests", "test", "spec",
];

/// Lowercased file name up to its first dot: `src/Auth.test.ts` gives `auth`.
pub fn file_stem(path: &str) -> Option<String> {
    let normalized = path.replace('\\', "/").to_lowercase();
    let name = Utf8Path::new(&normalized).file_name()?;
    let stem = name.split('.').next().unwrap_or(name);
    (!stem.is_empty()).then(|| stem.to_string())
}

/// Stem of the file a test is named after: `tests/test_auth.py`,
/// `auth_test.go` and `Auth.spec.ts` all give `auth`.
pub fn tested_stem(path: &str) -> Option<String> {
    let stem = file_stem(path)?;
    let stem = TEST_FILE_PREFIXES
        .iter()
        .find_map(|p| stem.strip_prefix(*p))
        .filter(|rest| !rest.is_empty())
        .unwrap_or(&stem);
    let stem = TEST_NAME_SUFFIXES
        .iter()
        .find_map(|s| stem.strip_suffix(*s))
        .filter(|rest| !rest.is_empty())
        .unwrap_or(stem);
    Some(stem.to_string())
}
