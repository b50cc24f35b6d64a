use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use super::{StoreError, StoreResult};
use crate::model::CoverageId;

/// Coverage ids reported as executed by the runtime collector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutedIdSet {
    ids: BTreeSet<CoverageId>,
}

impl ExecutedIdSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: CoverageId) -> bool {
        self.ids.contains(&id)
    }

    pub fn insert(&mut self, id: CoverageId) -> bool {
        self.ids.insert(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = CoverageId> + '_ {
        self.ids.iter().copied()
    }
}

impl FromIterator<CoverageId> for ExecutedIdSet {
    fn from_iter<I: IntoIterator<Item = CoverageId>>(iter: I) -> Self {
        Self { ids: iter.into_iter().collect() }
    }
}

/// Parse a profile log: one decimal id per line, optionally prefixed by one `+`.
///
/// Blank lines (including the trailing newline) are ignored. A line that is
/// not an id fails the whole parse; a corrupted profile must never be read as
/// "these blocks did not run".
pub fn parse_profile(text: &str, source: &Path) -> StoreResult<ExecutedIdSet> {
    let mut ids = ExecutedIdSet::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let malformed = |reason: String| StoreError::MalformedRecord {
            path: source.to_path_buf(),
            line: idx + 1,
            reason: format!("invalid coverage id `{line}`: {reason}"),
        };
        let digits = line.strip_prefix('+').unwrap_or(line);
        if !digits.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(malformed("expected decimal digits".into()));
        }
        let id: CoverageId = digits.parse().map_err(|e| malformed(format!("{e}")))?;
        ids.insert(id);
    }
    Ok(ids)
}

/// Read and parse the profile log at `path`; a missing log is a configuration error.
pub fn load_profile(path: &Path) -> StoreResult<ExecutedIdSet> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(StoreError::MissingProfile(path.to_path_buf()))
        }
        Err(e) => return Err(StoreError::io(path, e)),
    };
    parse_profile(&text, path)
}

/// Render ids in the profile-log format, ascending, one per line.
pub fn render_profile(ids: impl IntoIterator<Item = CoverageId>) -> String {
    let sorted: BTreeSet<CoverageId> = ids.into_iter().collect();
    sorted.iter().map(|id| format!("{id}\n")).collect()
}
