use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::layout::OutputLayout;
use super::{StoreError, StoreResult};
use crate::model::{BaseId, Module};

/// Function name -> base id for one module, as persisted in `{key}.bc.id`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdMapping {
    entries: BTreeMap<String, BaseId>,
}

impl IdMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a function's base id, returning the previous one if any.
    pub fn insert(&mut self, function: impl Into<String>, base: BaseId) -> Option<BaseId> {
        self.entries.insert(function.into(), base)
    }

    /// Base id for `function`, or `None` when it was never assigned one
    /// (e.g. it appeared after assignment through inlining or specialization).
    /// Callers must skip such functions rather than substitute a default.
    pub fn resolve(&self, function: &str) -> Option<BaseId> {
        self.entries.get(function).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, BaseId)> {
        self.entries.iter().map(|(name, base)| (name.as_str(), *base))
    }

    /// Parse the id-file format: one `functionName baseId` per line.
    ///
    /// Blank lines are ignored. Anything else that does not parse, including a
    /// repeated function name, is a `MalformedRecord`; `source` only labels
    /// the error.
    pub fn parse(text: &str, source: &Path) -> StoreResult<Self> {
        let mut mapping = IdMapping::new();
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            let malformed = |reason: String| StoreError::MalformedRecord {
                path: source.to_path_buf(),
                line: idx + 1,
                reason,
            };
            let (name, id) = line
                .rsplit_once(' ')
                .ok_or_else(|| malformed(format!("expected `<function> <id>`, got `{line}`")))?;
            if name.is_empty() {
                return Err(malformed("empty function name".into()));
            }
            if !id.starts_with(|c: char| c.is_ascii_digit()) {
                return Err(malformed(format!("invalid id `{id}`: expected decimal digits")));
            }
            let base: BaseId =
                id.parse().map_err(|e| malformed(format!("invalid id `{id}`: {e}")))?;
            if mapping.insert(name, base).is_some() {
                return Err(malformed(format!("function `{name}` listed twice")));
            }
        }
        Ok(mapping)
    }

    /// Render in the id-file format, ordered by base id.
    pub fn to_file_string(&self) -> String {
        let mut rows: Vec<(&str, BaseId)> = self.iter().collect();
        rows.sort_by_key(|(name, base)| (*base, *name));
        rows.iter().map(|(name, base)| format!("{name} {base}\n")).collect()
    }

    /// True if `name` survives a round trip through the id-file format.
    /// Unnamed functions and names spanning lines cannot be recorded.
    pub fn is_recordable_name(name: &str) -> bool {
        !name.is_empty() && !name.contains('\n')
    }

    /// Give every function with a body a contiguous range starting at `start`,
    /// in module order. Returns the mapping and the first id left unused.
    ///
    /// Functions whose name cannot be recorded get no range; later phases
    /// treat them like any other function missing from the mapping.
    pub fn allocate(module: &Module, start: BaseId) -> StoreResult<(Self, BaseId)> {
        let mut mapping = IdMapping::new();
        let mut next = start;
        for function in module.functions.iter().filter(|f| f.has_body()) {
            if !Self::is_recordable_name(&function.name) {
                warn!(module = %module.path, function = ?function.name, "function name cannot be recorded in an identifier file; no ids assigned");
                continue;
            }
            if mapping.resolve(&function.name).is_some() {
                debug!(module = %module.path, function = %function.name, "duplicate function name; keeping first");
                continue;
            }
            let count = BaseId::try_from(function.blocks.len()).ok();
            let end = count.and_then(|c| next.checked_add(c)).ok_or_else(|| {
                StoreError::IdSpaceExhausted {
                    module: module.path.clone(),
                    function: function.name.clone(),
                }
            })?;
            mapping.insert(function.name.clone(), next);
            next = end;
        }
        Ok((mapping, next))
    }

    /// Pairs of functions in `module` whose `[base, base + blocks)` ranges
    /// intersect. Empty for a well-formed mapping.
    pub fn overlaps(&self, module: &Module) -> Vec<(String, String)> {
        let mut ranges: Vec<(u64, u64, &str)> = module
            .functions
            .iter()
            .filter(|f| f.has_body())
            .filter_map(|f| {
                let base = u64::from(self.resolve(&f.name)?);
                Some((base, base + f.blocks.len() as u64, f.name.as_str()))
            })
            .collect();
        ranges.sort();

        let mut found = Vec::new();
        let mut widest: Option<(u64, &str)> = None;
        for (start, end, name) in ranges {
            if let Some((reach, owner)) = widest {
                if start < reach {
                    found.push((owner.to_string(), name.to_string()));
                }
                if end > reach {
                    widest = Some((end, name));
                }
            } else {
                widest = Some((end, name));
            }
        }
        found
    }
}

/// Persistent (module key -> id mapping) storage.
///
/// Precondition: each key has one writer, and that writer runs before any
/// reader. `create` refuses to overwrite so a second writer fails loudly.
pub trait IdentifierStore {
    /// Mapping for `key`, or `None` if it was never created.
    fn load(&self, key: &str) -> StoreResult<Option<IdMapping>>;

    /// Persist the mapping for `key`; errors if one already exists.
    fn create(&self, key: &str, mapping: &IdMapping) -> StoreResult<()>;
}

/// Identifier store backed by `{out_dir}/{key}.bc.id` files.
#[derive(Debug, Clone)]
pub struct FsIdStore {
    layout: OutputLayout,
}

impl FsIdStore {
    pub fn new(layout: OutputLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }
}

impl IdentifierStore for FsIdStore {
    fn load(&self, key: &str) -> StoreResult<Option<IdMapping>> {
        let path = self.layout.id_file_path(key);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(path, e)),
        };
        let mapping = IdMapping::parse(&text, &path)?;
        debug!(path = %path.display(), functions = mapping.len(), "loaded identifier file");
        Ok(Some(mapping))
    }

    /// Writes a temp file in `out_dir` and moves it into place without
    /// clobbering, so a failed write never leaves a partial record behind.
    fn create(&self, key: &str, mapping: &IdMapping) -> StoreResult<()> {
        let out_dir = &self.layout.out_dir;
        fs::create_dir_all(out_dir).map_err(|e| StoreError::io(out_dir, e))?;
        let path = self.layout.id_file_path(key);
        if path.exists() {
            return Err(StoreError::IdFileExists(path));
        }

        let mut staged = NamedTempFile::new_in(out_dir).map_err(|e| StoreError::io(out_dir, e))?;
        staged
            .write_all(mapping.to_file_string().as_bytes())
            .and_then(|()| staged.flush())
            .map_err(|e| StoreError::io(staged.path(), e))?;
        match staged.persist_noclobber(&path) {
            Ok(_) => {}
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                return Err(StoreError::IdFileExists(path))
            }
            Err(e) => return Err(StoreError::io(path, e.error)),
        }
        info!(path = %path.display(), functions = mapping.len(), "wrote identifier file");
        Ok(())
    }
}

/// In-memory identifier store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryIdStore {
    mappings: RefCell<HashMap<String, IdMapping>>,
    loads: Cell<usize>,
}

impl MemoryIdStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mapping(self, key: impl Into<String>, mapping: IdMapping) -> Self {
        self.mappings.borrow_mut().insert(key.into(), mapping);
        self
    }

    /// Number of `load` calls served so far.
    pub fn load_count(&self) -> usize {
        self.loads.get()
    }
}

impl IdentifierStore for MemoryIdStore {
    fn load(&self, key: &str) -> StoreResult<Option<IdMapping>> {
        self.loads.set(self.loads.get() + 1);
        Ok(self.mappings.borrow().get(key).cloned())
    }

    fn create(&self, key: &str, mapping: &IdMapping) -> StoreResult<()> {
        let mut mappings = self.mappings.borrow_mut();
        if mappings.contains_key(key) {
            return Err(StoreError::IdFileExists(format!("memory:{key}").into()));
        }
        mappings.insert(key.to_string(), mapping.clone());
        Ok(())
    }
}

/// External id-assignment phase: allocate disjoint ranges for a batch of
/// modules, in order, starting at `start`, and create each module's record.
///
/// Returns the first id left unused so a later batch can continue from it.
pub fn assign_ids(
    store: &dyn IdentifierStore,
    modules: &[Module],
    start: BaseId,
) -> StoreResult<BaseId> {
    let mut next = start;
    for module in modules {
        let (mapping, after) = IdMapping::allocate(module, next)?;
        if mapping.is_empty() {
            debug!(module = %module.path, "no instrumentable functions; no identifier file");
            continue;
        }
        store.create(&super::canonicalize(&module.path), &mapping)?;
        next = after;
    }
    Ok(next)
}
