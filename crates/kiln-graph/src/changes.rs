//! Change detection between two builds of the same bundle.
//!
//! A [`ModuleSnapshot`] records the BLAKE3 hash of every emitted module plus
//! the entry module's own import list. Comparing two snapshots yields either
//! the set of modules a running client must replace, or a deterministic
//! decision that the page has to reload.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::module_graph::{ModuleGraph, ModuleId};

/// BLAKE3 hash of a module's emitted code.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn of(bytes: impl AsRef<[u8]>) -> Self {
        Self(*blake3::hash(bytes.as_ref()).as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        blake3::Hash::from_bytes(self.0).to_hex().to_string()
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..12])
    }
}

/// Hashes of one build of a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSnapshot {
    entry: ModuleId,
    entry_dependencies: Vec<ModuleId>,
    hashes: BTreeMap<ModuleId, ContentHash>,
}

impl ModuleSnapshot {
    pub fn new(
        entry: ModuleId,
        entry_dependencies: Vec<ModuleId>,
        hashes: BTreeMap<ModuleId, ContentHash>,
    ) -> Self {
        Self {
            entry,
            entry_dependencies,
            hashes,
        }
    }

    /// Snapshot `graph` given the emitted code of each module.
    ///
    /// Returns `None` when the graph has no entry.
    pub fn from_graph<'a, I>(graph: &ModuleGraph, code: I) -> Option<Self>
    where
        I: IntoIterator<Item = (&'a ModuleId, &'a str)>,
    {
        let entry = graph.entry()?.clone();
        let entry_dependencies = graph.dependencies(&entry).to_vec();
        let hashes = code
            .into_iter()
            .map(|(id, code)| (id.clone(), ContentHash::of(code)))
            .collect();
        Some(Self::new(entry, entry_dependencies, hashes))
    }

    pub fn entry(&self) -> &ModuleId {
        &self.entry
    }

    pub fn entry_dependencies(&self) -> &[ModuleId] {
        &self.entry_dependencies
    }

    pub fn hash(&self, id: &ModuleId) -> Option<&ContentHash> {
        self.hashes.get(id)
    }

    pub fn modules(&self) -> impl Iterator<Item = &ModuleId> {
        self.hashes.keys()
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

/// Modules that differ between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Present in both, content hash changed
    pub modified: BTreeSet<ModuleId>,
    /// Only present in the newer snapshot
    pub added: BTreeSet<ModuleId>,
    /// Only present in the older snapshot
    pub removed: BTreeSet<ModuleId>,
}

impl ChangeSet {
    pub fn has_changes(&self) -> bool {
        !self.modified.is_empty() || !self.added.is_empty() || !self.removed.is_empty()
    }

    /// Modules a client has to (re)load: modified and added, sorted.
    pub fn changed(&self) -> Vec<ModuleId> {
        self.modified.union(&self.added).cloned().collect()
    }
}

/// Compare per-module hashes of two snapshots.
pub fn detect_changes(previous: &ModuleSnapshot, current: &ModuleSnapshot) -> ChangeSet {
    let mut changes = ChangeSet::default();

    for (id, hash) in &current.hashes {
        match previous.hashes.get(id) {
            Some(old) if old != hash => {
                changes.modified.insert(id.clone());
            }
            Some(_) => {}
            None => {
                changes.added.insert(id.clone());
            }
        }
    }

    changes.removed = previous
        .hashes
        .keys()
        .filter(|id| !current.hashes.contains_key(*id))
        .cloned()
        .collect();

    changes
}

/// Why an update cannot be applied module by module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadReason {
    /// The bundle's entry module is a different module
    EntryChanged,
    /// The entry module's own code changed
    EntryModified,
    /// The entry module imports a different list of modules
    EntryDependenciesChanged,
    /// The older revision is no longer retained
    RevisionUnavailable,
}

impl fmt::Display for ReloadReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReloadReason::EntryChanged => f.write_str("entry module changed"),
            ReloadReason::EntryModified => f.write_str("entry module code changed"),
            ReloadReason::EntryDependenciesChanged => {
                f.write_str("entry module imports changed")
            }
            ReloadReason::RevisionUnavailable => f.write_str("revision no longer retained"),
        }
    }
}

/// What a client on `previous` needs to reach `current`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdatePlan {
    Unchanged,
    Modules {
        changed: Vec<ModuleId>,
        removed: Vec<ModuleId>,
    },
    FullReload(ReloadReason),
}

/// Decide how to move a client from `previous` to `current`.
///
/// The result depends only on the two snapshots.
pub fn plan_update(previous: &ModuleSnapshot, current: &ModuleSnapshot) -> UpdatePlan {
    if previous.entry != current.entry {
        return UpdatePlan::FullReload(ReloadReason::EntryChanged);
    }
    if previous.entry_dependencies != current.entry_dependencies {
        return UpdatePlan::FullReload(ReloadReason::EntryDependenciesChanged);
    }
    // Nothing above the entry can accept its update.
    if previous.hashes.get(&previous.entry) != current.hashes.get(&current.entry) {
        return UpdatePlan::FullReload(ReloadReason::EntryModified);
    }

    let changes = detect_changes(previous, current);
    if !changes.has_changes() {
        return UpdatePlan::Unchanged;
    }

    UpdatePlan::Modules {
        changed: changes.changed(),
        removed: changes.removed.into_iter().collect(),
    }
}
