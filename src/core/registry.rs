/// Template registry: the name → template/leaf catalog, its duplicate
/// policy, RON loading, and the lock-guarded shared snapshot.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

use crate::core::selection::{Rebalance, SelectionError, WeightedGroup, WeightedOption};
use crate::core::template::CompositeTemplate;
use crate::schema::component::{Component, LeafComponent, Value};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no catalog entry named '{0}'")]
    NotFound(String),
    #[error("a catalog entry named '{0}' already exists")]
    DuplicateName(String),
    #[error("catalog entry '{0}' is a leaf component, not a template")]
    NotATemplate(String),
    #[error("template '{template}' has no group at index {index}")]
    GroupOutOfRange { template: String, index: usize },
    #[error("selection error: {0}")]
    Selection(#[from] SelectionError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// What happens when a name is registered twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DuplicatePolicy {
    /// Fail with `DuplicateName` and leave the existing entry alone.
    #[default]
    Reject,
    /// Overwrite the existing entry.
    Replace,
    /// Store under `"<name> <n>"` with the smallest free `n >= 1`.
    VersionSuffix,
}

/// A named catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CatalogEntry {
    Template(CompositeTemplate),
    Leaf(LeafComponent),
}

impl CatalogEntry {
    pub fn as_template(&self) -> Option<&CompositeTemplate> {
        match self {
            Self::Template(t) => Some(t),
            Self::Leaf(_) => None,
        }
    }

    pub fn as_leaf(&self) -> Option<&LeafComponent> {
        match self {
            Self::Leaf(l) => Some(l),
            Self::Template(_) => None,
        }
    }

    fn rename(&mut self, name: &str) {
        match self {
            Self::Template(t) => t.name = name.to_string(),
            Self::Leaf(l) => l.id = name.to_string(),
        }
    }
}

impl From<CompositeTemplate> for CatalogEntry {
    fn from(template: CompositeTemplate) -> Self {
        Self::Template(template)
    }
}

impl From<LeafComponent> for CatalogEntry {
    fn from(leaf: LeafComponent) -> Self {
        Self::Leaf(leaf)
    }
}

/// The owned catalog. Holds the canonical copy of every named entry.
///
/// A stored entry's own name (template name or leaf id) always equals
/// the key it is stored under.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: FxHashMap<String, CatalogEntry>,
    policy: DuplicatePolicy,
}

// RON deserialization helpers. Entries are keyed by name in the file,
// so the name is not repeated inside each entry.

#[derive(Debug, Deserialize)]
enum RonEntry {
    Template {
        #[serde(default)]
        mandatory: Vec<Option<Component>>,
        #[serde(default)]
        groups: Vec<WeightedGroup>,
    },
    Leaf {
        #[serde(default)]
        tags: Vec<String>,
        #[serde(default)]
        properties: HashMap<String, Value>,
    },
}

/// A catalog document in file order. Deserialized through a map visitor
/// that keeps every pair, so a name written twice reaches `register`
/// twice instead of being collapsed by the map.
struct RonCatalog(Vec<(String, RonEntry)>);

impl<'de> Deserialize<'de> for RonCatalog {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::{MapAccess, Visitor};

        struct RonCatalogVisitor;

        impl<'de> Visitor<'de> for RonCatalogVisitor {
            type Value = RonCatalog;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map of catalog entries keyed by name")
            }

            fn visit_map<M>(self, mut map: M) -> Result<RonCatalog, M::Error>
            where
                M: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((name, entry)) = map.next_entry::<String, RonEntry>()? {
                    entries.push((name, entry));
                }
                Ok(RonCatalog(entries))
            }
        }

        deserializer.deserialize_map(RonCatalogVisitor)
    }
}

impl RonEntry {
    fn into_entry(self, name: &str) -> CatalogEntry {
        match self {
            RonEntry::Template { mandatory, groups } => CatalogEntry::Template(CompositeTemplate {
                name: name.to_string(),
                mandatory,
                groups,
            }),
            RonEntry::Leaf { tags, properties } => CatalogEntry::Leaf(LeafComponent {
                id: name.to_string(),
                tags: tags.into_iter().collect(),
                properties,
            }),
        }
    }
}

impl Catalog {
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self {
            entries: FxHashMap::default(),
            policy,
        }
    }

    pub fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: DuplicatePolicy) {
        self.policy = policy;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Register an entry under `name`, applying the duplicate policy.
    ///
    /// Returns the name the entry was actually stored under.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        entry: impl Into<CatalogEntry>,
    ) -> Result<String, RegistryError> {
        let name = name.into();
        let mut entry = entry.into();

        let stored = if !self.entries.contains_key(&name) {
            name
        } else {
            match self.policy {
                DuplicatePolicy::Reject => return Err(RegistryError::DuplicateName(name)),
                DuplicatePolicy::Replace => {
                    tracing::debug!(name = %name, "replacing catalog entry");
                    name
                }
                DuplicatePolicy::VersionSuffix => {
                    let mut n = 1u64;
                    let versioned = loop {
                        let candidate = format!("{} {}", name, n);
                        if !self.entries.contains_key(&candidate) {
                            break candidate;
                        }
                        n += 1;
                    };
                    tracing::debug!(name = %versioned, "registered under versioned name");
                    versioned
                }
            }
        };

        entry.rename(&stored);
        tracing::debug!(name = %stored, "registered catalog entry");
        self.entries.insert(stored.clone(), entry);
        Ok(stored)
    }

    /// Register a template under its own name.
    pub fn register_template(&mut self, template: CompositeTemplate) -> Result<String, RegistryError> {
        let name = template.name.clone();
        self.register(name, template)
    }

    /// Register a leaf under its own id.
    pub fn register_leaf(&mut self, leaf: LeafComponent) -> Result<String, RegistryError> {
        let name = leaf.id.clone();
        self.register(name, leaf)
    }

    /// Register a fresh template with no slots and no groups.
    pub fn create_empty(&mut self, name: impl Into<String>) -> Result<String, RegistryError> {
        self.register_template(CompositeTemplate::empty(name))
    }

    pub fn lookup(&self, name: &str) -> Result<&CatalogEntry, RegistryError> {
        self.entries
            .get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn template(&self, name: &str) -> Result<&CompositeTemplate, RegistryError> {
        self.lookup(name)?
            .as_template()
            .ok_or_else(|| RegistryError::NotATemplate(name.to_string()))
    }

    /// Mutable access to a registered template, for setup-time edits.
    pub fn template_mut(&mut self, name: &str) -> Result<&mut CompositeTemplate, RegistryError> {
        match self.entries.get_mut(name) {
            Some(CatalogEntry::Template(t)) => Ok(t),
            Some(CatalogEntry::Leaf(_)) => Err(RegistryError::NotATemplate(name.to_string())),
            None => Err(RegistryError::NotFound(name.to_string())),
        }
    }

    /// Clone a registered template under a new name without registering
    /// the copy. The canonical entry is never touched.
    pub fn derive(&self, base: &str, name: impl Into<String>) -> Result<CompositeTemplate, RegistryError> {
        Ok(self.template(base)?.derive_from(name))
    }

    /// Every registered name, sorted.
    pub fn list_all(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    /// Registered names ending with `suffix`, sorted. Extensions use this
    /// to discover families such as every `*Quests` template.
    pub fn names_with_suffix(&self, suffix: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .keys()
            .filter(|name| name.ends_with(suffix))
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CatalogEntry)> {
        self.entries.iter()
    }

    /// Add an option to group `group_index` of a registered template
    /// under the given rebalancing policy. Returns the stored weight.
    pub fn add_to_group(
        &mut self,
        target: &str,
        group_index: usize,
        option: WeightedOption,
        policy: Rebalance,
    ) -> Result<f64, RegistryError> {
        let template = self.template_mut(target)?;
        let group = template
            .groups
            .get_mut(group_index)
            .ok_or_else(|| RegistryError::GroupOutOfRange {
                template: target.to_string(),
                index: group_index,
            })?;
        Ok(group.add_option_preserving_ratios(option, policy)?)
    }

    /// Register every entry of `other` into `self` under this catalog's
    /// policy, in name order. Returns the stored names.
    pub fn merge(&mut self, other: Catalog) -> Result<Vec<String>, RegistryError> {
        let ordered: BTreeMap<String, CatalogEntry> = other.entries.into_iter().collect();
        let mut stored = Vec::with_capacity(ordered.len());
        for (name, entry) in ordered {
            stored.push(self.register(name, entry)?);
        }
        Ok(stored)
    }

    /// Load a catalog from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<Catalog, RegistryError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse a catalog from a RON string.
    ///
    /// A name defined twice in one document is always `DuplicateName`;
    /// the duplicate policy applies when documents are merged. Every
    /// inclusion chance is checked here so a bad file fails at setup.
    pub fn parse_ron(input: &str) -> Result<Catalog, RegistryError> {
        let RonCatalog(raw) = ron::from_str(input)?;
        let mut catalog = Catalog::new(DuplicatePolicy::Reject);
        for (name, ron_entry) in raw {
            let entry = ron_entry.into_entry(&name);
            if let CatalogEntry::Template(template) = &entry {
                template.validate_inclusion_chances()?;
            }
            catalog.register(name, entry)?;
        }
        Ok(catalog)
    }
}

/// Shared, lock-guarded registry for the steady-state phase.
///
/// Readers take an `Arc` snapshot and resolve against it with no lock
/// held. Writers edit a private copy and publish it in one swap, so a
/// resolver never observes a half-applied change.
#[derive(Debug, Default)]
pub struct TemplateRegistry {
    current: RwLock<Arc<Catalog>>,
}

impl TemplateRegistry {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            current: RwLock::new(Arc::new(catalog)),
        }
    }

    /// The catalog as of now. Later writes do not affect it.
    pub fn snapshot(&self) -> Arc<Catalog> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Apply `f` to a copy of the catalog and publish it if `f` succeeds.
    /// On error nothing is published.
    pub fn update<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Catalog) -> Result<T, E>,
    {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = Catalog::clone(&guard);
        let out = f(&mut next)?;
        *guard = Arc::new(next);
        Ok(out)
    }

    pub fn register(
        &self,
        name: impl Into<String>,
        entry: impl Into<CatalogEntry>,
    ) -> Result<String, RegistryError> {
        let name = name.into();
        let entry = entry.into();
        self.update(|catalog| catalog.register(name, entry))
    }

    pub fn lookup(&self, name: &str) -> Result<CatalogEntry, RegistryError> {
        self.snapshot().lookup(name).cloned()
    }

    pub fn list_all(&self) -> Vec<String> {
        self.snapshot().list_all()
    }
}
