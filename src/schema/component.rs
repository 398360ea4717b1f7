use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core::template::CompositeTemplate;

/// A dynamic value that can be stored in leaf component properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    String(String),
    Float(f64),
    Int(i64),
    Bool(bool),
}

/// A leaf component is the unit the host spawns: a prefab, a quest,
/// a face, a haggling bonus.
///
/// The engine does not interpret tags or properties; it only carries
/// them through to the materialized entity. Identity is the `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafComponent {
    pub id: String,
    #[serde(default)]
    pub tags: FxHashSet<String>,
    #[serde(default)]
    pub properties: HashMap<String, Value>,
}

impl LeafComponent {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tags: FxHashSet::default(),
            properties: HashMap::new(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Returns true if this component has the given tag.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Returns true if this component has ALL of the given tags.
    pub fn has_all_tags(&self, tags: &[&str]) -> bool {
        tags.iter().all(|tag| self.tags.contains(*tag))
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}

/// Anything that can fill a mandatory slot or a weighted option.
///
/// Templates nest as components of other templates; the resolver walks
/// this union with an exhaustive match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Component {
    /// An opaque payload, emitted as-is.
    Leaf(LeafComponent),
    /// An inline template owned by its parent, instantiated recursively.
    Composite(Box<CompositeTemplate>),
    /// A registry entry looked up by name at instantiation time.
    Ref(String),
}

impl Component {
    pub fn leaf(id: impl Into<String>) -> Self {
        Self::Leaf(LeafComponent::new(id))
    }

    pub fn composite(template: CompositeTemplate) -> Self {
        Self::Composite(Box::new(template))
    }

    pub fn reference(name: impl Into<String>) -> Self {
        Self::Ref(name.into())
    }
}

impl From<LeafComponent> for Component {
    fn from(leaf: LeafComponent) -> Self {
        Self::Leaf(leaf)
    }
}

impl From<CompositeTemplate> for Component {
    fn from(template: CompositeTemplate) -> Self {
        Self::Composite(Box::new(template))
    }
}
