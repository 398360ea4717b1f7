/// Resolver: one recursive instantiation pass over a template tree.

use rand::Rng;
use rustc_hash::FxHashSet;

use crate::core::error::ComposeError;
use crate::core::registry::{Catalog, CatalogEntry};
use crate::core::template::CompositeTemplate;
use crate::schema::component::{Component, LeafComponent};

/// The flattened result of one instantiation pass: leaf components only,
/// mandatory slots first, then one contribution per included group.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedEntity {
    pub template: String,
    pub components: Vec<LeafComponent>,
}

impl MaterializedEntity {
    pub fn ids(&self) -> Vec<&str> {
        self.components.iter().map(|c| c.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LeafComponent> {
        self.components.iter()
    }
}

impl IntoIterator for MaterializedEntity {
    type Item = LeafComponent;
    type IntoIter = std::vec::IntoIter<LeafComponent>;

    fn into_iter(self) -> Self::IntoIter {
        self.components.into_iter()
    }
}

/// Walks templates against a catalog, tracking the active path so a
/// template that (transitively) refers to itself fails with
/// `CycleDetected` instead of recursing forever.
///
/// Only registry names go on the path. Inline composites are owned,
/// finite trees, so a loop always passes through a `Ref`; an inline
/// template may share a name with its parent. Reaching the same
/// template through two sibling branches is fine; only re-entering one
/// that is still being expanded is a cycle.
pub struct Resolver<'a> {
    catalog: &'a Catalog,
    path: Vec<String>,
    active: FxHashSet<String>,
}

impl<'a> Resolver<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self {
            catalog,
            path: Vec::new(),
            active: FxHashSet::default(),
        }
    }

    /// Look up `name` and instantiate it.
    pub fn instantiate_named<R: Rng + ?Sized>(
        &mut self,
        name: &str,
        rng: &mut R,
    ) -> Result<MaterializedEntity, ComposeError> {
        let catalog = self.catalog;
        let template = catalog.template(name)?;
        self.reset();
        let mut components = Vec::new();
        self.expand_registered(name, template, rng, &mut components)?;
        Ok(MaterializedEntity {
            template: template.name.clone(),
            components,
        })
    }

    /// Instantiate a template value. The template itself is not tracked
    /// as a registry entry, even if one with the same name exists.
    pub fn instantiate<R: Rng + ?Sized>(
        &mut self,
        template: &CompositeTemplate,
        rng: &mut R,
    ) -> Result<MaterializedEntity, ComposeError> {
        self.reset();
        let mut components = Vec::new();
        self.expand_template(template, rng, &mut components)?;
        Ok(MaterializedEntity {
            template: template.name.clone(),
            components,
        })
    }

    fn reset(&mut self) {
        self.path.clear();
        self.active.clear();
    }

    fn expand_registered<R: Rng + ?Sized>(
        &mut self,
        name: &str,
        template: &CompositeTemplate,
        rng: &mut R,
        out: &mut Vec<LeafComponent>,
    ) -> Result<(), ComposeError> {
        if !self.active.insert(name.to_string()) {
            let mut path = self.path.clone();
            path.push(name.to_string());
            return Err(ComposeError::CycleDetected {
                name: name.to_string(),
                path,
            });
        }
        self.path.push(name.to_string());

        self.expand_template(template, rng, out)?;

        self.path.pop();
        self.active.remove(name);
        Ok(())
    }

    fn expand_template<R: Rng + ?Sized>(
        &mut self,
        template: &CompositeTemplate,
        rng: &mut R,
        out: &mut Vec<LeafComponent>,
    ) -> Result<(), ComposeError> {
        for component in template.mandatory.iter().flatten() {
            self.expand_component(component, rng, out)?;
        }

        for group in &template.groups {
            if let Some(component) = group.select(rng)? {
                self.expand_component(component, rng, out)?;
            }
        }
        Ok(())
    }

    fn expand_component<R: Rng + ?Sized>(
        &mut self,
        component: &Component,
        rng: &mut R,
        out: &mut Vec<LeafComponent>,
    ) -> Result<(), ComposeError> {
        let catalog = self.catalog;
        match component {
            Component::Leaf(leaf) => out.push(leaf.clone()),
            Component::Composite(template) => self.expand_template(template, rng, out)?,
            Component::Ref(name) => match catalog.lookup(name)? {
                CatalogEntry::Leaf(leaf) => out.push(leaf.clone()),
                CatalogEntry::Template(template) => {
                    self.expand_registered(name, template, rng, out)?
                }
            },
        }
        Ok(())
    }
}
