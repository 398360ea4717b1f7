/// Composite templates: mandatory slots plus weighted groups.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::core::error::ComposeError;
use crate::core::registry::Catalog;
use crate::core::resolver::{MaterializedEntity, Resolver};
use crate::core::selection::{SelectionError, WeightedGroup};
use crate::schema::component::Component;

/// A named entity: every filled mandatory slot is always emitted, and
/// each group contributes at most one more component.
///
/// Slots are positional. Overwriting slot `i` of a derived copy is how
/// a variant replaces what it inherited from its base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeTemplate {
    pub name: String,
    #[serde(default)]
    pub mandatory: Vec<Option<Component>>,
    #[serde(default)]
    pub groups: Vec<WeightedGroup>,
}

impl CompositeTemplate {
    /// A template with no slots and no groups.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mandatory: Vec::new(),
            groups: Vec::new(),
        }
    }

    /// A template with `count` unset mandatory slots.
    pub fn with_slots(name: impl Into<String>, count: usize) -> Self {
        Self {
            name: name.into(),
            mandatory: vec![None; count],
            groups: Vec::new(),
        }
    }

    pub fn with_mandatory(mut self, component: impl Into<Component>) -> Self {
        self.mandatory.push(Some(component.into()));
        self
    }

    pub fn with_group(mut self, group: WeightedGroup) -> Self {
        self.groups.push(group);
        self
    }

    /// Deep copy under a new name.
    ///
    /// The copy owns all of its slots and groups; nothing is shared with
    /// `self` or with any other derivation.
    pub fn derive_from(&self, name: impl Into<String>) -> Self {
        let mut derived = self.clone();
        derived.name = name.into();
        derived
    }

    pub fn slot(&self, index: usize) -> Option<&Component> {
        self.mandatory.get(index).and_then(Option::as_ref)
    }

    /// Overwrite a mandatory slot, returning what it held before.
    pub fn set_slot(
        &mut self,
        index: usize,
        component: impl Into<Component>,
    ) -> Result<Option<Component>, ComposeError> {
        let len = self.mandatory.len();
        let slot = self
            .mandatory
            .get_mut(index)
            .ok_or_else(|| ComposeError::SlotOutOfRange {
                template: self.name.clone(),
                slot: index,
                len,
            })?;
        Ok(slot.replace(component.into()))
    }

    /// Empty a mandatory slot, returning what it held before.
    pub fn clear_slot(&mut self, index: usize) -> Result<Option<Component>, ComposeError> {
        let len = self.mandatory.len();
        let slot = self
            .mandatory
            .get_mut(index)
            .ok_or_else(|| ComposeError::SlotOutOfRange {
                template: self.name.clone(),
                slot: index,
                len,
            })?;
        Ok(slot.take())
    }

    /// Change the fixed slot count. New slots start unset; shrinking
    /// drops the trailing slots.
    pub fn resize_slots(&mut self, count: usize) {
        self.mandatory.resize(count, None);
    }

    pub fn group(&self, label: &str) -> Option<&WeightedGroup> {
        self.groups.iter().find(|g| g.label == label)
    }

    pub fn group_mut(&mut self, label: &str) -> Option<&mut WeightedGroup> {
        self.groups.iter_mut().find(|g| g.label == label)
    }

    /// Check the inclusion chance of every group, including those of
    /// inline templates in slots and options.
    pub fn validate_inclusion_chances(&self) -> Result<(), SelectionError> {
        let slots = self.mandatory.iter().flatten();
        let options = self.groups.iter().flat_map(|g| g.options.iter().map(|o| &o.component));
        for group in &self.groups {
            group.validate_inclusion_chance()?;
        }
        for component in slots.chain(options) {
            if let Component::Composite(inner) = component {
                inner.validate_inclusion_chances()?;
            }
        }
        Ok(())
    }

    /// Run one instantiation pass against a catalog.
    pub fn instantiate<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        catalog: &Catalog,
    ) -> Result<MaterializedEntity, ComposeError> {
        Resolver::new(catalog).instantiate(self, rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::component::LeafComponent;

    fn citizen() -> CompositeTemplate {
        CompositeTemplate::with_slots("CitizenMTemplate 1", 2)
            .with_group(WeightedGroup::new("Faces").with_option(Component::leaf("face_1"), 1.0))
    }

    #[test]
    fn empty_template_has_nothing() {
        let t = CompositeTemplate::empty("GroundhogDayHunterContainer");
        assert!(t.mandatory.is_empty());
        assert!(t.groups.is_empty());
    }

    #[test]
    fn set_slot_replaces_and_returns_previous() {
        let mut t = citizen();
        assert_eq!(t.set_slot(0, Component::leaf("citizen_prefab")).unwrap(), None);
        let previous = t.set_slot(0, Component::leaf("hunter_prefab")).unwrap();
        assert_eq!(previous, Some(Component::leaf("citizen_prefab")));
        assert_eq!(t.slot(0), Some(&Component::leaf("hunter_prefab")));
        assert_eq!(t.mandatory.len(), 2);
    }

    #[test]
    fn set_slot_out_of_range_errors() {
        let mut t = citizen();
        let err = t.set_slot(5, Component::leaf("x")).unwrap_err();
        assert!(matches!(
            err,
            ComposeError::SlotOutOfRange { slot: 5, len: 2, .. }
        ));
    }

    #[test]
    fn clear_and_resize_slots() {
        let mut t = citizen();
        t.set_slot(1, Component::reference("CitizenQuests")).unwrap();
        assert_eq!(t.clear_slot(1).unwrap(), Some(Component::reference("CitizenQuests")));
        assert_eq!(t.slot(1), None);

        t.resize_slots(4);
        assert_eq!(t.mandatory.len(), 4);
        t.set_slot(3, Component::leaf("extra")).unwrap();
        t.resize_slots(1);
        assert_eq!(t.mandatory.len(), 1);
    }

    #[test]
    fn derive_does_not_alias_base_or_siblings() {
        let mut base = citizen();
        base.set_slot(0, Component::leaf("citizen_prefab")).unwrap();

        let mut male = base.derive_from("HunterMTemplate");
        let female = base.derive_from("HunterFTemplate");

        male.set_slot(0, Component::leaf("hunter_prefab")).unwrap();
        male.groups[0]
            .options
            .push(crate::core::selection::WeightedOption::new(
                LeafComponent::new("scar"),
                1.0,
            ));

        assert_eq!(base.slot(0), Some(&Component::leaf("citizen_prefab")));
        assert_eq!(female.slot(0), Some(&Component::leaf("citizen_prefab")));
        assert_eq!(base.groups[0].options.len(), 1);
        assert_eq!(female.groups[0].options.len(), 1);
        assert_eq!(male.name, "HunterMTemplate");
        assert_eq!(base.name, "CitizenMTemplate 1");
    }

    #[test]
    fn derive_after_mutation_sees_current_base() {
        let mut base = citizen();
        let early = base.derive_from("early");
        base.set_slot(0, Component::leaf("updated")).unwrap();
        let late = base.derive_from("late");
        assert_eq!(early.slot(0), None);
        assert_eq!(late.slot(0), Some(&Component::leaf("updated")));
    }

    #[test]
    fn group_lookup_by_label() {
        let mut t = citizen();
        assert!(t.group("Faces").is_some());
        assert!(t.group("Hats").is_none());
        t.group_mut("Faces").unwrap().inclusion_chance = 0.5;
        assert_eq!(t.groups[0].inclusion_chance, 0.5);
    }
}
