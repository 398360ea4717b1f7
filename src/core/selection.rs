/// Weighted groups: inclusion gating, roulette selection, rebalancing.

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::component::Component;

#[derive(Debug, Error, PartialEq)]
pub enum SelectionError {
    #[error("group '{label}' has no positive total weight (total = {total})")]
    InvalidWeight { label: String, total: f64 },
    #[error("group '{label}' has inclusion chance {chance} outside [0, 1]")]
    InvalidInclusionChance { label: String, chance: f64 },
    #[error("target share {0} is outside the open interval (0, 1)")]
    InvalidShare(f64),
}

/// A single candidate with a weight relative to its siblings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedOption {
    pub component: Component,
    pub weight: f64,
}

impl WeightedOption {
    pub fn new(component: impl Into<Component>, weight: f64) -> Self {
        Self {
            component: component.into(),
            weight,
        }
    }
}

fn default_inclusion_chance() -> f64 {
    1.0
}

/// A set of mutually exclusive options. Each resolution pass picks at
/// most one of them, and only if the group passes its inclusion roll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedGroup {
    /// Diagnostic label only; never consulted during selection.
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub options: Vec<WeightedOption>,
    #[serde(default = "default_inclusion_chance")]
    pub inclusion_chance: f64,
}

/// How `add_option_preserving_ratios` sizes the incoming option.
///
/// No policy ever rewrites the weights already in the group, so the
/// pre-existing options always keep their ratios to one another.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rebalance {
    /// Append the option with its own weight. Everyone else's absolute
    /// share shrinks by the same factor.
    Additive,
    /// Size the option so it is picked with this absolute probability
    /// (given the group is included).
    TargetShare(f64),
    /// Give the option an equal `1 / (n + 1)` share.
    EvenShare,
}

impl WeightedGroup {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            options: Vec::new(),
            inclusion_chance: 1.0,
        }
    }

    pub fn with_inclusion_chance(mut self, chance: f64) -> Self {
        self.inclusion_chance = chance;
        self
    }

    pub fn with_option(mut self, component: impl Into<Component>, weight: f64) -> Self {
        self.options.push(WeightedOption::new(component, weight));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    pub fn total_weight(&self) -> f64 {
        self.options.iter().map(|o| o.weight).sum()
    }

    /// Check that the group could select if asked to.
    ///
    /// The inclusion chance must lie in `[0, 1]`. An empty group is
    /// otherwise valid. A non-empty one needs every weight finite and
    /// non-negative, and their sum strictly positive.
    pub fn validate(&self) -> Result<(), SelectionError> {
        self.validate_inclusion_chance()?;
        self.validate_weights()
    }

    /// NaN is rejected too: it would compare as "always included".
    pub fn validate_inclusion_chance(&self) -> Result<(), SelectionError> {
        if !(0.0..=1.0).contains(&self.inclusion_chance) {
            return Err(SelectionError::InvalidInclusionChance {
                label: self.label.clone(),
                chance: self.inclusion_chance,
            });
        }
        Ok(())
    }

    fn validate_weights(&self) -> Result<(), SelectionError> {
        if self.options.is_empty() {
            return Ok(());
        }
        let total = self.total_weight();
        let bad_weight = self
            .options
            .iter()
            .any(|o| !o.weight.is_finite() || o.weight < 0.0);
        if bad_weight || !total.is_finite() || total <= 0.0 {
            return Err(SelectionError::InvalidWeight {
                label: self.label.clone(),
                total,
            });
        }
        Ok(())
    }

    /// Resolve this group to zero or one component.
    ///
    /// One draw decides inclusion, a second one spins the roulette.
    /// Weights are only checked once the group is included, so a group
    /// that is never included never fails on them. Empty groups return
    /// `None` without touching the RNG.
    pub fn select<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Result<Option<&Component>, SelectionError> {
        if self.options.is_empty() {
            return Ok(None);
        }
        self.validate_inclusion_chance()?;

        let roll: f64 = rng.gen();
        if roll >= self.inclusion_chance {
            tracing::trace!(group = %self.label, roll, "group excluded");
            return Ok(None);
        }

        self.validate_weights()?;
        let total = self.total_weight();
        let draw = rng.gen_range(0.0..total);
        let mut cumulative = 0.0;
        for option in &self.options {
            cumulative += option.weight;
            if draw < cumulative {
                tracing::trace!(group = %self.label, draw, total, "option selected");
                return Ok(Some(&option.component));
            }
        }

        // Rounding can leave the draw a hair above the running sum.
        Ok(self
            .options
            .iter()
            .rev()
            .find(|o| o.weight > 0.0)
            .map(|o| &o.component))
    }

    /// Append an option under an explicit rebalancing policy.
    ///
    /// Returns the weight the option was stored with. The existing
    /// options are left untouched; only the newcomer's weight is
    /// computed. In an empty group the option keeps its own weight.
    pub fn add_option_preserving_ratios(
        &mut self,
        mut option: WeightedOption,
        policy: Rebalance,
    ) -> Result<f64, SelectionError> {
        let existing_total = self.total_weight();

        if !self.options.is_empty() {
            let share = match policy {
                Rebalance::Additive => None,
                Rebalance::TargetShare(p) => Some(p),
                Rebalance::EvenShare => Some(1.0 / (self.options.len() as f64 + 1.0)),
            };
            if let Some(p) = share {
                if !(p > 0.0 && p < 1.0) {
                    return Err(SelectionError::InvalidShare(p));
                }
                if !(existing_total.is_finite() && existing_total > 0.0) {
                    return Err(SelectionError::InvalidWeight {
                        label: self.label.clone(),
                        total: existing_total,
                    });
                }
                option.weight = p / (1.0 - p) * existing_total;
            }
        }

        if !option.weight.is_finite() || option.weight < 0.0 {
            return Err(SelectionError::InvalidWeight {
                label: self.label.clone(),
                total: existing_total + option.weight,
            });
        }

        tracing::debug!(
            group = %self.label,
            ?policy,
            weight = option.weight,
            "added option to weighted group"
        );
        let weight = option.weight;
        self.options.push(option);
        Ok(weight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn leaf_id(component: &Component) -> &str {
        match component {
            Component::Leaf(leaf) => &leaf.id,
            _ => panic!("expected a leaf component"),
        }
    }

    fn frequencies(group: &WeightedGroup, trials: u32, seed: u64) -> Vec<(String, u32)> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut counts: Vec<(String, u32)> = group
            .options
            .iter()
            .map(|o| (leaf_id(&o.component).to_string(), 0))
            .collect();
        for _ in 0..trials {
            if let Some(c) = group.select(&mut rng).unwrap() {
                let id = leaf_id(c);
                if let Some(entry) = counts.iter_mut().find(|(k, _)| k == id) {
                    entry.1 += 1;
                }
            }
        }
        counts
    }

    #[test]
    fn empty_group_selects_nothing() {
        let group = WeightedGroup::new("Potion Orders");
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(group.select(&mut rng).unwrap(), None);
    }

    #[test]
    fn empty_group_does_not_consume_rng() {
        let group = WeightedGroup::new("empty");
        let mut a = StdRng::seed_from_u64(9);
        let mut b = StdRng::seed_from_u64(9);
        group.select(&mut a).unwrap();
        assert_eq!(a.gen::<u64>(), b.gen::<u64>());
    }

    #[test]
    fn zero_total_weight_is_invalid() {
        let group = WeightedGroup::new("broken")
            .with_option(Component::leaf("a"), 0.0)
            .with_option(Component::leaf("b"), 0.0);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            group.select(&mut rng),
            Err(SelectionError::InvalidWeight { .. })
        ));
    }

    #[test]
    fn negative_weight_is_invalid() {
        let group = WeightedGroup::new("broken")
            .with_option(Component::leaf("a"), 3.0)
            .with_option(Component::leaf("b"), -1.0);
        assert!(group.validate().is_err());
    }

    #[test]
    fn zero_inclusion_chance_never_selects() {
        let group = WeightedGroup::new("never")
            .with_inclusion_chance(0.0)
            .with_option(Component::leaf("a"), 100.0)
            .with_option(Component::leaf("b"), 1.0);
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..1000 {
            assert_eq!(group.select(&mut rng).unwrap(), None);
        }
    }

    #[test]
    fn zero_inclusion_chance_ignores_bad_weights() {
        let zero = WeightedGroup::new("g")
            .with_inclusion_chance(0.0)
            .with_option(Component::leaf("a"), 0.0);
        let negative = WeightedGroup::new("h")
            .with_inclusion_chance(0.0)
            .with_option(Component::leaf("a"), -2.0)
            .with_option(Component::leaf("b"), 1.0);
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..100 {
            assert_eq!(zero.select(&mut rng).unwrap(), None);
            assert_eq!(negative.select(&mut rng).unwrap(), None);
        }
        // Still reported up front.
        assert!(zero.validate().is_err());
    }

    #[test]
    fn out_of_range_inclusion_chance_is_rejected() {
        for chance in [f64::NAN, -0.1, 1.5] {
            let group = WeightedGroup::new("gate")
                .with_inclusion_chance(chance)
                .with_option(Component::leaf("a"), 1.0);
            let mut rng = StdRng::seed_from_u64(5);
            assert!(matches!(
                group.select(&mut rng),
                Err(SelectionError::InvalidInclusionChance { .. })
            ));
            assert!(matches!(
                group.validate(),
                Err(SelectionError::InvalidInclusionChance { .. })
            ));
        }
        let edge = WeightedGroup::new("edge")
            .with_inclusion_chance(1.0)
            .with_option(Component::leaf("a"), 1.0);
        assert!(edge.validate().is_ok());
    }

    #[test]
    fn full_inclusion_chance_always_selects() {
        let group = WeightedGroup::new("always").with_option(Component::leaf("a"), 1.0);
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..1000 {
            assert!(group.select(&mut rng).unwrap().is_some());
        }
    }

    #[test]
    fn partial_inclusion_chance_gates_roughly_proportionally() {
        let group = WeightedGroup::new("sometimes")
            .with_inclusion_chance(0.25)
            .with_option(Component::leaf("a"), 1.0);
        let mut rng = StdRng::seed_from_u64(11);
        let hits = (0..10_000)
            .filter(|_| group.select(&mut rng).unwrap().is_some())
            .count();
        assert!(
            (2_300..2_700).contains(&hits),
            "Expected ~25% inclusion, got {}/10000",
            hits
        );
    }

    #[test]
    fn zero_weight_option_is_never_selected() {
        let group = WeightedGroup::new("skewed")
            .with_option(Component::leaf("a"), 0.0)
            .with_option(Component::leaf("b"), 1.0);
        let counts = frequencies(&group, 2_000, 5);
        assert_eq!(counts[0].1, 0);
        assert_eq!(counts[1].1, 2_000);
    }

    #[test]
    fn frequencies_converge_to_weight_ratios() {
        let group = WeightedGroup::new("archetypes")
            .with_option(Component::leaf("a"), 1.0)
            .with_option(Component::leaf("b"), 2.0)
            .with_option(Component::leaf("c"), 7.0);
        let trials = 20_000;
        let counts = frequencies(&group, trials, 42);
        for ((_, count), expected) in counts.iter().zip([0.1, 0.2, 0.7]) {
            let observed = *count as f64 / trials as f64;
            assert!(
                (observed - expected).abs() < 0.015,
                "Expected {}, observed {}",
                expected,
                observed
            );
        }
    }

    #[test]
    fn selection_is_deterministic_for_a_seed() {
        let group = WeightedGroup::new("faces")
            .with_option(Component::leaf("a"), 1.0)
            .with_option(Component::leaf("b"), 1.0)
            .with_option(Component::leaf("c"), 1.0);
        let mut rng1 = StdRng::seed_from_u64(77);
        let mut rng2 = StdRng::seed_from_u64(77);
        for _ in 0..100 {
            assert_eq!(
                group.select(&mut rng1).unwrap(),
                group.select(&mut rng2).unwrap()
            );
        }
    }

    #[test]
    fn additive_rebalance_keeps_weight() {
        let mut group = WeightedGroup::new("factions")
            .with_option(Component::leaf("x"), 1.0)
            .with_option(Component::leaf("y"), 3.0);
        let weight = group
            .add_option_preserving_ratios(
                WeightedOption::new(Component::leaf("z"), 4.0),
                Rebalance::Additive,
            )
            .unwrap();
        assert_eq!(weight, 4.0);
        let weights: Vec<f64> = group.options.iter().map(|o| o.weight).collect();
        assert_eq!(weights, vec![1.0, 3.0, 4.0]);
    }

    #[test]
    fn target_share_computes_weight_and_preserves_ratios() {
        let mut group = WeightedGroup::new("factions")
            .with_option(Component::leaf("x"), 1.0)
            .with_option(Component::leaf("y"), 3.0);
        let weight = group
            .add_option_preserving_ratios(
                WeightedOption::new(Component::leaf("z"), 123.0),
                Rebalance::TargetShare(0.5),
            )
            .unwrap();
        assert!((weight - 4.0).abs() < 1e-9);
        assert_eq!(group.options[0].weight, 1.0);
        assert_eq!(group.options[1].weight, 3.0);
    }

    #[test]
    fn target_share_of_a_third_equalizes_two_options() {
        let mut group = WeightedGroup::new("factions")
            .with_option(Component::leaf("x"), 1.0)
            .with_option(Component::leaf("y"), 1.0);
        group
            .add_option_preserving_ratios(
                WeightedOption::new(Component::leaf("z"), 1.0),
                Rebalance::TargetShare(1.0 / 3.0),
            )
            .unwrap();
        let trials = 30_000;
        let counts = frequencies(&group, trials, 2024);
        for (id, count) in &counts {
            let observed = *count as f64 / trials as f64;
            assert!(
                (observed - 1.0 / 3.0).abs() < 0.015,
                "Option {} observed at {}",
                id,
                observed
            );
        }
    }

    #[test]
    fn even_share_matches_group_size() {
        let mut group = WeightedGroup::new("factions")
            .with_option(Component::leaf("x"), 2.0)
            .with_option(Component::leaf("y"), 2.0)
            .with_option(Component::leaf("w"), 2.0);
        let weight = group
            .add_option_preserving_ratios(
                WeightedOption::new(Component::leaf("z"), 0.0),
                Rebalance::EvenShare,
            )
            .unwrap();
        assert!((weight - 2.0).abs() < 1e-9);
    }

    #[test]
    fn rebalance_into_empty_group_keeps_own_weight() {
        let mut group = WeightedGroup::new("fresh");
        let weight = group
            .add_option_preserving_ratios(
                WeightedOption::new(Component::leaf("z"), 5.0),
                Rebalance::TargetShare(0.2),
            )
            .unwrap();
        assert_eq!(weight, 5.0);
        assert_eq!(group.options.len(), 1);
    }

    #[test]
    fn target_share_out_of_range_is_rejected() {
        let mut group = WeightedGroup::new("factions").with_option(Component::leaf("x"), 1.0);
        for bad in [0.0, 1.0, -0.5, 1.5, f64::NAN] {
            let result = group.add_option_preserving_ratios(
                WeightedOption::new(Component::leaf("z"), 1.0),
                Rebalance::TargetShare(bad),
            );
            assert!(matches!(result, Err(SelectionError::InvalidShare(_))));
        }
        assert_eq!(group.options.len(), 1);
    }

    #[test]
    fn group_ron_defaults() {
        let group: WeightedGroup = ron::from_str(r#"(label: "Appearance Group")"#).unwrap();
        assert_eq!(group.inclusion_chance, 1.0);
        assert!(group.options.is_empty());
    }
}
