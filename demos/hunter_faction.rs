/// Hunter Faction example: an extension adding a new faction to the
/// random-customer rotation.
///
/// The base catalog has one generic customer template that picks a
/// faction container, which picks an archetype, which carries a prefab,
/// a quest pool, and appearance groups. The extension hooks the
/// pre-generation event, derives two hunter archetypes from the citizen
/// ones, and injects its own container at an even share.
///
/// Run with: cargo run --example hunter_faction

use npc_composer::core::composer::Composer;
use npc_composer::core::error::ComposeError;
use npc_composer::core::registry::Catalog;
use npc_composer::core::selection::{Rebalance, WeightedGroup, WeightedOption};
use npc_composer::core::template::CompositeTemplate;
use npc_composer::schema::component::{Component, LeafComponent, Value};
use std::collections::BTreeMap;

const GROUNDHOG: &str = "Demo2GroundhogRandom_Npc";

fn main() {
    let composer = Composer::builder()
        .seed(2024)
        .with_catalog(base_catalog().expect("Failed to build base catalog"))
        .on_pre_generate(|catalog| {
            // Quests first: the archetypes reference them by name.
            create_hunter_quests(catalog)?;
            add_faction(catalog)
        })
        .build()
        .expect("Failed to build composer");

    println!("========================================");
    println!("   GROUNDHOG DAY CUSTOMERS");
    println!("========================================\n");

    for (day, entity) in composer
        .generate_variants(GROUNDHOG, 8)
        .expect("Generation failed")
        .iter()
        .enumerate()
    {
        println!("Day {}: {}", day + 1, entity.ids().join(", "));
    }

    let mut factions: BTreeMap<&str, usize> = BTreeMap::new();
    let trials = 3_000;
    for entity in composer
        .generate_variants(GROUNDHOG, trials)
        .expect("Generation failed")
    {
        let prefab = entity.components.first().map(|c| c.id.as_str()).unwrap_or("");
        let faction = match prefab {
            "citizen_m_prefab" | "citizen_f_prefab" => "citizens",
            "alchemist_prefab" => "alchemists",
            _ => "hunters",
        };
        *factions.entry(faction).or_insert(0) += 1;
    }

    println!("\n--- Faction shares over {} customers ---", trials);
    for (faction, count) in &factions {
        println!("  {:<10} {:5.1}%", faction, *count as f64 * 100.0 / trials as f64);
    }
}

fn base_catalog() -> Result<Catalog, ComposeError> {
    let mut catalog = Catalog::default();

    for (id, tag) in [
        ("citizen_m_prefab", "male"),
        ("citizen_f_prefab", "female"),
        ("alchemist_prefab", "robed"),
    ] {
        catalog.register_leaf(LeafComponent::new(id).with_tag("prefab").with_tag(tag))?;
    }
    for id in ["face_round", "face_long", "face_scarred"] {
        catalog.register_leaf(LeafComponent::new(id).with_tag("face"))?;
    }
    catalog.register_leaf(LeafComponent::new("hunter_armor").with_tag("body"))?;
    catalog.register_leaf(LeafComponent::new("hunter_sword").with_tag("behind_body"))?;

    let faces = WeightedGroup::new("Faces")
        .with_option(Component::reference("face_round"), 1.0)
        .with_option(Component::reference("face_long"), 1.0)
        .with_option(Component::reference("face_scarred"), 1.0);

    catalog.register_template(
        CompositeTemplate::empty("CitizenQuests").with_group(
            WeightedGroup::new("Potion Orders")
                .with_option(LeafComponent::new("quest_healing"), 2.0)
                .with_option(LeafComponent::new("quest_sleep"), 1.0),
        ),
    )?;

    for (name, prefab) in [
        ("CitizenMTemplate 1", "citizen_m_prefab"),
        ("CitizenFTemplate 1", "citizen_f_prefab"),
    ] {
        catalog.register_template(
            CompositeTemplate::empty(name)
                .with_mandatory(Component::reference(prefab))
                .with_mandatory(Component::reference("CitizenQuests"))
                .with_group(faces.clone()),
        )?;
    }

    catalog.register_template(
        CompositeTemplate::empty("MonsterHunterNpc 1")
            .with_mandatory(Component::reference("citizen_m_prefab"))
            .with_group(WeightedGroup::new("Body").with_option(Component::reference("hunter_armor"), 1.0))
            .with_group(
                WeightedGroup::new("Behind Body Feature")
                    .with_option(Component::reference("hunter_sword"), 1.0),
            ),
    )?;

    catalog.register_template(
        CompositeTemplate::empty("CitizenContainer").with_group(
            WeightedGroup::new("Appearance Group")
                .with_option(Component::reference("CitizenMTemplate 1"), 50.0)
                .with_option(Component::reference("CitizenFTemplate 1"), 50.0),
        ),
    )?;
    catalog.register_template(
        CompositeTemplate::empty("AlchemistContainer").with_group(
            WeightedGroup::new("Appearance Group").with_option(
                CompositeTemplate::empty("AlchemistTemplate")
                    .with_mandatory(Component::reference("alchemist_prefab"))
                    .with_group(faces),
                1.0,
            ),
        ),
    )?;

    catalog.register_template(
        CompositeTemplate::empty(GROUNDHOG).with_group(
            WeightedGroup::new("Factions")
                .with_option(Component::reference("CitizenContainer"), 1.0)
                .with_option(Component::reference("AlchemistContainer"), 1.0),
        ),
    )?;

    Ok(catalog)
}

fn create_hunter_quests(catalog: &mut Catalog) -> Result<(), ComposeError> {
    let name = catalog.create_empty("HunterQuests")?;
    catalog.template_mut(&name)?.groups.push(
        WeightedGroup::new("Potion Orders")
            .with_option(LeafComponent::new("quest_silver_oil"), 1.0)
            .with_option(LeafComponent::new("quest_necromancy_ward"), 1.0),
    );
    Ok(())
}

fn add_faction(catalog: &mut Catalog) -> Result<(), ComposeError> {
    let container = catalog.create_empty("GroundhogDayHunterContainer")?;
    catalog.add_to_group(
        GROUNDHOG,
        0,
        WeightedOption::new(Component::reference(container.clone()), 1.0),
        Rebalance::EvenShare,
    )?;

    let male = make_hunter_template(catalog, "CitizenMTemplate 1", false)?;
    let female = make_hunter_template(catalog, "CitizenFTemplate 1", true)?;

    catalog.template_mut(&container)?.groups.push(
        WeightedGroup::new("Appearance Group")
            .with_option(Component::reference(male), 50.0)
            .with_option(Component::reference(female), 50.0),
    );
    Ok(())
}

fn make_hunter_template(
    catalog: &mut Catalog,
    base: &str,
    is_female: bool,
) -> Result<String, ComposeError> {
    let name = if is_female { "HunterFTemplate" } else { "HunterMTemplate" };
    let mut template = catalog.derive(base, name)?;

    // Borrow the in-game hunter's armor and sword groups.
    let hunter = catalog.template("MonsterHunterNpc 1")?;
    for label in ["Body", "Behind Body Feature"] {
        if let Some(group) = hunter.group(label) {
            template.groups.push(group.clone());
        }
    }

    let mut prefab = LeafComponent::new(format!("{}_prefab", name))
        .with_tag("prefab")
        .with_property("hinge_visible", Value::Bool(false));
    if is_female {
        prefab = prefab
            .with_property("left_pupil_x", Value::Float(-0.08))
            .with_property("right_pupil_x", Value::Float(0.61));
    }
    template.set_slot(0, prefab)?;
    template.set_slot(1, Component::reference("HunterQuests"))?;

    Ok(catalog.register_template(template)?)
}
