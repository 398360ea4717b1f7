/// Catalog Linter: validates template catalogs before they ship.
///
/// Usage: catalog_linter <catalog_file_or_dir>
///
/// Errors: dangling refs, groups that cannot select or whose inclusion
/// chance is outside [0, 1], template cycles. Warnings: empty groups, slots with
/// nothing in them, templates nothing else refers to.

use npc_composer::core::registry::{Catalog, CatalogEntry, DuplicatePolicy};
use npc_composer::core::template::CompositeTemplate;
use npc_composer::schema::component::Component;
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::Path;
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "npc_composer=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: catalog_linter <catalog_file_or_dir>");
        process::exit(0);
    }

    let mut catalog = Catalog::new(DuplicatePolicy::Reject);
    let catalog_path = Path::new(&args[1]);
    let mut load_errors = Vec::new();

    if catalog_path.is_file() {
        load_file(catalog_path, &mut catalog, &mut load_errors);
    } else if catalog_path.is_dir() {
        load_catalogs_recursive(catalog_path, &mut catalog, &mut load_errors);
    } else {
        eprintln!("ERROR: Path '{}' does not exist", args[1]);
        process::exit(1);
    }

    println!("Loaded {} catalog entries", catalog.len());

    let (mut errors, warnings) = lint_catalog(&catalog);
    load_errors.append(&mut errors);
    let errors = load_errors;

    for warning in &warnings {
        println!("WARNING: {}", warning);
    }
    for error in &errors {
        println!("ERROR: {}", error);
    }
    println!(
        "\n{} error(s), {} warning(s)",
        errors.len(),
        warnings.len()
    );

    if errors.is_empty() {
        process::exit(0);
    } else {
        process::exit(1);
    }
}

fn load_file(path: &Path, catalog: &mut Catalog, errors: &mut Vec<String>) {
    match Catalog::load_from_ron(path).and_then(|loaded| catalog.merge(loaded)) {
        Ok(stored) => println!("  Loaded: {} ({} entries)", path.display(), stored.len()),
        Err(e) => errors.push(format!("failed to load {}: {}", path.display(), e)),
    }
}

fn load_catalogs_recursive(dir: &Path, catalog: &mut Catalog, errors: &mut Vec<String>) {
    let mut paths: Vec<_> = match std::fs::read_dir(dir) {
        Ok(entries) => entries.flatten().map(|e| e.path()).collect(),
        Err(e) => {
            errors.push(format!("failed to read {}: {}", dir.display(), e));
            return;
        }
    };
    paths.sort();
    for path in paths {
        if path.is_dir() {
            load_catalogs_recursive(&path, catalog, errors);
        } else if path.extension().and_then(|s| s.to_str()) == Some("ron") {
            load_file(&path, catalog, errors);
        }
    }
}

/// Every registry name a template can reach in one step, looking through
/// inline composites.
fn collect_refs<'a>(template: &'a CompositeTemplate, out: &mut Vec<&'a str>) {
    let slots = template.mandatory.iter().flatten();
    let options = template.groups.iter().flat_map(|g| g.options.iter().map(|o| &o.component));
    for component in slots.chain(options) {
        match component {
            Component::Leaf(_) => {}
            Component::Composite(inner) => collect_refs(inner, out),
            Component::Ref(name) => out.push(name.as_str()),
        }
    }
}

fn lint_template(
    name: &str,
    template: &CompositeTemplate,
    errors: &mut Vec<String>,
    warnings: &mut Vec<String>,
) {
    if !template.mandatory.is_empty() && template.mandatory.iter().all(Option::is_none) {
        warnings.push(format!("Template '{}' has only empty mandatory slots", name));
    }

    for (index, group) in template.groups.iter().enumerate() {
        let label = if group.label.is_empty() {
            format!("#{}", index)
        } else {
            format!("'{}'", group.label)
        };
        if group.is_empty() {
            warnings.push(format!(
                "Template '{}' group {} has no options and never contributes",
                name, label
            ));
        }
        if let Err(e) = group.validate() {
            errors.push(format!("Template '{}' group {}: {}", name, label, e));
        }
        for option in &group.options {
            if let Component::Composite(inner) = &option.component {
                lint_template(&format!("{}/{}", name, inner.name), inner, errors, warnings);
            }
        }
    }

    for slot in template.mandatory.iter().flatten() {
        if let Component::Composite(inner) = slot {
            lint_template(&format!("{}/{}", name, inner.name), inner, errors, warnings);
        }
    }
}

fn lint_catalog(catalog: &Catalog) -> (Vec<String>, Vec<String>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let mut edges: FxHashMap<&str, Vec<&str>> = FxHashMap::default();
    let mut referenced: FxHashSet<&str> = FxHashSet::default();

    let names = catalog.list_all();
    for name in &names {
        let Ok(CatalogEntry::Template(template)) = catalog.lookup(name) else {
            continue;
        };
        lint_template(name, template, &mut errors, &mut warnings);

        let mut refs = Vec::new();
        collect_refs(template, &mut refs);
        for target in &refs {
            if !catalog.contains(target) {
                errors.push(format!(
                    "Template '{}' references non-existent entry '{}'",
                    name, target
                ));
            }
            referenced.insert(*target);
        }
        edges.insert(template.name.as_str(), refs);
    }

    // Cycle detection: depth-first over template → template edges.
    let mut done: FxHashSet<&str> = FxHashSet::default();
    let mut reported: FxHashSet<String> = FxHashSet::default();
    for name in &names {
        let mut stack: Vec<&str> = Vec::new();
        find_cycles(name, &edges, &mut stack, &mut done, &mut reported, &mut errors);
    }

    for name in &names {
        if matches!(catalog.lookup(name), Ok(CatalogEntry::Template(_)))
            && !referenced.contains(name.as_str())
        {
            warnings.push(format!(
                "Template '{}' is not referenced by any other entry (root template?)",
                name
            ));
        }
    }

    (errors, warnings)
}

fn find_cycles<'a>(
    name: &'a str,
    edges: &FxHashMap<&'a str, Vec<&'a str>>,
    stack: &mut Vec<&'a str>,
    done: &mut FxHashSet<&'a str>,
    reported: &mut FxHashSet<String>,
    errors: &mut Vec<String>,
) {
    if done.contains(name) {
        return;
    }
    if let Some(pos) = stack.iter().position(|n| *n == name) {
        let mut cycle: Vec<&str> = stack[pos..].to_vec();
        cycle.push(name);
        let mut key: Vec<&str> = stack[pos..].to_vec();
        key.sort();
        if reported.insert(key.join("|")) {
            errors.push(format!("Template cycle: {}", cycle.join(" -> ")));
        }
        return;
    }
    let Some(targets) = edges.get(name) else {
        return;
    };
    stack.push(name);
    for target in targets {
        find_cycles(target, edges, stack, done, reported, errors);
    }
    stack.pop();
    done.insert(name);
}
