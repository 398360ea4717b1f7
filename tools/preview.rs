/// Preview: interactive shell for sampling templates from a catalog.
///
/// Usage: preview --catalog <path> [--seed <n>]
///
/// Commands:
///   gen <template>            instantiate once and print the components
///   bulk <template> <n>       instantiate n times and print outcome frequencies
///   list [suffix]             list registered names, optionally by suffix
///   show <name>               print a catalog entry
///   seed <n>                  set RNG seed
///   help                      list commands
///   quit                      exit

use npc_composer::core::composer::Composer;
use npc_composer::core::registry::CatalogEntry;
use npc_composer::schema::component::Component;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "npc_composer=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let mut catalog_paths = Vec::new();
    let mut seed: u64 = 42;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--catalog" if i + 1 < args.len() => {
                i += 1;
                catalog_paths.push(args[i].clone());
            }
            "--seed" if i + 1 < args.len() => {
                i += 1;
                seed = args[i].parse().unwrap_or(42);
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let mut builder = Composer::builder().seed(seed);
    for path in &catalog_paths {
        builder = builder.catalog_file(path);
    }
    let composer = match builder.build() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("ERROR: Failed to build composer: {}", e);
            std::process::exit(1);
        }
    };

    println!("Loaded {} catalog entries", composer.snapshot().len());
    println!("Seed: {}", seed);
    println!("Type 'help' for commands.\n");

    let mut rng = StdRng::seed_from_u64(seed);
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("preview> ");
        stdout.flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() || line.is_empty() {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let cmd = parts[0].to_lowercase();
        // Template names may contain spaces ("CitizenMTemplate 1").
        let rest = line[parts[0].len()..].trim();

        match cmd.as_str() {
            "quit" | "exit" | "q" => {
                println!("Goodbye.");
                break;
            }
            "help" | "h" | "?" => print_help(),
            "gen" => {
                if rest.is_empty() {
                    println!("Usage: gen <template>");
                    continue;
                }
                match composer.instantiate(rest, &mut rng) {
                    Ok(entity) => {
                        println!("\n--- {} ---", entity.template);
                        for leaf in entity.iter() {
                            let mut tags: Vec<&str> = leaf.tags.iter().map(String::as_str).collect();
                            tags.sort();
                            println!("  {} [{}]", leaf.id, tags.join(", "));
                        }
                        println!("--- End ---\n");
                    }
                    Err(e) => println!("ERROR: {}", e),
                }
            }
            "bulk" => {
                // Last token is the count; everything before it is the name.
                let (name, count) = match rest.rsplit_once(' ') {
                    Some((name, n)) => (name.trim(), n.parse::<usize>().ok()),
                    None => (rest, None),
                };
                let count = match count {
                    Some(n) if !name.is_empty() => n,
                    _ => {
                        println!("Usage: bulk <template> <n>");
                        continue;
                    }
                };
                bulk_generate(&composer, name, count, &mut rng);
            }
            "list" => {
                let snapshot = composer.snapshot();
                let names = if rest.is_empty() {
                    snapshot.list_all()
                } else {
                    snapshot.names_with_suffix(rest)
                };
                for name in names {
                    println!("  {}", name);
                }
            }
            "show" => match composer.snapshot().lookup(rest) {
                Ok(entry) => print_entry(entry),
                Err(e) => println!("ERROR: {}", e),
            },
            "seed" => match parts.get(1).and_then(|s| s.parse::<u64>().ok()) {
                Some(n) => {
                    rng = StdRng::seed_from_u64(n);
                    println!("Seed set to {}", n);
                }
                None => println!("Usage: seed <n>"),
            },
            _ => println!("Unknown command '{}'. Type 'help' for commands.", cmd),
        }
    }
}

fn bulk_generate(composer: &Composer, name: &str, count: usize, rng: &mut StdRng) {
    let mut outcomes: HashMap<String, usize> = HashMap::new();
    let mut errors = 0usize;
    for _ in 0..count {
        match composer.instantiate(name, rng) {
            Ok(entity) => *outcomes.entry(entity.ids().join(" + ")).or_insert(0) += 1,
            Err(e) => {
                if errors == 0 {
                    println!("ERROR: {}", e);
                }
                errors += 1;
            }
        }
    }

    let mut sorted: Vec<(String, usize)> = outcomes.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    println!("\n=== {} outcomes over {} trials ===", sorted.len(), count);
    for (outcome, n) in &sorted {
        println!("  {:6.2}%  {}", *n as f64 * 100.0 / count.max(1) as f64, outcome);
    }
    if errors > 0 {
        println!("  {} trials failed", errors);
    }
    println!();
}

fn print_entry(entry: &CatalogEntry) {
    match entry {
        CatalogEntry::Leaf(leaf) => println!("  leaf '{}'", leaf.id),
        CatalogEntry::Template(t) => {
            println!("  template '{}'", t.name);
            for (i, slot) in t.mandatory.iter().enumerate() {
                match slot {
                    Some(c) => println!("    slot {}: {}", i, describe(c)),
                    None => println!("    slot {}: <empty>", i),
                }
            }
            for group in &t.groups {
                println!(
                    "    group '{}' (inclusion {:.2}, total weight {:.2})",
                    group.label,
                    group.inclusion_chance,
                    group.total_weight()
                );
                for option in &group.options {
                    println!("      {:8.3}  {}", option.weight, describe(&option.component));
                }
            }
        }
    }
}

fn describe(component: &Component) -> String {
    match component {
        Component::Leaf(leaf) => format!("leaf {}", leaf.id),
        Component::Composite(t) => format!("inline template {}", t.name),
        Component::Ref(name) => format!("-> {}", name),
    }
}

fn print_usage() {
    println!("Usage: preview --catalog <path> [--catalog <path>...] [--seed <n>]");
}

fn print_help() {
    println!("Commands:");
    println!("  gen <template>          instantiate once");
    println!("  bulk <template> <n>     instantiate n times, print frequencies");
    println!("  list [suffix]           list catalog names");
    println!("  show <name>             print a catalog entry");
    println!("  seed <n>                reset the RNG");
    println!("  quit                    exit");
}
