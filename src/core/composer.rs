/// The composer: catalog setup, pre-generation hooks, then steady-state
/// instantiation against the shared registry.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::core::error::ComposeError;
use crate::core::registry::{Catalog, CatalogEntry, DuplicatePolicy, TemplateRegistry};
use crate::core::resolver::{MaterializedEntity, Resolver};

/// A pre-generation subscriber. Runs exactly once, with full write
/// access to the catalog, before the first instantiation.
pub type SetupHook = Box<dyn FnOnce(&mut Catalog) -> Result<(), ComposeError> + Send>;

/// The top-level composition engine. Built via `Composer::builder()`.
///
/// A `Composer` only exists once every setup hook has finished, so
/// nothing can be instantiated against a half-built catalog.
pub struct Composer {
    registry: TemplateRegistry,
    seed: u64,
    generation_count: AtomicU64,
}

/// Builder for constructing a `Composer`.
pub struct ComposerBuilder {
    catalog_paths: Vec<PathBuf>,
    /// Overrides the catalog's own policy when set.
    policy: Option<DuplicatePolicy>,
    seed: u64,
    /// Directly provided catalog (for testing without files).
    catalog: Option<Catalog>,
    hooks: Vec<SetupHook>,
}

impl Composer {
    pub fn builder() -> ComposerBuilder {
        ComposerBuilder {
            catalog_paths: Vec::new(),
            policy: None,
            seed: 0,
            catalog: None,
            hooks: Vec::new(),
        }
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    pub fn snapshot(&self) -> Arc<Catalog> {
        self.registry.snapshot()
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Instantiate a registered template with a caller-owned RNG.
    ///
    /// Resolution runs against a snapshot taken at call time; late
    /// registrations made while it runs are not observed.
    pub fn instantiate<R: Rng + ?Sized>(
        &self,
        name: &str,
        rng: &mut R,
    ) -> Result<MaterializedEntity, ComposeError> {
        let catalog = self.registry.snapshot();
        Resolver::new(&catalog).instantiate_named(name, rng)
    }

    /// Instantiate with an RNG derived from the builder seed and the
    /// number of previous `generate` calls. Reproducible for a given seed
    /// and call order.
    pub fn generate(&self, name: &str) -> Result<MaterializedEntity, ComposeError> {
        let count = self.generation_count.fetch_add(1, Ordering::Relaxed);
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(count));
        self.instantiate(name, &mut rng)
    }

    /// Generate several independent entities from the same template.
    pub fn generate_variants(
        &self,
        name: &str,
        count: usize,
    ) -> Result<Vec<MaterializedEntity>, ComposeError> {
        (0..count).map(|_| self.generate(name)).collect()
    }

    /// Register an entry after setup. Concurrent instantiations keep
    /// using the snapshot they started with.
    pub fn register_late(
        &self,
        name: impl Into<String>,
        entry: impl Into<CatalogEntry>,
    ) -> Result<String, ComposeError> {
        Ok(self.registry.register(name, entry)?)
    }

    /// Apply a batch of edits atomically. Nothing is published if `f`
    /// fails.
    pub fn update<T, F>(&self, f: F) -> Result<T, ComposeError>
    where
        F: FnOnce(&mut Catalog) -> Result<T, ComposeError>,
    {
        self.registry.update(f)
    }
}

impl ComposerBuilder {
    /// Add a RON catalog file to load during setup. Files are merged in
    /// the order given, under the configured duplicate policy.
    pub fn catalog_file(mut self, path: &str) -> Self {
        self.catalog_paths.push(PathBuf::from(path));
        self
    }

    /// Policy for names registered during setup and afterward. Without
    /// this, a catalog from `with_catalog` keeps its own policy and a
    /// fresh one starts with `DuplicatePolicy::default()`.
    pub fn duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Provide a catalog directly (for testing without files).
    pub fn with_catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Subscribe to the pre-generation event. Hooks run in subscription
    /// order during `build()`.
    pub fn on_pre_generate<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&mut Catalog) -> Result<(), ComposeError> + Send + 'static,
    {
        self.hooks.push(Box::new(hook));
        self
    }

    pub fn build(self) -> Result<Composer, ComposeError> {
        let mut catalog = self.catalog.unwrap_or_default();
        if let Some(policy) = self.policy {
            catalog.set_policy(policy);
        }

        for path in &self.catalog_paths {
            let loaded = Catalog::load_from_ron(path)?;
            let stored = catalog.merge(loaded)?;
            tracing::debug!(path = %path.display(), entries = stored.len(), "loaded catalog file");
        }

        let hook_count = self.hooks.len();
        for (index, hook) in self.hooks.into_iter().enumerate() {
            tracing::debug!(hook = index, "running pre-generation hook");
            hook(&mut catalog)?;
        }

        tracing::info!(
            entries = catalog.len(),
            hooks = hook_count,
            seed = self.seed,
            "composer ready"
        );

        Ok(Composer {
            registry: TemplateRegistry::new(catalog),
            seed: self.seed,
            generation_count: AtomicU64::new(0),
        })
    }
}
