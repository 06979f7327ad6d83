//! Bridge orchestrator, the surface embedding applications use.
//!
//! A [`Bridge`] owns the eligibility table, the type mapper and the proxy
//! generator for one remote connection, and installs its finder at the front
//! of an [`ImportSystem`]'s chain.

use crate::eligibility::{Eligibility, RootState};
use crate::generator::ProxyGenerator;
use crate::hook::RemoteFinder;
use crate::host::{Finder, ImportSystem, Module};
use crate::proxy::Entity;
use crate::type_map::TypeMapper;
use portal_types::{BridgeConfig, BridgeError, BridgeResult, RemoteConnection};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// State shared between the bridge and its installed finder.
pub(crate) struct BridgeShared {
    pub(crate) connection: Arc<dyn RemoteConnection>,
    pub(crate) config: BridgeConfig,
    pub(crate) eligibility: Eligibility,
    pub(crate) generator: Arc<ProxyGenerator>,
}

/// Bridges imports in `imports` to objects on a remote connection.
pub struct Bridge {
    shared: Arc<BridgeShared>,
    mapper: Arc<TypeMapper>,
    imports: Arc<ImportSystem>,
    finder: Arc<RemoteFinder>,
}

impl Bridge {
    /// Create a bridge with default configuration.
    pub fn new(connection: Arc<dyn RemoteConnection>, imports: Arc<ImportSystem>) -> Self {
        let shared = Self::build_shared(connection, &imports, BridgeConfig::default());
        Self::assemble(shared, imports)
    }

    /// Create a bridge, forcing the roots listed in `config`.
    pub fn with_config(
        connection: Arc<dyn RemoteConnection>,
        imports: Arc<ImportSystem>,
        config: BridgeConfig,
    ) -> BridgeResult<Self> {
        for name in &config.forced {
            validate_root(name)?;
        }
        let forced = config.forced.clone();
        let shared = Self::build_shared(connection, &imports, config);
        for name in &forced {
            shared.eligibility.force(name);
        }
        Ok(Self::assemble(shared, imports))
    }

    fn build_shared(
        connection: Arc<dyn RemoteConnection>,
        imports: &Arc<ImportSystem>,
        config: BridgeConfig,
    ) -> Arc<BridgeShared> {
        let mapper = Arc::new(TypeMapper::new());
        let generator = ProxyGenerator::new(
            Arc::clone(&connection),
            mapper,
            imports,
            config.allow_private_attribute_fallback,
        );
        Arc::new(BridgeShared {
            connection,
            config,
            eligibility: Eligibility::new(),
            generator,
        })
    }

    fn assemble(shared: Arc<BridgeShared>, imports: Arc<ImportSystem>) -> Self {
        let finder = Arc::new(RemoteFinder::new(Arc::clone(&shared)));
        let mapper = Arc::clone(shared.generator.mapper());
        Self {
            shared,
            mapper,
            imports,
            finder,
        }
    }

    /// Force top-level names to resolve remotely. Names must be single,
    /// non-empty segments; nothing is forced if any name is invalid.
    pub fn force_remote<I, S>(&self, names: I) -> BridgeResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<S> = names.into_iter().collect();
        for name in &names {
            validate_root(name.as_ref())?;
        }
        for name in &names {
            self.shared.eligibility.force(name.as_ref());
            info!(root = %name.as_ref(), "Root forced remote");
        }
        Ok(())
    }

    /// Stop forcing the given names. Unknown names are ignored.
    pub fn unforce<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            if self.shared.eligibility.unforce(name.as_ref()) {
                info!(root = %name.as_ref(), "Root no longer forced");
            }
        }
    }

    /// Stop forcing every name.
    pub fn clear_forced(&self) {
        self.shared.eligibility.clear_forced();
        info!("Cleared forced roots");
    }

    /// Put the bridge's finder at the front of the import chain.
    ///
    /// Installing twice is a no-op. With auto-discovery off, at least one
    /// root must be forced first.
    pub fn install(&self) -> BridgeResult<()> {
        if !self.shared.config.auto_discover_missing && self.shared.eligibility.forced().is_empty() {
            return Err(BridgeError::Configuration(
                "no roots are forced and auto-discovery is disabled; call force_remote() first"
                    .to_string(),
            ));
        }
        if !self.imports.insert_finder_front(self.finder.clone()) {
            debug!(finder = %self.finder_id(), "Bridge already installed");
            return Ok(());
        }
        if self.shared.config.create_parent_modules {
            self.create_parent_modules();
        }
        info!(
            finder = %self.finder_id(),
            forced = ?self.shared.eligibility.forced(),
            auto_discover = self.shared.config.auto_discover_missing,
            "Bridge installed"
        );
        Ok(())
    }

    /// Empty package placeholders for forced roots not loaded yet.
    fn create_parent_modules(&self) {
        for name in self.shared.eligibility.forced() {
            if self.imports.get(&name).is_some() {
                continue;
            }
            let placeholder = Module::new(&name);
            placeholder.set_search_path(Vec::new());
            placeholder.set_package(name.clone());
            self.imports.insert_module(Arc::new(placeholder));
            debug!(module = %name, "Created parent placeholder module");
        }
    }

    /// Take the finder out of the import chain. Tolerates it being gone.
    pub fn uninstall(&self) {
        if self.imports.remove_finder(self.finder_id()) {
            info!(finder = %self.finder_id(), "Bridge uninstalled");
        } else {
            debug!(finder = %self.finder_id(), "Bridge was not installed");
        }
    }

    /// Install for the lifetime of the returned guard.
    pub fn install_scoped(&self) -> BridgeResult<BridgeGuard<'_>> {
        self.install()?;
        Ok(BridgeGuard { bridge: self })
    }

    /// Whether the finder is in the import chain.
    pub fn is_installed(&self) -> bool {
        self.imports
            .finder_ids()
            .iter()
            .any(|id| id == self.finder_id())
    }

    /// Whether the remote connection still answers.
    pub fn verify_connection_alive(&self) -> bool {
        let connection = &self.shared.connection;
        if connection.is_closed() {
            return false;
        }
        match connection.root() {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Remote connection check failed");
                false
            }
        }
    }

    /// Import `name` through the bridge's import system.
    pub fn import(&self, name: &str) -> BridgeResult<Arc<Module>> {
        self.imports.import(name)
    }

    /// `from module import name` through the bridge's import system.
    pub fn import_from(&self, module: &str, name: &str) -> BridgeResult<Entity> {
        let module = self.imports.import(module)?;
        self.imports.import_from(&module, name)
    }

    /// Snapshot of every root the bridge knows about.
    pub fn registered_roots(&self) -> BTreeMap<String, RootState> {
        self.shared.eligibility.snapshot()
    }

    /// State of one root.
    pub fn root_state(&self, name: &str) -> Option<RootState> {
        self.shared.eligibility.state(name)
    }

    /// The type mapper.
    pub fn type_mapper(&self) -> &Arc<TypeMapper> {
        &self.mapper
    }

    /// The proxy generator.
    pub fn generator(&self) -> &Arc<ProxyGenerator> {
        &self.shared.generator
    }

    /// The import system the bridge installs into.
    pub fn imports(&self) -> &Arc<ImportSystem> {
        &self.imports
    }

    /// The configuration in effect.
    pub fn config(&self) -> &BridgeConfig {
        &self.shared.config
    }

    /// Id of the bridge's finder in the import chain.
    pub fn finder_id(&self) -> &str {
        self.finder.id()
    }
}

/// Uninstalls its bridge when dropped.
pub struct BridgeGuard<'a> {
    bridge: &'a Bridge,
}

impl BridgeGuard<'_> {
    /// The guarded bridge.
    pub fn bridge(&self) -> &Bridge {
        self.bridge
    }
}

impl Drop for BridgeGuard<'_> {
    fn drop(&mut self) {
        self.bridge.uninstall();
    }
}

fn validate_root(name: &str) -> BridgeResult<()> {
    if name.trim().is_empty() {
        return Err(BridgeError::InvalidInput(
            "root name must not be empty".to_string(),
        ));
    }
    if name.contains('.') {
        return Err(BridgeError::InvalidInput(format!(
            "'{name}' is dotted; only top-level names can be forced"
        )));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(BridgeError::InvalidInput(format!(
            "'{name}' contains whitespace"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use portal_wire::sample_space;

    fn bridge() -> (portal_wire::ObjectSpace, Bridge) {
        let space = sample_space();
        let bridge = Bridge::new(space.connection(), Arc::new(ImportSystem::new()));
        (space, bridge)
    }

    #[test]
    fn test_force_validation_is_all_or_nothing() {
        let (_space, bridge) = bridge();
        assert!(bridge.force_remote(["good", "bad.name"]).is_err());
        assert!(bridge.registered_roots().is_empty());
        assert!(bridge.force_remote([""]).is_err());
        bridge.force_remote(["good"]).unwrap();
        assert_eq!(bridge.root_state("good"), Some(RootState::Forced));
    }

    #[test]
    fn test_install_is_idempotent() {
        let (_space, bridge) = bridge();
        bridge.install().unwrap();
        bridge.install().unwrap();
        assert_eq!(bridge.imports().finder_ids().len(), 1);
        assert!(bridge.is_installed());
        bridge.uninstall();
        bridge.uninstall();
        assert!(!bridge.is_installed());
    }

    #[test]
    fn test_scoped_install() {
        let (_space, bridge) = bridge();
        {
            let guard = bridge.install_scoped().unwrap();
            assert!(guard.bridge().is_installed());
        }
        assert!(!bridge.is_installed());
    }

    #[test]
    fn test_install_requires_roots_without_discovery() {
        let space = sample_space();
        let config = BridgeConfig {
            auto_discover_missing: false,
            ..Default::default()
        };
        let bridge =
            Bridge::with_config(space.connection(), Arc::new(ImportSystem::new()), config).unwrap();
        assert!(matches!(bridge.install(), Err(BridgeError::Configuration(_))));
        bridge.force_remote(["sample_module"]).unwrap();
        bridge.install().unwrap();
    }

    #[test]
    fn test_config_forces_roots() {
        let space = sample_space();
        let config = BridgeConfig {
            forced: vec!["sample_module".to_string()],
            ..Default::default()
        };
        let bridge =
            Bridge::with_config(space.connection(), Arc::new(ImportSystem::new()), config).unwrap();
        assert_eq!(bridge.root_state("sample_module"), Some(RootState::Forced));

        let bad = BridgeConfig {
            forced: vec!["a.b".to_string()],
            ..Default::default()
        };
        assert!(Bridge::with_config(space.connection(), Arc::new(ImportSystem::new()), bad).is_err());
    }

    #[test]
    fn test_connection_health() {
        let (space, bridge) = bridge();
        assert!(bridge.verify_connection_alive());
        space.close();
        assert!(!bridge.verify_connection_alive());
    }
}
