//! Host module system.
//!
//! A small import machinery the bridge plugs into: a module table, an
//! ordered chain of [`Finder`]s consulted for names not yet loaded, and the
//! [`Loader`]s they hand back. Modules may carry an [`AttributeResolver`]
//! that is asked for attributes they do not hold yet.

use crate::proxy::Entity;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use portal_types::{BridgeError, BridgeResult};
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// Supplies module attributes on first access.
pub trait AttributeResolver: Send + Sync {
    /// Produce attribute `name` of `module`, or a "no such attribute" error.
    fn resolve(&self, module: &Module, name: &str) -> BridgeResult<Entity>;
}

/// Locates modules by dotted name.
pub trait Finder: Send + Sync {
    /// Stable identifier, used for idempotent insertion and removal.
    fn id(&self) -> &str;

    /// A spec for `fullname`, or `None` when this finder does not handle it.
    fn find_spec(&self, fullname: &str, imports: &ImportSystem) -> BridgeResult<Option<ModuleSpec>>;
}

/// Creates and populates modules for specs.
pub trait Loader: Send + Sync {
    /// Optionally supply the module object. `None` means a fresh one.
    fn create_module(&self, _spec: &ModuleSpec) -> BridgeResult<Option<Arc<Module>>> {
        Ok(None)
    }

    /// Populate `module`. Its spec is already attached.
    fn exec_module(&self, module: &Arc<Module>) -> BridgeResult<()>;
}

/// How to load one module.
#[derive(Clone)]
pub struct ModuleSpec {
    /// Dotted module name.
    pub name: String,
    /// Loader responsible for it.
    pub loader: Arc<dyn Loader>,
    /// Where it came from, if anywhere.
    pub origin: Option<String>,
    /// Whether the module is a package.
    pub is_package: bool,
    /// Search locations for a package's children. Present, possibly empty,
    /// for packages.
    pub search_locations: Option<Vec<String>>,
}

impl fmt::Debug for ModuleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleSpec")
            .field("name", &self.name)
            .field("origin", &self.origin)
            .field("is_package", &self.is_package)
            .field("search_locations", &self.search_locations)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Default)]
struct ModuleMeta {
    file: Option<String>,
    search_path: Option<Vec<String>>,
    package: Option<String>,
    spec: Option<ModuleSpec>,
}

/// A loaded module: a named namespace of entities.
pub struct Module {
    name: String,
    attrs: DashMap<String, Entity>,
    meta: RwLock<ModuleMeta>,
    resolver: RwLock<Option<Arc<dyn AttributeResolver>>>,
}

impl Module {
    /// Create an empty module.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attrs: DashMap::new(),
            meta: RwLock::new(ModuleMeta::default()),
            resolver: RwLock::new(None),
        }
    }

    /// Dotted name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn meta(&self) -> ModuleMeta {
        self.meta.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn update_meta(&self, f: impl FnOnce(&mut ModuleMeta)) {
        let mut meta = self.meta.write().unwrap_or_else(|e| e.into_inner());
        f(&mut meta);
    }

    /// File label.
    pub fn file(&self) -> Option<String> {
        self.meta().file
    }

    /// Set the file label.
    pub fn set_file(&self, file: impl Into<String>) {
        let file = file.into();
        self.update_meta(|m| m.file = Some(file));
    }

    /// Search path marker. Present on packages only.
    pub fn search_path(&self) -> Option<Vec<String>> {
        self.meta().search_path
    }

    /// Mark the module as a package with the given search path.
    pub fn set_search_path(&self, path: Vec<String>) {
        self.update_meta(|m| m.search_path = Some(path));
    }

    /// Whether the module is a package.
    pub fn is_package(&self) -> bool {
        self.meta
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .search_path
            .is_some()
    }

    /// Package marker: the package this module belongs to.
    pub fn package(&self) -> Option<String> {
        self.meta().package
    }

    /// Set the package marker.
    pub fn set_package(&self, package: impl Into<String>) {
        let package = package.into();
        self.update_meta(|m| m.package = Some(package));
    }

    /// The spec the module was loaded from.
    pub fn spec(&self) -> Option<ModuleSpec> {
        self.meta().spec
    }

    /// Attach a spec.
    pub fn set_spec(&self, spec: ModuleSpec) {
        self.update_meta(|m| m.spec = Some(spec));
    }

    /// Install the resolver consulted on attribute misses.
    pub fn set_resolver(&self, resolver: Arc<dyn AttributeResolver>) {
        *self.resolver.write().unwrap_or_else(|e| e.into_inner()) = Some(resolver);
    }

    /// Whether attributes are resolved lazily.
    pub fn has_resolver(&self) -> bool {
        self.resolver
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Attribute `name`, resolving and remembering it on a miss.
    pub fn get_attr(&self, name: &str) -> BridgeResult<Entity> {
        if let Some(entity) = self.get_local(name) {
            return Ok(entity);
        }
        let resolver = self
            .resolver
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        match resolver {
            Some(resolver) => {
                let entity = resolver.resolve(self, name)?;
                Ok(self
                    .attrs
                    .entry(name.to_string())
                    .or_insert(entity)
                    .value()
                    .clone())
            }
            None => Err(BridgeError::Attribute {
                path: self.name.clone(),
                message: format!("module '{}' has no attribute '{name}'", self.name),
            }),
        }
    }

    /// Attribute `name` if already present. Never resolves.
    pub fn get_local(&self, name: &str) -> Option<Entity> {
        self.attrs.get(name).map(|e| e.value().clone())
    }

    /// Set attribute `name`.
    pub fn set_attr(&self, name: &str, value: Entity) {
        self.attrs.insert(name.to_string(), value);
    }

    /// Whether attribute `name` is already present.
    pub fn contains(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }

    /// Names of the attributes present, sorted.
    pub fn attr_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.attrs.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Copy everything `source` holds into this module, keeping this
    /// module's own spec.
    pub fn populate_from(&self, source: &Module) {
        if std::ptr::eq(self, source) {
            return;
        }
        for entry in source.attrs.iter() {
            self.attrs.insert(entry.key().clone(), entry.value().clone());
        }
        let theirs = source.meta();
        self.update_meta(|m| {
            m.file = theirs.file.or(m.file.take());
            m.search_path = theirs.search_path.or(m.search_path.take());
            m.package = theirs.package.or(m.package.take());
        });
        let resolver = source
            .resolver
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(resolver) = resolver {
            self.set_resolver(resolver);
        }
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let meta = self.meta();
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("file", &meta.file)
            .field("package", &meta.package)
            .field("is_package", &meta.search_path.is_some())
            .finish_non_exhaustive()
    }
}

/// Import machinery: finder chain plus module table.
pub struct ImportSystem {
    finders: RwLock<Vec<Arc<dyn Finder>>>,
    modules: DashMap<String, Arc<Module>>,
}

impl ImportSystem {
    /// Create an import system with no finders.
    pub fn new() -> Self {
        Self {
            finders: RwLock::new(Vec::new()),
            modules: DashMap::new(),
        }
    }

    /// Create an import system whose only finder is `local`.
    pub fn with_local(local: Arc<LocalModules>) -> Self {
        let imports = Self::new();
        imports.add_finder(local);
        imports
    }

    fn finders(&self) -> Vec<Arc<dyn Finder>> {
        self.finders.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Append a finder to the end of the chain.
    pub fn add_finder(&self, finder: Arc<dyn Finder>) {
        let mut finders = self.finders.write().unwrap_or_else(|e| e.into_inner());
        if finders.iter().any(|f| f.id() == finder.id()) {
            return;
        }
        finders.push(finder);
    }

    /// Put a finder at the front of the chain. Returns `false` when a finder
    /// with the same id is already present.
    pub fn insert_finder_front(&self, finder: Arc<dyn Finder>) -> bool {
        let mut finders = self.finders.write().unwrap_or_else(|e| e.into_inner());
        if finders.iter().any(|f| f.id() == finder.id()) {
            return false;
        }
        finders.insert(0, finder);
        true
    }

    /// Remove the finder with `id`. Returns whether one was removed.
    pub fn remove_finder(&self, id: &str) -> bool {
        let mut finders = self.finders.write().unwrap_or_else(|e| e.into_inner());
        let before = finders.len();
        finders.retain(|f| f.id() != id);
        finders.len() != before
    }

    /// Ids of the finder chain, in order.
    pub fn finder_ids(&self) -> Vec<String> {
        self.finders().iter().map(|f| f.id().to_string()).collect()
    }

    /// A loaded module.
    pub fn get(&self, name: &str) -> Option<Arc<Module>> {
        self.modules.get(name).map(|m| Arc::clone(m.value()))
    }

    /// Put a module into the table directly.
    pub fn insert_module(&self, module: Arc<Module>) {
        self.modules.insert(module.name().to_string(), module);
    }

    /// Take a module out of the table.
    pub fn remove_module(&self, name: &str) -> Option<Arc<Module>> {
        self.modules.remove(name).map(|(_, m)| m)
    }

    /// Names of all loaded modules, sorted.
    pub fn module_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.modules.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// First spec any finder produces for `fullname`.
    pub fn find_spec(&self, fullname: &str) -> BridgeResult<Option<ModuleSpec>> {
        for finder in self.finders() {
            if let Some(spec) = finder.find_spec(fullname, self)? {
                debug!(module = %fullname, finder = %finder.id(), "Spec found");
                return Ok(Some(spec));
            }
        }
        Ok(None)
    }

    /// First spec any finder other than `excluded` produces for `fullname`.
    pub fn find_spec_excluding(
        &self,
        fullname: &str,
        excluded: &str,
    ) -> BridgeResult<Option<ModuleSpec>> {
        for finder in self.finders() {
            if finder.id() == excluded {
                continue;
            }
            if let Some(spec) = finder.find_spec(fullname, self)? {
                return Ok(Some(spec));
            }
        }
        Ok(None)
    }

    /// Import `name`, parents first.
    ///
    /// A child of a module that is not a package cannot be imported. The
    /// module is entered into the table before its loader runs and taken out
    /// again if loading fails.
    pub fn import(&self, name: &str) -> BridgeResult<Arc<Module>> {
        if name.is_empty() || name.split('.').any(str::is_empty) {
            return Err(BridgeError::InvalidInput(format!(
                "'{name}' is not a valid module name"
            )));
        }
        if let Some(module) = self.get(name) {
            return Ok(module);
        }

        let parent = match name.rsplit_once('.') {
            Some((parent_name, child)) => {
                let parent = self.import(parent_name)?;
                if !parent.is_package() {
                    return Err(BridgeError::ModuleNotFound {
                        name: name.to_string(),
                        reason: format!("'{parent_name}' is not a package"),
                    });
                }
                if let Some(module) = self.get(name) {
                    return Ok(module);
                }
                Some((parent, child))
            }
            None => None,
        };

        let spec = self
            .find_spec(name)?
            .ok_or_else(|| BridgeError::ModuleNotFound {
                name: name.to_string(),
                reason: "no finder could locate it".to_string(),
            })?;

        let module = spec
            .loader
            .create_module(&spec)?
            .unwrap_or_else(|| Arc::new(Module::new(name)));
        if module.file().is_none() {
            if let Some(origin) = &spec.origin {
                module.set_file(origin.clone());
            }
        }
        if spec.is_package && !module.is_package() {
            module.set_search_path(spec.search_locations.clone().unwrap_or_default());
        }
        let loader = Arc::clone(&spec.loader);
        module.set_spec(spec);

        let module = match self.modules.entry(name.to_string()) {
            Entry::Occupied(existing) => return Ok(Arc::clone(existing.get())),
            Entry::Vacant(slot) => Arc::clone(slot.insert(module).value()),
        };
        if let Err(e) = loader.exec_module(&module) {
            self.modules.remove(name);
            return Err(e);
        }
        if let Some((parent, child)) = parent {
            parent.set_attr(child, Entity::Module(Arc::clone(&module)));
        }
        info!(module = %name, package = module.is_package(), "Module imported");
        Ok(module)
    }

    /// `from module import name`: the attribute, or else the submodule.
    pub fn import_from(&self, module: &Module, name: &str) -> BridgeResult<Entity> {
        match module.get_attr(name) {
            Ok(entity) => return Ok(entity),
            Err(e) if !e.is_attribute_error() => return Err(e),
            Err(_) => {}
        }
        let fullname = format!("{}.{name}", module.name());
        match self.import(&fullname) {
            Ok(sub) => Ok(Entity::Module(sub)),
            Err(e) if e.is_module_not_found() => Err(BridgeError::CannotImportName {
                name: name.to_string(),
                module: module.name().to_string(),
            }),
            Err(e) => Err(e),
        }
    }
}

impl Default for ImportSystem {
    fn default() -> Self {
        Self::new()
    }
}

/// Finder for modules defined in-process.
pub struct LocalModules {
    modules: Arc<DashMap<String, Arc<Module>>>,
}

impl LocalModules {
    /// Finder id.
    pub const ID: &'static str = "local";

    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            modules: Arc::new(DashMap::new()),
        }
    }

    /// Make `module` importable under its name.
    pub fn register(&self, module: Module) -> Arc<Module> {
        let module = Arc::new(module);
        self.modules
            .insert(module.name().to_string(), Arc::clone(&module));
        module
    }
}

impl Default for LocalModules {
    fn default() -> Self {
        Self::new()
    }
}

impl Finder for LocalModules {
    fn id(&self) -> &str {
        Self::ID
    }

    fn find_spec(&self, fullname: &str, _imports: &ImportSystem) -> BridgeResult<Option<ModuleSpec>> {
        Ok(self.modules.get(fullname).map(|module| {
            let search_locations = module.search_path();
            ModuleSpec {
                name: fullname.to_string(),
                loader: Arc::new(LocalLoader {
                    modules: Arc::clone(&self.modules),
                }),
                origin: module.file(),
                is_package: search_locations.is_some(),
                search_locations,
            }
        }))
    }
}

struct LocalLoader {
    modules: Arc<DashMap<String, Arc<Module>>>,
}

impl Loader for LocalLoader {
    fn create_module(&self, spec: &ModuleSpec) -> BridgeResult<Option<Arc<Module>>> {
        Ok(self.modules.get(&spec.name).map(|m| Arc::clone(m.value())))
    }

    fn exec_module(&self, _module: &Arc<Module>) -> BridgeResult<()> {
        Ok(())
    }
}
