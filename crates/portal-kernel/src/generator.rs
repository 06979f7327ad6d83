//! Proxy generator: turns remote entities into cached local stand-ins.
//!
//! Every dotted path resolves at most once; later lookups of the same path
//! return the cached entity. Modules are fabricated empty and fill in
//! lazily: each attribute is resolved on first access only.

use crate::host::{AttributeResolver, ImportSystem, Module};
use crate::proxy::{Entity, ProxyClass};
use crate::type_map::TypeMapper;
use dashmap::DashMap;
use portal_types::{
    BridgeError, BridgeResult, Object, RemoteConnection, RemoteError, RemoteErrorKind, RemoteRef,
    RemoteResult, TypeInfo, IMPORT_MODULE,
};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, info};

/// Attributes whose presence marks a remote object as module-shaped.
pub const MODULE_MARKERS: &[&str] = &["__path__", "__file__", "__spec__"];

/// Modules whose classes are host built-ins and pass through unproxied.
pub const BUILTIN_MODULES: &[&str] = &[
    "builtins",
    "typing",
    "collections",
    "abc",
    "_abc",
    "enum",
    "functools",
    "itertools",
    "operator",
    "re",
];

/// Whether a remote object looks like a module.
pub fn is_module_shaped(handle: &RemoteRef) -> RemoteResult<bool> {
    for marker in MODULE_MARKERS {
        if handle.has_attr(marker)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Remote class info of `handle` when it is a class worth proxying.
fn proxyable_class(handle: &RemoteRef) -> RemoteResult<Option<TypeInfo>> {
    let Some(info) = handle.class_info()? else {
        return Ok(None);
    };
    match info.module.as_deref() {
        Some(module) if !module.is_empty() && !BUILTIN_MODULES.contains(&module) => Ok(Some(info)),
        _ => Ok(None),
    }
}

fn join(container: &str, name: &str) -> String {
    if container.is_empty() {
        name.to_string()
    } else {
        format!("{container}.{name}")
    }
}

fn is_dunder(name: &str) -> bool {
    name.len() > 4 && name.starts_with("__") && name.ends_with("__")
}

/// Fabricates and memoizes stand-ins for remote entities.
pub struct ProxyGenerator {
    this: Weak<ProxyGenerator>,
    connection: Arc<dyn RemoteConnection>,
    mapper: Arc<TypeMapper>,
    imports: Weak<ImportSystem>,
    cache: DashMap<String, Entity>,
    creation_lock: Mutex<()>,
    allow_private_fallback: bool,
}

impl ProxyGenerator {
    /// Create a generator. `imports` is consulted first for module-shaped
    /// members, so that sub-modules loaded through the import system and
    /// through attribute access are the same object.
    pub fn new(
        connection: Arc<dyn RemoteConnection>,
        mapper: Arc<TypeMapper>,
        imports: &Arc<ImportSystem>,
        allow_private_fallback: bool,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            connection,
            mapper,
            imports: Arc::downgrade(imports),
            cache: DashMap::new(),
            creation_lock: Mutex::new(()),
            allow_private_fallback,
        })
    }

    /// The type mapper fabricated classes are registered with.
    pub fn mapper(&self) -> &Arc<TypeMapper> {
        &self.mapper
    }

    /// Cached entity for `path`.
    pub fn cached(&self, path: &str) -> Option<Entity> {
        self.cache.get(path).map(|e| e.value().clone())
    }

    /// Cached module for `path`.
    pub fn cached_module(&self, path: &str) -> Option<Arc<Module>> {
        match self.cached(path) {
            Some(Entity::Module(module)) => Some(module),
            _ => None,
        }
    }

    /// Number of cached paths.
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Make `entity` the cached value of `path`, replacing any other.
    pub(crate) fn adopt(&self, path: &str, entity: Entity) {
        self.cache.insert(path.to_string(), entity);
    }

    fn remember(&self, path: &str, entity: Entity) -> Entity {
        self.cache
            .entry(path.to_string())
            .or_insert(entity)
            .value()
            .clone()
    }

    /// Fabricate the stand-in module for remote module `remote` at `name`.
    ///
    /// The module starts empty; its attributes resolve lazily. A remote
    /// package yields a package (empty search path).
    pub fn create_proxy_module(&self, remote: &RemoteRef, name: &str) -> BridgeResult<Arc<Module>> {
        if let Some(module) = self.cached_module(name) {
            return Ok(module);
        }
        let module = Module::new(name);
        module.set_file(format!("<proxy for {name}>"));
        if remote
            .has_attr("__path__")
            .map_err(|e| classify_error(e, name))?
        {
            module.set_search_path(Vec::new());
        }
        module.set_resolver(Arc::new(RemoteAttributes {
            generator: self.this.clone(),
            remote: Arc::clone(remote),
            path: name.to_string(),
        }));
        let module = Arc::new(module);
        debug!(module = %name, package = module.is_package(), "Created proxy module");
        match self.remember(name, Entity::Module(Arc::clone(&module))) {
            Entity::Module(winner) => Ok(winner),
            other => Err(BridgeError::Import {
                path: name.to_string(),
                message: format!("path already resolved to a {}", other.kind_name()),
            }),
        }
    }

    /// Resolve `path`, a member of `container` (or of the service root when
    /// `path` has a single segment and `container` is the root).
    pub fn resolve(&self, container: &RemoteRef, path: &str) -> BridgeResult<Entity> {
        let (parent, name) = path.rsplit_once('.').unwrap_or(("", path));
        self.resolve_member(container, parent, name)
    }

    /// Resolve attribute `name` of `container`, which lives at
    /// `container_path`.
    pub fn resolve_member(
        &self,
        container: &RemoteRef,
        container_path: &str,
        name: &str,
    ) -> BridgeResult<Entity> {
        if is_dunder(name) {
            return Err(BridgeError::no_attribute(container_path, name));
        }
        let path = join(container_path, name);
        if let Some(entity) = self.cached(&path) {
            return Ok(entity);
        }

        let member = match container.get_attr(name) {
            Ok(member) => member,
            Err(e) if e.kind == RemoteErrorKind::Connection => {
                return Err(BridgeError::ConnectionClosed)
            }
            Err(e) if e.kind == RemoteErrorKind::AccessDenied => {
                return Err(BridgeError::Remote(e.with_context(format!("reading '{path}'"))))
            }
            Err(e) if e.is_lookup_failure() => match self.import_submodule(container, &path)? {
                Some(member) => member,
                None => return Err(BridgeError::no_attribute(container_path, name)),
            },
            Err(e) => {
                return Err(BridgeError::Attribute {
                    path: container_path.to_string(),
                    message: format!("failed to access '{name}': {e}"),
                })
            }
        };
        self.classify(member, &path)
    }

    /// One remote import attempt for a name a package does not hold.
    fn import_submodule(&self, container: &RemoteRef, path: &str) -> BridgeResult<Option<Object>> {
        if !container.has_attr("__path__")? {
            return Ok(None);
        }
        let root = self.connection.root().map_err(|_| BridgeError::ConnectionClosed)?;
        if !root.has_attr(IMPORT_MODULE)? {
            return Ok(None);
        }
        let import = root.get_attr(IMPORT_MODULE)?;
        let Some(import) = import.as_remote() else {
            return Ok(None);
        };
        match import.call(vec![Object::from(path)], Vec::new()) {
            Ok(member) => {
                debug!(path = %path, "Resolved missing attribute as remote submodule");
                Ok(Some(member))
            }
            Err(e) if e.is_lookup_failure() => Ok(None),
            Err(e) => Err(BridgeError::Remote(
                e.with_context(format!("importing submodule '{path}'")),
            )),
        }
    }

    fn classify(&self, member: Object, path: &str) -> BridgeResult<Entity> {
        let handle = match &member {
            Object::Remote(handle) => Arc::clone(handle),
            Object::Value(_) => return Ok(self.remember(path, Entity::Object(member))),
        };
        if is_module_shaped(&handle).map_err(|e| classify_error(e, path))? {
            return self.resolve_submodule(&handle, path);
        }
        if let Some(info) = proxyable_class(&handle).map_err(|e| classify_error(e, path))? {
            return Ok(self.fabricate_class(handle, &info, path));
        }
        Ok(self.remember(path, Entity::Object(member)))
    }

    /// A module-shaped member: through the import system when it knows the
    /// path, as a synthetic module otherwise.
    fn resolve_submodule(&self, handle: &RemoteRef, path: &str) -> BridgeResult<Entity> {
        if let Some(imports) = self.imports.upgrade() {
            match imports.import(path) {
                Ok(module) => return Ok(self.remember(path, Entity::Module(module))),
                Err(
                    e @ (BridgeError::ModuleNotFound { .. }
                    | BridgeError::Configuration(_)
                    | BridgeError::Lookup { .. }),
                ) => {
                    debug!(path = %path, error = %e, "Import system cannot load submodule, synthesizing");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(Entity::Module(self.create_proxy_module(handle, path)?))
    }

    fn fabricate_class(&self, remote: RemoteRef, info: &TypeInfo, path: &str) -> Entity {
        let _guard = self.creation_lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entity) = self.cached(path) {
            return entity;
        }
        let class = Arc::new(ProxyClass::new(
            path,
            remote,
            Arc::clone(&self.mapper),
            self.allow_private_fallback,
        ));
        let module = info.module.as_deref().unwrap_or_default();
        self.mapper.register(class.id(), module, &info.name);
        info!(path = %path, remote = %info.qualified_name(), "Fabricated proxy class");
        let entity = Entity::Class(class);
        self.cache.insert(path.to_string(), entity.clone());
        entity
    }
}

fn classify_error(e: RemoteError, path: &str) -> BridgeError {
    if e.kind == RemoteErrorKind::Connection {
        return BridgeError::ConnectionClosed;
    }
    BridgeError::Import {
        path: path.to_string(),
        message: format!("reflection failed: {e}"),
    }
}

/// Lazy attribute source of a fabricated module.
struct RemoteAttributes {
    generator: Weak<ProxyGenerator>,
    remote: RemoteRef,
    path: String,
}

impl AttributeResolver for RemoteAttributes {
    fn resolve(&self, _module: &Module, name: &str) -> BridgeResult<Entity> {
        let generator = self.generator.upgrade().ok_or_else(|| BridgeError::Import {
            path: self.path.clone(),
            message: "the bridge that created this module is gone".to_string(),
        })?;
        generator.resolve_member(&self.remote, &self.path, name)
    }
}
