//! An in-process remote side.
//!
//! An [`ObjectSpace`] holds a graph of modules, classes, instances and
//! functions and serves it through the [`RemoteConnection`] contract. Every
//! [`Handle`] it hands out enforces the space's private-attribute policy and
//! fails with a connection error once the space is closed.

use crate::class::{ClassDef, Invocation, NativeFn};
use portal_types::{
    Kwargs, Object, ObjectId, RemoteConnection, RemoteError, RemoteErrorKind, RemoteHandle,
    RemoteRef, RemoteResult, TypeInfo, Value,
};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use tracing::debug;

pub use portal_types::IMPORT_MODULE;

/// Behaviour switches for an [`ObjectSpace`].
#[derive(Debug, Clone)]
pub struct SpaceOptions {
    /// Expose `import_module(dotted_path)` on the root object.
    pub expose_import_module: bool,
    /// Allow reading `_private` attributes through handles.
    pub allow_private_reads: bool,
    /// Allow writing `_private` attributes through handles.
    pub allow_private_writes: bool,
    /// Decorates the module reported by `type_of` for instances, the way RPC
    /// layers prefix proxied type names.
    pub type_prefix: Option<String>,
}

impl Default for SpaceOptions {
    fn default() -> Self {
        Self {
            expose_import_module: true,
            allow_private_reads: false,
            allow_private_writes: false,
            type_prefix: None,
        }
    }
}

pub(crate) enum Kind {
    Service,
    Module {
        name: String,
    },
    Class(Arc<ClassDef>),
    Instance {
        class: Arc<Node>,
    },
    Function {
        name: String,
        func: NativeFn,
        bound: Option<Arc<Node>>,
    },
}

pub(crate) struct Node {
    pub(crate) id: ObjectId,
    pub(crate) kind: Kind,
    pub(crate) attrs: RwLock<HashMap<String, Object>>,
}

impl Node {
    fn attr(&self, name: &str) -> Option<Object> {
        let attrs = self.attrs.read().unwrap_or_else(|e| e.into_inner());
        attrs.get(name).cloned()
    }

    fn store(&self, name: &str, value: Object) {
        let mut attrs = self.attrs.write().unwrap_or_else(|e| e.into_inner());
        attrs.insert(name.to_string(), value);
    }

    fn class_def(&self) -> Option<&Arc<ClassDef>> {
        match &self.kind {
            Kind::Class(def) => Some(def),
            _ => None,
        }
    }
}

pub(crate) struct Shared {
    closed: AtomicBool,
    next_id: AtomicU64,
    root_lookups: AtomicUsize,
    options: SpaceOptions,
    modules: RwLock<HashMap<String, Arc<Node>>>,
}

impl Shared {
    pub(crate) fn node(&self, kind: Kind, attrs: HashMap<String, Object>) -> Arc<Node> {
        Arc::new(Node {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            kind,
            attrs: RwLock::new(attrs),
        })
    }
}

/// A served object graph plus the connection to it.
#[derive(Clone)]
pub struct ObjectSpace {
    shared: Arc<Shared>,
    root: Arc<Node>,
}

impl ObjectSpace {
    /// Create an empty space with default options.
    pub fn new() -> Self {
        Self::with_options(SpaceOptions::default())
    }

    /// Create an empty space.
    pub fn with_options(options: SpaceOptions) -> Self {
        let shared = Arc::new(Shared {
            closed: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            root_lookups: AtomicUsize::new(0),
            options,
            modules: RwLock::new(HashMap::new()),
        });
        let root = shared.node(Kind::Service, HashMap::new());
        let space = Self { shared, root };
        if space.shared.options.expose_import_module {
            let shared = Arc::clone(&space.shared);
            let import: NativeFn = Arc::new(move |call: &Invocation<'_>| {
                let dotted = call.str_arg(0, "name")?;
                shared.root_lookups.fetch_add(1, Ordering::Relaxed);
                let node = {
                    let modules = shared.modules.read().unwrap_or_else(|e| e.into_inner());
                    modules.get(&dotted).cloned()
                };
                match node {
                    Some(node) => Ok(Object::Remote(Arc::new(Handle {
                        node,
                        shared: Arc::clone(&shared),
                    }))),
                    None => Err(RemoteError::import(format!("No module named '{dotted}'"))),
                }
            });
            let func = space.function(IMPORT_MODULE, import);
            space.root.store(IMPORT_MODULE, func);
        }
        space
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    pub(crate) fn handle(&self, node: Arc<Node>) -> Handle {
        Handle {
            node,
            shared: Arc::clone(&self.shared),
        }
    }

    pub(crate) fn register_module(&self, name: &str, node: Arc<Node>) {
        let mut modules = self.shared.modules.write().unwrap_or_else(|e| e.into_inner());
        modules.insert(name.to_string(), node);
    }

    /// Make `name` a top-level attribute of the service root.
    pub fn expose(&self, name: &str, object: impl Into<Object>) {
        self.root.store(name, object.into());
    }

    /// Wrap a native closure as a remote function object.
    pub fn function(&self, name: &str, func: NativeFn) -> Object {
        let node = self.shared.node(
            Kind::Function {
                name: name.to_string(),
                func,
                bound: None,
            },
            HashMap::new(),
        );
        Object::Remote(Arc::new(self.handle(node)))
    }

    /// The root entry object.
    pub fn root_handle(&self) -> Handle {
        self.handle(Arc::clone(&self.root))
    }

    /// A connection to this space.
    pub fn connection(&self) -> Arc<dyn RemoteConnection> {
        Arc::new(self.clone())
    }

    /// Close the space. Every handle fails afterwards.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        debug!("object space closed");
    }

    /// Number of top-level lookups served (root attribute reads plus
    /// `import_module` calls).
    pub fn root_lookups(&self) -> usize {
        self.shared.root_lookups.load(Ordering::Relaxed)
    }
}

impl Default for ObjectSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteConnection for ObjectSpace {
    fn root(&self) -> RemoteResult<RemoteRef> {
        if self.is_closed() {
            return Err(RemoteError::connection("connection closed by peer"));
        }
        Ok(Arc::new(self.root_handle()))
    }

    fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

fn is_private(name: &str) -> bool {
    name.starts_with('_') && !(name.starts_with("__") && name.ends_with("__"))
}

/// Walk a class and its bases, returning the first hit of `pick`.
fn find_in_mro<T>(
    class: &Arc<Node>,
    pick: impl Fn(&Arc<Node>, &ClassDef) -> Option<T>,
) -> Option<T> {
    let mut current = Some(Arc::clone(class));
    while let Some(node) = current {
        let def = node.class_def()?;
        if let Some(hit) = pick(&node, def) {
            return Some(hit);
        }
        current = def.base.clone();
    }
    None
}

/// A handle to one object in an [`ObjectSpace`].
#[derive(Clone)]
pub struct Handle {
    node: Arc<Node>,
    shared: Arc<Shared>,
}

impl Handle {
    pub(crate) fn node(&self) -> &Arc<Node> {
        &self.node
    }

    fn ensure_open(&self) -> RemoteResult<()> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(RemoteError::connection("connection closed by peer"));
        }
        Ok(())
    }

    fn check_access(&self, name: &str, write: bool) -> RemoteResult<()> {
        let options = &self.shared.options;
        let allowed = if write {
            options.allow_private_writes
        } else {
            options.allow_private_reads
        };
        if is_private(name) && !allowed {
            return Err(RemoteError::access_denied(format!(
                "cannot access private attribute '{name}'"
            )));
        }
        Ok(())
    }

    fn wrap(&self, node: Arc<Node>) -> Object {
        Object::Remote(Arc::new(Handle {
            node,
            shared: Arc::clone(&self.shared),
        }))
    }

    fn function_object(&self, name: &str, func: &NativeFn, bound: Option<&Arc<Node>>) -> Object {
        let node = self.shared.node(
            Kind::Function {
                name: name.to_string(),
                func: Arc::clone(func),
                bound: bound.map(Arc::clone),
            },
            HashMap::new(),
        );
        self.wrap(node)
    }

    fn invoke(
        &self,
        func: &NativeFn,
        receiver: Option<&Arc<Node>>,
        args: &[Object],
        kwargs: &[(String, Object)],
    ) -> RemoteResult<Object> {
        let call = Invocation {
            receiver: receiver.map(|node| Handle {
                node: Arc::clone(node),
                shared: Arc::clone(&self.shared),
            }),
            args,
            kwargs,
        };
        func(&call)
    }

    fn type_name(&self) -> String {
        match &self.node.kind {
            Kind::Instance { class } => class
                .class_def()
                .map(|d| d.name.clone())
                .unwrap_or_else(|| "object".to_string()),
            Kind::Class(_) => "type".to_string(),
            Kind::Module { .. } => "module".to_string(),
            Kind::Function { .. } => "function".to_string(),
            Kind::Service => "Service".to_string(),
        }
    }

    /// Special method lookup on an instance's class.
    fn special(&self, name: &str) -> Option<NativeFn> {
        match &self.node.kind {
            Kind::Instance { class } => {
                find_in_mro(class, |_, def| def.methods.get(name).cloned())
            }
            _ => None,
        }
    }

    fn call_special(&self, name: &str, args: &[Object]) -> RemoteResult<Option<Object>> {
        match self.special(name) {
            Some(func) => self.invoke(&func, Some(&self.node), args, &[]).map(Some),
            None => Ok(None),
        }
    }

    fn unsupported(&self, what: &str) -> RemoteError {
        RemoteError::type_error(format!("'{}' object {what}", self.type_name()))
    }

    /// Read an attribute without the private-attribute policy. Used by
    /// native method implementations acting on their own object.
    pub fn get(&self, name: &str) -> RemoteResult<Object> {
        if let Some(value) = self.node.attr(name) {
            return Ok(value);
        }
        match &self.node.kind {
            Kind::Service => {
                Err(RemoteError::attribute(format!("service has no attribute '{name}'")))
            }
            Kind::Module { name: module } => Err(RemoteError::attribute(format!(
                "module '{module}' has no attribute '{name}'"
            ))),
            Kind::Function { name: func, .. } => match name {
                "__name__" => Ok(Object::from(func.as_str())),
                _ => Err(RemoteError::attribute(format!(
                    "'function' object has no attribute '{name}'"
                ))),
            },
            Kind::Class(def) => {
                let class = &self.node;
                if let Some(func) = find_in_mro(class, |_, d| d.static_methods.get(name).cloned()) {
                    return Ok(self.function_object(name, &func, None));
                }
                if let Some(func) = find_in_mro(class, |_, d| d.class_methods.get(name).cloned()) {
                    return Ok(self.function_object(name, &func, Some(class)));
                }
                if let Some(func) = find_in_mro(class, |_, d| d.methods.get(name).cloned()) {
                    return Ok(self.function_object(name, &func, None));
                }
                if let Some(value) = find_in_mro(class, |node, _| node.attr(name)) {
                    return Ok(value);
                }
                Err(RemoteError::attribute(format!(
                    "type object '{}' has no attribute '{name}'",
                    def.name
                )))
            }
            Kind::Instance { class } => {
                if let Some(prop) = find_in_mro(class, |_, def| def.properties.get(name).cloned()) {
                    return self.invoke(&prop.get, Some(&self.node), &[], &[]);
                }
                if let Some(func) = find_in_mro(class, |_, def| def.methods.get(name).cloned()) {
                    return Ok(self.function_object(name, &func, Some(&self.node)));
                }
                if let Some(func) = find_in_mro(class, |_, def| def.class_methods.get(name).cloned()) {
                    return Ok(self.function_object(name, &func, Some(class)));
                }
                if let Some(func) = find_in_mro(class, |_, def| def.static_methods.get(name).cloned())
                {
                    return Ok(self.function_object(name, &func, None));
                }
                if let Some(value) = find_in_mro(class, |node, _| node.attr(name)) {
                    return Ok(value);
                }
                Err(RemoteError::attribute(format!(
                    "'{}' object has no attribute '{name}'",
                    self.type_name()
                )))
            }
        }
    }

    /// Write an attribute without the private-attribute policy.
    pub fn set(&self, name: &str, value: Object) -> RemoteResult<()> {
        match &self.node.kind {
            Kind::Function { .. } => Err(RemoteError::attribute(format!(
                "'function' object attribute '{name}' is read-only"
            ))),
            Kind::Instance { class } => {
                match find_in_mro(class, |_, def| def.properties.get(name).cloned()) {
                    Some(prop) => match &prop.set {
                        Some(setter) => self
                            .invoke(setter, Some(&self.node), &[value], &[])
                            .map(|_| ()),
                        None => Err(RemoteError::attribute(format!(
                            "can't set attribute '{name}'"
                        ))),
                    },
                    None => {
                        self.node.store(name, value);
                        Ok(())
                    }
                }
            }
            _ => {
                self.node.store(name, value);
                Ok(())
            }
        }
    }
}

impl From<Handle> for Object {
    fn from(handle: Handle) -> Self {
        Object::Remote(Arc::new(handle))
    }
}

impl RemoteHandle for Handle {
    fn object_id(&self) -> ObjectId {
        self.node.id
    }

    fn type_of(&self) -> RemoteResult<TypeInfo> {
        self.ensure_open()?;
        match &self.node.kind {
            Kind::Instance { class } => {
                let def = class
                    .class_def()
                    .ok_or_else(|| RemoteError::new(RemoteErrorKind::Internal, "broken class"))?;
                let module = match &self.shared.options.type_prefix {
                    Some(prefix) => format!("{prefix}.{}", def.module),
                    None => def.module.clone(),
                };
                Ok(TypeInfo::new(module, def.name.clone()))
            }
            Kind::Service => Ok(TypeInfo::new("portal_wire", "Service")),
            _ => Ok(TypeInfo::new("builtins", self.type_name())),
        }
    }

    fn class_info(&self) -> RemoteResult<Option<TypeInfo>> {
        self.ensure_open()?;
        Ok(self
            .node
            .class_def()
            .map(|def| TypeInfo::new(def.module.clone(), def.name.clone())))
    }

    fn has_attr(&self, name: &str) -> RemoteResult<bool> {
        match self.get_attr(name) {
            Ok(_) => Ok(true),
            Err(e) if matches!(e.kind, RemoteErrorKind::Attribute | RemoteErrorKind::AccessDenied) => {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn get_attr(&self, name: &str) -> RemoteResult<Object> {
        self.ensure_open()?;
        self.check_access(name, false)?;
        if matches!(self.node.kind, Kind::Service) {
            self.shared.root_lookups.fetch_add(1, Ordering::Relaxed);
        }
        self.get(name)
    }

    fn set_attr(&self, name: &str, value: Object) -> RemoteResult<()> {
        self.ensure_open()?;
        self.check_access(name, true)?;
        self.set(name, value)
    }

    fn call(&self, args: Vec<Object>, kwargs: Kwargs) -> RemoteResult<Object> {
        self.ensure_open()?;
        match &self.node.kind {
            Kind::Function { func, bound, .. } => self.invoke(func, bound.as_ref(), &args, &kwargs),
            Kind::Class(_) => {
                let instance = self.shared.node(
                    Kind::Instance {
                        class: Arc::clone(&self.node),
                    },
                    HashMap::new(),
                );
                if let Some(init) = find_in_mro(&self.node, |_, def| def.methods.get("__init__").cloned()) {
                    self.invoke(&init, Some(&instance), &args, &kwargs)?;
                }
                Ok(self.wrap(instance))
            }
            Kind::Instance { .. } => match self.special("__call__") {
                Some(func) => self.invoke(&func, Some(&self.node), &args, &kwargs),
                None => Err(self.unsupported("is not callable")),
            },
            _ => Err(self.unsupported("is not callable")),
        }
    }

    fn get_item(&self, key: Object) -> RemoteResult<Object> {
        self.ensure_open()?;
        self.call_special("__getitem__", &[key])?
            .ok_or_else(|| self.unsupported("is not subscriptable"))
    }

    fn set_item(&self, key: Object, value: Object) -> RemoteResult<()> {
        self.ensure_open()?;
        self.call_special("__setitem__", &[key, value])?
            .map(|_| ())
            .ok_or_else(|| self.unsupported("does not support item assignment"))
    }

    fn len(&self) -> RemoteResult<usize> {
        self.ensure_open()?;
        let result = self
            .call_special("__len__", &[])?
            .ok_or_else(|| self.unsupported("has no len()"))?;
        result
            .as_int()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| RemoteError::type_error("__len__ should return a non-negative int"))
    }

    fn iter(&self) -> RemoteResult<Vec<Object>> {
        self.ensure_open()?;
        let result = self
            .call_special("__iter__", &[])?
            .ok_or_else(|| self.unsupported("is not iterable"))?;
        match result {
            Object::Value(Value::List(items)) => Ok(items.into_iter().map(Object::Value).collect()),
            Object::Remote(inner) => inner.iter(),
            Object::Value(other) => Err(RemoteError::type_error(format!(
                "iter() returned non-iterable of type '{}'",
                other.type_name()
            ))),
        }
    }

    fn equals(&self, other: &Object) -> RemoteResult<bool> {
        self.ensure_open()?;
        if let Some(result) = self.call_special("__eq__", std::slice::from_ref(other))? {
            return Ok(result.as_value().map(Value::is_truthy).unwrap_or(true));
        }
        Ok(other
            .as_remote()
            .map(|r| r.object_id() == self.node.id)
            .unwrap_or(false))
    }

    fn hash_value(&self) -> RemoteResult<u64> {
        self.ensure_open()?;
        if let Some(result) = self.call_special("__hash__", &[])? {
            return result
                .as_int()
                .map(|n| n as u64)
                .ok_or_else(|| RemoteError::type_error("__hash__ method should return an integer"));
        }
        let mut hasher = DefaultHasher::new();
        self.node.id.hash(&mut hasher);
        Ok(hasher.finish())
    }

    fn truthy(&self) -> RemoteResult<bool> {
        self.ensure_open()?;
        if let Some(result) = self.call_special("__bool__", &[])? {
            return Ok(result.as_value().map(Value::is_truthy).unwrap_or(true));
        }
        if self.special("__len__").is_some() {
            return Ok(self.len()? > 0);
        }
        Ok(true)
    }

    fn to_str(&self) -> RemoteResult<String> {
        self.ensure_open()?;
        match self.call_special("__str__", &[])? {
            Some(result) => result.to_display(),
            None => self.repr(),
        }
    }

    fn repr(&self) -> RemoteResult<String> {
        self.ensure_open()?;
        if let Some(result) = self.call_special("__repr__", &[])? {
            return result.to_display();
        }
        Ok(match &self.node.kind {
            Kind::Service => "<portal service root>".to_string(),
            Kind::Module { name } => format!("<module '{name}'>"),
            Kind::Class(def) => format!("<class '{}.{}'>", def.module, def.name),
            Kind::Function { name, .. } => format!("<function {name}>"),
            Kind::Instance { .. } => {
                let ty = self.type_of()?;
                format!("<{} object at {:#x}>", ty.qualified_name(), self.node.id)
            }
        })
    }
}
