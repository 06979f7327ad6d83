//! Forwarding proxies.
//!
//! A [`ProxyClass`] stands in for a remote class; calling it constructs the
//! remote object and wraps the handle in a [`ProxyInstance`]. Instances keep
//! nothing locally except two bookkeeping names and, when allowed, values
//! for private attributes the remote side refused to store.

use crate::host::Module;
use crate::type_map::{ProxyTypeId, TypeMapper};
use dashmap::DashMap;
use portal_types::{
    BridgeError, BridgeResult, Kwargs, Object, RemoteError, RemoteErrorKind, RemoteRef,
};
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Bookkeeping name for the wrapped remote handle. Writable.
pub const REMOTE_INSTANCE: &str = "_remote_instance";
/// Bookkeeping name for the remote class. Read-only.
pub const REMOTE_CLASS: &str = "_remote_class";

/// Anything a dotted path can resolve to.
#[derive(Clone)]
pub enum Entity {
    /// A fabricated proxy class.
    Class(Arc<ProxyClass>),
    /// A module, fabricated or local.
    Module(Arc<Module>),
    /// A stand-in instance.
    Instance(Arc<ProxyInstance>),
    /// A plain value or an unwrapped remote handle, passed through as is.
    Object(Object),
}

impl Entity {
    /// The proxy class, if this is one.
    pub fn as_class(&self) -> Option<&Arc<ProxyClass>> {
        match self {
            Self::Class(c) => Some(c),
            _ => None,
        }
    }

    /// The module, if this is one.
    pub fn as_module(&self) -> Option<&Arc<Module>> {
        match self {
            Self::Module(m) => Some(m),
            _ => None,
        }
    }

    /// The stand-in instance, if this is one.
    pub fn as_instance(&self) -> Option<&Arc<ProxyInstance>> {
        match self {
            Self::Instance(i) => Some(i),
            _ => None,
        }
    }

    /// The passthrough object, if this is one.
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Reference identity.
    pub fn same_as(&self, other: &Entity) -> bool {
        match (self, other) {
            (Self::Class(a), Self::Class(b)) => Arc::ptr_eq(a, b),
            (Self::Module(a), Self::Module(b)) => Arc::ptr_eq(a, b),
            (Self::Instance(a), Self::Instance(b)) => Arc::ptr_eq(a, b),
            (Self::Object(a), Self::Object(b)) => a.same_as(b),
            _ => false,
        }
    }

    /// Short description of the variant.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Class(_) => "class",
            Self::Module(_) => "module",
            Self::Instance(_) => "instance",
            Self::Object(o) if o.is_remote_handle() => "remote object",
            Self::Object(_) => "value",
        }
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Class(c) => write!(f, "Class({}.{})", c.module(), c.name()),
            Self::Module(m) => write!(f, "Module({})", m.name()),
            Self::Instance(i) => write!(f, "Instance({})", i.class().name()),
            Self::Object(o) => write!(f, "Object({o:?})"),
        }
    }
}

impl From<Object> for Entity {
    fn from(obj: Object) -> Self {
        Self::Object(obj)
    }
}

impl From<Arc<Module>> for Entity {
    fn from(module: Arc<Module>) -> Self {
        Self::Module(module)
    }
}

/// Whether `name` looks private: one leading underscore, not a dunder.
pub fn is_private_name(name: &str) -> bool {
    name.starts_with('_') && !(name.starts_with("__") && name.ends_with("__"))
}

/// A local stand-in type for a remote class.
pub struct ProxyClass {
    id: ProxyTypeId,
    name: String,
    module: String,
    path: String,
    remote: RemoteRef,
    mapper: Arc<TypeMapper>,
    allow_private_fallback: bool,
}

impl ProxyClass {
    pub(crate) fn new(
        path: &str,
        remote: RemoteRef,
        mapper: Arc<TypeMapper>,
        allow_private_fallback: bool,
    ) -> Self {
        let (container, name) = path.rsplit_once('.').unwrap_or(("", path));
        let module = if container.is_empty() {
            "proxies".to_string()
        } else {
            format!("{container}.proxies")
        };
        Self {
            id: ProxyTypeId::next(),
            name: name.to_string(),
            module,
            path: path.to_string(),
            remote,
            mapper,
            allow_private_fallback,
        }
    }

    /// Mapper id of this class.
    pub fn id(&self) -> ProxyTypeId {
        self.id
    }

    /// Simple name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Module the class reports: `<container>.proxies`.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Dotted path the class was fabricated for.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The remote class.
    pub fn remote_class(&self) -> &RemoteRef {
        &self.remote
    }

    /// Construct a remote instance with the given arguments and wrap it.
    pub fn instantiate(
        self: &Arc<Self>,
        args: Vec<Object>,
        kwargs: Kwargs,
    ) -> BridgeResult<Arc<ProxyInstance>> {
        let created = self
            .remote
            .call(args, kwargs)
            .map_err(|e| e.with_context(format!("constructing '{}'", self.path)))?;
        match created {
            Object::Remote(handle) => {
                debug!(class = %self.path, object = handle.object_id(), "Constructed remote instance");
                Ok(Arc::new(ProxyInstance::new(Arc::clone(self), handle)))
            }
            Object::Value(v) => Err(BridgeError::Remote(RemoteError::type_error(format!(
                "constructor of '{}' returned a plain {}",
                self.path,
                v.type_name()
            )))),
        }
    }

    /// Class-level attribute: class methods, static methods, class data.
    pub fn get_attr(&self, name: &str) -> BridgeResult<Object> {
        self.remote.get_attr(name).map_err(|e| match e.kind {
            RemoteErrorKind::Attribute | RemoteErrorKind::AccessDenied => BridgeError::Attribute {
                path: self.path.clone(),
                message: format!("type object '{}' has no attribute '{name}'", self.name),
            },
            _ => BridgeError::Remote(e.with_context(format!("class attribute '{name}'"))),
        })
    }

    /// Type membership of `candidate` in this class.
    pub fn is_instance(&self, candidate: &Entity) -> bool {
        self.mapper.check_membership(candidate, self.id)
    }

    /// Adopt an existing raw remote instance of this class.
    pub fn wrap(self: &Arc<Self>, handle: RemoteRef) -> BridgeResult<Arc<ProxyInstance>> {
        let candidate = Entity::Object(Object::Remote(Arc::clone(&handle)));
        if !self.is_instance(&candidate) {
            return Err(BridgeError::Remote(RemoteError::type_error(format!(
                "remote object is not an instance of '{}'",
                self.path
            ))));
        }
        Ok(Arc::new(ProxyInstance::new(Arc::clone(self), handle)))
    }
}

impl fmt::Debug for ProxyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyClass")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("module", &self.module)
            .finish_non_exhaustive()
    }
}

/// A stand-in instance forwarding every operation to its remote handle.
pub struct ProxyInstance {
    class: Arc<ProxyClass>,
    remote: RwLock<RemoteRef>,
    overlay: DashMap<String, Object>,
}

impl ProxyInstance {
    fn new(class: Arc<ProxyClass>, remote: RemoteRef) -> Self {
        Self {
            class,
            remote: RwLock::new(remote),
            overlay: DashMap::new(),
        }
    }

    /// The proxy class this instance belongs to.
    pub fn class(&self) -> &Arc<ProxyClass> {
        &self.class
    }

    /// The wrapped remote handle.
    pub fn remote(&self) -> RemoteRef {
        self.remote.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Names currently held in the private-attribute overlay, sorted.
    pub fn overlay_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.overlay.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Read an attribute.
    pub fn get_attr(&self, name: &str) -> BridgeResult<Object> {
        match name {
            REMOTE_INSTANCE => return Ok(Object::Remote(self.remote())),
            REMOTE_CLASS => return Ok(Object::Remote(Arc::clone(&self.class.remote))),
            _ => {}
        }
        if let Some(value) = self.overlay.get(name) {
            return Ok(value.value().clone());
        }
        self.remote()
            .get_attr(name)
            .map_err(|e| forwarding_error(e, name))
    }

    /// Write an attribute.
    ///
    /// A private-looking name the remote side refuses is kept in the local
    /// overlay when the class allows it; reads then prefer the overlay.
    pub fn set_attr(&self, name: &str, value: Object) -> BridgeResult<()> {
        match name {
            REMOTE_INSTANCE => {
                let Object::Remote(handle) = value else {
                    return Err(BridgeError::Remote(RemoteError::type_error(format!(
                        "'{REMOTE_INSTANCE}' must be a remote handle"
                    ))));
                };
                *self.remote.write().unwrap_or_else(|e| e.into_inner()) = handle;
                return Ok(());
            }
            REMOTE_CLASS => {
                return Err(BridgeError::Attribute {
                    path: self.class.path.clone(),
                    message: format!("'{REMOTE_CLASS}' is read-only"),
                });
            }
            _ => {}
        }
        match self.remote().set_attr(name, value.clone()) {
            Ok(()) => {
                self.overlay.remove(name);
                Ok(())
            }
            Err(e)
                if self.class.allow_private_fallback
                    && is_private_name(name)
                    && matches!(e.kind, RemoteErrorKind::AccessDenied | RemoteErrorKind::Attribute) =>
            {
                debug!(
                    class = %self.class.path,
                    attribute = %name,
                    error = %e,
                    "Remote refused private attribute, keeping it locally"
                );
                self.overlay.insert(name.to_string(), value);
                Ok(())
            }
            Err(e) => Err(forwarding_error(e, name)),
        }
    }

    /// Call the remote object.
    pub fn call(&self, args: Vec<Object>, kwargs: Kwargs) -> BridgeResult<Object> {
        Ok(self.remote().call(args, kwargs)?)
    }

    /// Number of items.
    pub fn len(&self) -> BridgeResult<usize> {
        Ok(self.remote().len()?)
    }

    /// Whether the remote object is empty.
    pub fn is_empty(&self) -> BridgeResult<bool> {
        Ok(self.remote().is_empty()?)
    }

    /// `self[key]`.
    pub fn get_item(&self, key: Object) -> BridgeResult<Object> {
        Ok(self.remote().get_item(key)?)
    }

    /// `self[key] = value`.
    pub fn set_item(&self, key: Object, value: Object) -> BridgeResult<()> {
        Ok(self.remote().set_item(key, value)?)
    }

    /// Every item of the remote iteration.
    pub fn iter(&self) -> BridgeResult<Vec<Object>> {
        Ok(self.remote().iter()?)
    }

    /// Remote equality. A stand-in operand is unwrapped to its handle.
    pub fn equals(&self, other: &Entity) -> BridgeResult<bool> {
        let other = match other {
            Entity::Instance(instance) => Object::Remote(instance.remote()),
            Entity::Class(class) => Object::Remote(Arc::clone(&class.remote)),
            Entity::Object(obj) => obj.clone(),
            Entity::Module(_) => return Ok(false),
        };
        Ok(self.remote().equals(&other)?)
    }

    /// Remote hash.
    pub fn hash_value(&self) -> BridgeResult<u64> {
        Ok(self.remote().hash_value()?)
    }

    /// Remote truthiness.
    pub fn truthy(&self) -> BridgeResult<bool> {
        Ok(self.remote().truthy()?)
    }

    /// Remote string form.
    pub fn to_str(&self) -> BridgeResult<String> {
        Ok(self.remote().to_str()?)
    }

    /// `<RemoteProxy for ...>` around the remote repr.
    pub fn repr(&self) -> BridgeResult<String> {
        Ok(format!("<RemoteProxy for {}>", self.remote().repr()?))
    }
}

impl fmt::Debug for ProxyInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyInstance")
            .field("class", &self.class.path)
            .field("object", &self.remote().object_id())
            .finish_non_exhaustive()
    }
}

fn forwarding_error(e: RemoteError, name: &str) -> BridgeError {
    BridgeError::Remote(e.with_context(format!("proxy forwarding failed for '{name}'")))
}
