//! Builders for the objects an [`ObjectSpace`] serves.

use crate::space::{Handle, Kind, ObjectSpace};
use portal_types::{Object, RemoteError, RemoteResult, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// A native implementation of a remote function or method.
pub type NativeFn = Arc<dyn Fn(&Invocation<'_>) -> RemoteResult<Object> + Send + Sync>;

/// Arguments of one native call.
pub struct Invocation<'a> {
    pub(crate) receiver: Option<Handle>,
    /// Positional arguments, without the receiver.
    pub args: &'a [Object],
    /// Keyword arguments.
    pub kwargs: &'a [(String, Object)],
}

impl Invocation<'_> {
    /// The bound receiver (`self` or `cls`).
    pub fn this(&self) -> RemoteResult<&Handle> {
        self.receiver
            .as_ref()
            .ok_or_else(|| RemoteError::type_error("unbound method called without receiver"))
    }

    /// Argument by position, falling back to keyword `name`.
    pub fn arg(&self, index: usize, name: &str) -> Option<&Object> {
        self.args.get(index).or_else(|| {
            self.kwargs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v)
        })
    }

    /// Required argument.
    pub fn required(&self, index: usize, name: &str) -> RemoteResult<&Object> {
        self.arg(index, name).ok_or_else(|| {
            RemoteError::type_error(format!("missing required argument '{name}'"))
        })
    }

    /// Required integer argument.
    pub fn int_arg(&self, index: usize, name: &str) -> RemoteResult<i64> {
        let arg = self.required(index, name)?;
        arg.as_int()
            .ok_or_else(|| RemoteError::type_error(format!("argument '{name}' must be int")))
    }

    /// Required string argument.
    pub fn str_arg(&self, index: usize, name: &str) -> RemoteResult<String> {
        let arg = self.required(index, name)?;
        arg.as_str()
            .map(str::to_string)
            .ok_or_else(|| RemoteError::type_error(format!("argument '{name}' must be str")))
    }

    /// Optional argument with a default.
    pub fn arg_or(&self, index: usize, name: &str, default: impl Into<Object>) -> Object {
        self.arg(index, name).cloned().unwrap_or_else(|| default.into())
    }
}

/// Wrap a closure as a [`NativeFn`].
pub fn native<F>(f: F) -> NativeFn
where
    F: Fn(&Invocation<'_>) -> RemoteResult<Object> + Send + Sync + 'static,
{
    Arc::new(f)
}

#[derive(Clone)]
pub(crate) struct Property {
    pub(crate) get: NativeFn,
    pub(crate) set: Option<NativeFn>,
}

pub(crate) struct ClassDef {
    pub(crate) name: String,
    pub(crate) module: String,
    pub(crate) base: Option<Arc<crate::space::Node>>,
    pub(crate) methods: HashMap<String, NativeFn>,
    pub(crate) class_methods: HashMap<String, NativeFn>,
    pub(crate) static_methods: HashMap<String, NativeFn>,
    pub(crate) properties: HashMap<String, Property>,
}

/// Builds a remote class.
pub struct ClassBuilder {
    def: ClassDef,
    attrs: HashMap<String, Object>,
    base: Option<Handle>,
}

impl ClassBuilder {
    /// Start a class named `name` defined in `module`.
    pub fn new(module: &str, name: &str) -> Self {
        Self {
            def: ClassDef {
                name: name.to_string(),
                module: module.to_string(),
                base: None,
                methods: HashMap::new(),
                class_methods: HashMap::new(),
                static_methods: HashMap::new(),
                properties: HashMap::new(),
            },
            attrs: HashMap::new(),
            base: None,
        }
    }

    /// Inherit from an already built class.
    pub fn extends(mut self, base: &Handle) -> Self {
        self.base = Some(base.clone());
        self
    }

    /// Instance method. `__init__` and the special methods (`__len__`,
    /// `__getitem__`, `__eq__`, ...) are ordinary methods here.
    pub fn method(mut self, name: &str, f: NativeFn) -> Self {
        self.def.methods.insert(name.to_string(), f);
        self
    }

    /// Method receiving the class as its receiver.
    pub fn class_method(mut self, name: &str, f: NativeFn) -> Self {
        self.def.class_methods.insert(name.to_string(), f);
        self
    }

    /// Method with no receiver.
    pub fn static_method(mut self, name: &str, f: NativeFn) -> Self {
        self.def.static_methods.insert(name.to_string(), f);
        self
    }

    /// Computed attribute, optionally writable.
    pub fn property(mut self, name: &str, get: NativeFn, set: Option<NativeFn>) -> Self {
        self.def
            .properties
            .insert(name.to_string(), Property { get, set });
        self
    }

    /// Class variable.
    pub fn attr(mut self, name: &str, value: impl Into<Object>) -> Self {
        self.attrs.insert(name.to_string(), value.into());
        self
    }

    /// Materialise the class in `space`.
    pub fn build(mut self, space: &ObjectSpace) -> Handle {
        self.def.base = self.base.as_ref().map(|b| Arc::clone(b.node()));
        self.attrs
            .insert("__name__".to_string(), Object::from(self.def.name.as_str()));
        self.attrs
            .insert("__module__".to_string(), Object::from(self.def.module.as_str()));
        let node = space
            .shared()
            .node(Kind::Class(Arc::new(self.def)), self.attrs);
        space.handle(node)
    }
}

/// Builds a remote module.
pub struct ModuleBuilder {
    name: String,
    package: bool,
    attrs: HashMap<String, Object>,
}

impl ModuleBuilder {
    /// Start a module with dotted name `name`.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            package: false,
            attrs: HashMap::new(),
        }
    }

    /// Mark the module as a package (it gets a `__path__`).
    pub fn package(mut self) -> Self {
        self.package = true;
        self
    }

    /// Module-level value or object.
    pub fn attr(mut self, name: &str, value: impl Into<Object>) -> Self {
        self.attrs.insert(name.to_string(), value.into());
        self
    }

    /// Module-level function.
    pub fn function(mut self, space: &ObjectSpace, name: &str, f: NativeFn) -> Self {
        let func = space.function(name, f);
        self.attrs.insert(name.to_string(), func);
        self
    }

    /// Module-level class, built from `class`.
    pub fn class(mut self, space: &ObjectSpace, class: ClassBuilder) -> Self {
        let name = class.def.name.clone();
        let handle = class.build(space);
        self.attrs.insert(name, Object::Remote(Arc::new(handle)));
        self
    }

    /// Materialise the module and make it importable by its dotted name.
    pub fn build(mut self, space: &ObjectSpace) -> Handle {
        self.attrs
            .insert("__name__".to_string(), Object::from(self.name.as_str()));
        self.attrs.insert(
            "__file__".to_string(),
            Object::from(format!("{}.py", self.name.replace('.', "/"))),
        );
        if self.package {
            self.attrs.insert(
                "__path__".to_string(),
                Object::Value(Value::List(vec![Value::Str(self.name.replace('.', "/"))])),
            );
        }
        let node = space.shared().node(
            Kind::Module {
                name: self.name.clone(),
            },
            self.attrs,
        );
        space.register_module(&self.name, Arc::clone(&node));
        space.handle(node)
    }
}
