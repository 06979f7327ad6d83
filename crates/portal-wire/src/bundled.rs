//! Bundled sample namespace.
//!
//! A small set of modules served by [`sample_space`], shaped like the
//! namespaces real services expose: a flat module, a package with an
//! attribute submodule, a package whose children are only importable, and a
//! module of classes with inheritance, properties and special methods.

use crate::class::{native, ClassBuilder, Invocation, ModuleBuilder};
use crate::space::{Handle, ObjectSpace, SpaceOptions};
use portal_types::{Object, RemoteError, RemoteErrorKind, RemoteHandle, RemoteResult, Value};

/// Top-level names the sample space exposes on its root.
pub const SAMPLE_ROOTS: &[&str] = &[
    "sample_module",
    "test_package",
    "nested_package",
    "advanced_classes",
];

/// Build the sample namespace with default options.
pub fn sample_space() -> ObjectSpace {
    sample_space_with(SpaceOptions::default())
}

/// Build the sample namespace.
pub fn sample_space_with(options: SpaceOptions) -> ObjectSpace {
    let space = ObjectSpace::with_options(options);

    let sample = sample_module(&space);
    space.expose("sample_module", sample);

    let submodule = ModuleBuilder::new("test_package.submodule")
        .function(&space, "submodule_function", native(|call| {
            Ok(Object::from(call.int_arg(0, "x")? * call.int_arg(1, "y")?))
        }))
        .class(
            &space,
            ClassBuilder::new("test_package.submodule", "SubmoduleClass")
                .method("__init__", native(|call| {
                    let multiplier = call.arg_or(0, "multiplier", 2i64);
                    call.this()?.set("multiplier", multiplier)?;
                    Ok(Object::none())
                }))
                .method("multiply", native(|call| {
                    let multiplier = int_attr(call, "multiplier")?;
                    Ok(Object::from(call.int_arg(0, "value")? * multiplier))
                })),
        )
        .attr("SUBMODULE_CONSTANT", "I am a constant")
        .attr("MAGIC_NUMBER", 42i64)
        .build(&space);

    let package = ModuleBuilder::new("test_package")
        .package()
        .attr("package_version", "1.0.0")
        .function(&space, "package_function", native(|call| {
            Ok(Object::from(call.int_arg(0, "x")? + 100))
        }))
        .class(
            &space,
            ClassBuilder::new("test_package", "PackageClass")
                .method("__init__", native(|call| {
                    let value = call.arg_or(0, "value", 42i64);
                    call.this()?.set("value", value)?;
                    Ok(Object::none())
                }))
                .method("get_value", native(|call| call.this()?.get("value"))),
        )
        .attr("submodule", submodule)
        .build(&space);
    space.expose("test_package", package);

    let deep = ModuleBuilder::new("nested_package.sub.deep_module")
        .function(&space, "deep_function", native(|call| {
            let x = call.required(0, "x")?.to_display()?;
            Ok(Object::from(format!("deep: {x}")))
        }))
        .class(
            &space,
            ClassBuilder::new("nested_package.sub.deep_module", "DeepClass")
                .method("__init__", native(|call| {
                    let value = call.arg_or(0, "value", "deep");
                    call.this()?.set("value", value)?;
                    Ok(Object::none())
                }))
                .method("get_deep", native(|call| {
                    let value = call.this()?.get("value")?.to_display()?;
                    Ok(Object::from(format!("very {value}")))
                })),
        )
        .build(&space);
    // `nested_package.sub` is importable but deliberately not an attribute of
    // its parent, so it can only be reached by a remote import.
    ModuleBuilder::new("nested_package.sub")
        .package()
        .attr("deep_module", deep)
        .build(&space);
    let nested = ModuleBuilder::new("nested_package")
        .package()
        .attr("NESTED_FLAG", true)
        .build(&space);
    space.expose("nested_package", nested);

    let advanced = advanced_classes(&space);
    space.expose("advanced_classes", advanced);
    space.expose("service_version", "1.0.0");

    space
}

fn sample_module(space: &ObjectSpace) -> Handle {
    ModuleBuilder::new("sample_module")
        .function(space, "simple_function", native(|call| {
            Ok(Object::from(call.int_arg(0, "x")? * 2))
        }))
        .class(
            space,
            ClassBuilder::new("sample_module", "SimpleClass")
                .method("__init__", native(|call| {
                    let value = call.required(0, "value")?.clone();
                    call.this()?.set("value", value)?;
                    Ok(Object::none())
                }))
                .method("get_value", native(|call| call.this()?.get("value")))
                .method("set_value", native(|call| {
                    call.this()?.set("value", call.required(0, "value")?.clone())?;
                    Ok(Object::none())
                }))
                .property(
                    "doubled",
                    native(|call| Ok(Object::from(int_attr(call, "value")? * 2))),
                    None,
                )
                .method("__str__", native(|call| {
                    let value = call.this()?.get("value")?.to_display()?;
                    Ok(Object::from(format!("SimpleClass({value})")))
                })),
        )
        .attr("SAMPLE_CONSTANT", "hello from the other side")
        .build(space)
}

fn advanced_classes(space: &ObjectSpace) -> Handle {
    const MODULE: &str = "advanced_classes";

    let base = ClassBuilder::new(MODULE, "BaseClass")
        .attr("base_attr", "base_value")
        .method("__init__", native(|call| {
            let value = call.arg_or(0, "value", 10i64);
            call.this()?.set("value", value)?;
            Ok(Object::none())
        }))
        .method("base_method", native(|call| {
            let value = call.this()?.get("value")?.to_display()?;
            Ok(Object::from(format!("base: {value}")))
        }))
        .class_method("create_default", native(|call| {
            call.this()?.call(vec![Object::from(42i64)], Vec::new())
        }))
        .static_method("static_helper", native(|call| {
            Ok(Object::from(call.int_arg(0, "x")? * 100))
        }))
        .build(space);

    let derived = ClassBuilder::new(MODULE, "DerivedClass")
        .extends(&base)
        .method("__init__", native(|call| {
            let this = call.this()?;
            this.set("value", call.arg_or(0, "value", 20i64))?;
            this.set("extra", call.arg_or(1, "extra", Value::None))?;
            Ok(Object::none())
        }))
        .method("base_method", native(|call| {
            let value = call.this()?.get("value")?.to_display()?;
            Ok(Object::from(format!("derived: {value}")))
        }))
        .method("derived_only_method", native(|call| {
            let extra = call.this()?.get("extra")?.to_display()?;
            Ok(Object::from(format!("extra: {extra}")))
        }))
        .property(
            "computed_property",
            native(|call| {
                let this = call.this()?;
                let extra = this.get("extra")?.as_int().unwrap_or(0);
                Ok(Object::from(int_attr(call, "value")? + extra))
            }),
            Some(native(|call| {
                let this = call.this()?;
                this.set("value", call.required(0, "value")?.clone())?;
                this.set("extra", Object::from(0i64))?;
                Ok(Object::none())
            })),
        )
        .build(space);

    let property = ClassBuilder::new(MODULE, "PropertyClass")
        .method("__init__", native(|call| {
            call.this()?.set("_private", Object::from(0i64))?;
            Ok(Object::none())
        }))
        .property(
            "read_only",
            native(|call| Ok(Object::from(int_attr(call, "_private")? + 100))),
            None,
        )
        .property(
            "read_write",
            native(|call| call.this()?.get("_private")),
            Some(native(|call| {
                call.this()?
                    .set("_private", call.required(0, "value")?.clone())?;
                Ok(Object::none())
            })),
        )
        .build(space);

    let container = ClassBuilder::new(MODULE, "Container")
        .method("__init__", native(|call| {
            let items = call.arg_or(0, "items", Value::List(Vec::new()));
            call.this()?.set("items", items)?;
            Ok(Object::none())
        }))
        .method("__len__", native(|call| Ok(Object::from(items(call)?.len() as i64))))
        .method("__getitem__", native(|call| {
            let items = items(call)?;
            let index = call.int_arg(0, "index")?;
            usize::try_from(index)
                .ok()
                .and_then(|i| items.get(i).cloned())
                .map(Object::Value)
                .ok_or_else(|| {
                    RemoteError::new(RemoteErrorKind::Index, "list index out of range")
                })
        }))
        .method("__setitem__", native(|call| {
            let mut items = items(call)?;
            let index = call.int_arg(0, "index")?;
            let value = call
                .required(1, "value")?
                .as_value()
                .cloned()
                .ok_or_else(|| RemoteError::type_error("Container holds plain values only"))?;
            let slot = usize::try_from(index)
                .ok()
                .and_then(|i| items.get_mut(i))
                .ok_or_else(|| {
                    RemoteError::new(
                        RemoteErrorKind::Index,
                        "list assignment index out of range",
                    )
                })?;
            *slot = value;
            call.this()?.set("items", Object::Value(Value::List(items)))?;
            Ok(Object::none())
        }))
        .method("__iter__", native(|call| Ok(Object::Value(Value::List(items(call)?)))))
        .method("__eq__", native(|call| {
            let mine = items(call)?;
            let equal = match call.required(0, "other")? {
                Object::Remote(other) => match other.get_attr("items") {
                    Ok(Object::Value(Value::List(theirs))) => theirs == mine,
                    _ => false,
                },
                Object::Value(Value::List(theirs)) => *theirs == mine,
                Object::Value(_) => false,
            };
            Ok(Object::from(equal))
        }))
        .method("__hash__", native(|call| Ok(Object::from(items(call)?.len() as i64 * 31))))
        .method("__bool__", native(|call| Ok(Object::from(!items(call)?.is_empty()))))
        .method("__str__", native(|call| {
            Ok(Object::from(format!("Container({})", Value::List(items(call)?))))
        }))
        .method("__call__", native(|call| {
            let mut items = items(call)?;
            if let Some(Object::Value(v)) = call.arg(0, "item") {
                items.push(v.clone());
            }
            let len = items.len() as i64;
            call.this()?.set("items", Object::Value(Value::List(items)))?;
            Ok(Object::from(len))
        }))
        .build(space);

    // Reported as living in `enum`, so bridges must pass it through untouched.
    let color = ClassBuilder::new("enum", "Color")
        .attr("RED", 1i64)
        .attr("GREEN", 2i64)
        .build(space);

    ModuleBuilder::new(MODULE)
        .attr("BaseClass", base)
        .attr("DerivedClass", derived)
        .attr("PropertyClass", property)
        .attr("Container", container)
        .attr("Color", color)
        .build(space)
}

fn int_attr(call: &Invocation<'_>, name: &str) -> RemoteResult<i64> {
    call.this()?
        .get(name)?
        .as_int()
        .ok_or_else(|| RemoteError::type_error(format!("attribute '{name}' is not an int")))
}

fn items(call: &Invocation<'_>) -> RemoteResult<Vec<Value>> {
    match call.this()?.get("items")? {
        Object::Value(Value::List(items)) => Ok(items),
        _ => Err(RemoteError::type_error("'items' is not a list")),
    }
}
