//! Integration tests for the bridge against an in-process object space.
//!
//! Every test serves the bundled sample namespace through a
//! `portal_wire::ObjectSpace`, installs a real `Bridge` into a fresh
//! `ImportSystem`, and drives it through imports and stand-in operations.

use portal_kernel::{Bridge, Entity, ImportSystem, LocalModules, Module, RootState};
use portal_types::{
    BridgeConfig, BridgeError, Object, RemoteConnection, RemoteError, RemoteErrorKind, RemoteRef,
    Value, IMPORT_MODULE,
};
use portal_wire::{native, sample_space, sample_space_with, ModuleBuilder, ObjectSpace, SpaceOptions};
use std::sync::{Arc, Barrier};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn bridge_over(space: &ObjectSpace, config: BridgeConfig) -> Bridge {
    let bridge =
        Bridge::with_config(space.connection(), Arc::new(ImportSystem::new()), config).unwrap();
    bridge.install().unwrap();
    bridge
}

fn forced(space: &ObjectSpace, roots: &[&str]) -> Bridge {
    let config = BridgeConfig {
        forced: roots.iter().map(|r| r.to_string()).collect(),
        ..Default::default()
    };
    bridge_over(space, config)
}

fn class(bridge: &Bridge, module: &str, name: &str) -> Arc<portal_kernel::ProxyClass> {
    let entity = bridge.import_from(module, name).unwrap();
    entity.as_class().cloned().unwrap()
}

/// A raw handle to `module.Class(args)`, bypassing the bridge.
fn raw_instance(space: &ObjectSpace, module: &str, class: &str, args: Vec<Object>) -> RemoteRef {
    let root = space.connection().root().unwrap();
    let module = root.get_attr(module).unwrap();
    let class = module.as_remote().unwrap().get_attr(class).unwrap();
    let instance = class.as_remote().unwrap().call(args, vec![]).unwrap();
    instance.as_remote().unwrap().clone()
}

/// A space serving package `rootpkg` whose `import_module` always fails
/// with an internal error.
fn failing_import_space() -> ObjectSpace {
    let space = ObjectSpace::with_options(SpaceOptions {
        expose_import_module: false,
        ..Default::default()
    });
    let package = ModuleBuilder::new("rootpkg").package().build(&space);
    space.expose("rootpkg", package);
    let import = space.function(
        IMPORT_MODULE,
        native(|_| Err(RemoteError::new(RemoteErrorKind::Internal, "kaboom"))),
    );
    space.expose(IMPORT_MODULE, import);
    space
}

fn call(entity: &Entity, args: Vec<Object>) -> Object {
    entity
        .as_object()
        .and_then(Object::as_remote)
        .unwrap()
        .call(args, vec![])
        .unwrap()
}

// ---------------------------------------------------------------------------
// Identity and caching
// ---------------------------------------------------------------------------

#[test]
fn test_repeated_imports_are_identical() {
    let space = sample_space();
    let bridge = forced(&space, &["sample_module"]);

    let a = bridge.import("sample_module").unwrap();
    let b = bridge.import("sample_module").unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a.file().as_deref(), Some("<proxy for sample_module>"));

    let via_attr = a.get_attr("SimpleClass").unwrap();
    let via_from = bridge.import_from("sample_module", "SimpleClass").unwrap();
    assert!(via_attr.same_as(&via_from));
    assert_eq!(bridge.type_mapper().len(), 1);
}

#[test]
fn test_submodule_identity_across_import_styles() {
    let space = sample_space();
    let bridge = forced(&space, &["test_package"]);

    let package = bridge.import("test_package").unwrap();
    assert!(package.is_package());
    assert_eq!(package.package().as_deref(), Some("test_package"));

    let by_attr = package.get_attr("submodule").unwrap();
    let by_import = bridge.import("test_package.submodule").unwrap();
    assert!(by_attr.same_as(&Entity::Module(Arc::clone(&by_import))));
    assert_eq!(by_import.package().as_deref(), Some("test_package"));

    let magic = by_import.get_attr("MAGIC_NUMBER").unwrap();
    assert_eq!(magic.as_object().and_then(Object::as_int), Some(42));
}

// ---------------------------------------------------------------------------
// Forced vs auto-discovered roots
// ---------------------------------------------------------------------------

#[test]
fn test_forced_missing_root_raises() {
    let space = sample_space();
    let bridge = forced(&space, &["missing_root"]);
    let err = bridge.import("missing_root").unwrap_err();
    assert!(matches!(err, BridgeError::Lookup { .. }), "got {err:?}");
    assert!(err.to_string().contains("missing_root"));
    assert_eq!(bridge.root_state("missing_root"), Some(RootState::Forced));
}

#[test]
fn test_auto_discovered_missing_root_probed_once() {
    let space = sample_space();
    let bridge = bridge_over(&space, BridgeConfig::default());

    let before = space.root_lookups();
    let err = bridge.import("not_served_anywhere").unwrap_err();
    assert!(err.is_module_not_found());
    let after_first = space.root_lookups();
    assert_eq!(after_first, before + 1);
    assert_eq!(
        bridge.root_state("not_served_anywhere"),
        Some(RootState::ConfirmedAbsent)
    );

    let err = bridge.import("not_served_anywhere").unwrap_err();
    assert!(err.is_module_not_found());
    assert_eq!(space.root_lookups(), after_first);
}

#[test]
fn test_auto_discovered_non_module_root_probed_once() {
    let space = sample_space();
    let bridge = bridge_over(&space, BridgeConfig::default());

    let before = space.root_lookups();
    let err = bridge.import("service_version").unwrap_err();
    assert!(err.is_module_not_found(), "got {err:?}");
    assert_eq!(space.root_lookups(), before + 1);
    assert_eq!(
        bridge.root_state("service_version"),
        Some(RootState::ConfirmedAbsent)
    );

    let err = bridge.import("service_version").unwrap_err();
    assert!(err.is_module_not_found());
    assert_eq!(space.root_lookups(), before + 1);
}

#[test]
fn test_auto_discovery_confirms_remote_roots() {
    let space = sample_space();
    let bridge = bridge_over(&space, BridgeConfig::default());

    let module = bridge.import("sample_module").unwrap();
    assert_eq!(
        bridge.registered_roots().get("sample_module"),
        Some(&RootState::ConfirmedRemote)
    );
    let func = module.get_attr("simple_function").unwrap();
    assert_eq!(call(&func, vec![Object::from(21i64)]).as_int(), Some(42));
}

#[test]
fn test_forcing_resets_absence() {
    let space = sample_space();
    let bridge = bridge_over(&space, BridgeConfig::default());
    assert!(bridge.import("advanced_classes_typo").is_err());
    assert_eq!(
        bridge.root_state("advanced_classes_typo"),
        Some(RootState::ConfirmedAbsent)
    );
    bridge.force_remote(["advanced_classes_typo"]).unwrap();
    assert_eq!(
        bridge.root_state("advanced_classes_typo"),
        Some(RootState::Forced)
    );
    assert!(matches!(
        bridge.import("advanced_classes_typo"),
        Err(BridgeError::Lookup { .. })
    ));
}

#[test]
fn test_local_modules_win_under_auto_discovery() {
    let space = sample_space();
    let local = Arc::new(LocalModules::new());
    let shadow = Module::new("sample_module");
    shadow.set_file("local/sample_module.rs");
    local.register(shadow);
    let imports = Arc::new(ImportSystem::with_local(local));
    let bridge = Bridge::new(space.connection(), Arc::clone(&imports));
    bridge.install().unwrap();

    let before = space.root_lookups();
    let module = bridge.import("sample_module").unwrap();
    assert_eq!(module.file().as_deref(), Some("local/sample_module.rs"));
    assert_eq!(space.root_lookups(), before);
    assert_eq!(bridge.root_state("sample_module"), None);
}

#[test]
fn test_forced_root_does_not_fall_back_to_local() {
    let space = sample_space();
    let local = Arc::new(LocalModules::new());
    local.register(Module::new("only_local"));
    let imports = Arc::new(ImportSystem::with_local(local));
    let config = BridgeConfig {
        forced: vec!["only_local".to_string()],
        ..Default::default()
    };
    let bridge = Bridge::with_config(space.connection(), imports, config).unwrap();
    bridge.install().unwrap();

    assert!(matches!(
        bridge.import("only_local"),
        Err(BridgeError::Lookup { .. })
    ));
}

#[test]
fn test_non_module_values_are_declined() {
    let space = sample_space();
    let bridge = forced(&space, &["service_version", "sample_module"]);

    let err = bridge.import("service_version").unwrap_err();
    assert!(err.is_module_not_found(), "got {err:?}");

    // Functions are reachable as attributes of their module, not as modules.
    let func = bridge
        .import_from("sample_module", "simple_function")
        .unwrap();
    assert_eq!(call(&func, vec![Object::from(4i64)]).as_int(), Some(8));
}

// ---------------------------------------------------------------------------
// Missing capability and closed connection
// ---------------------------------------------------------------------------

#[test]
fn test_missing_import_capability_is_a_configuration_error() {
    let space = sample_space_with(SpaceOptions {
        expose_import_module: false,
        ..Default::default()
    });
    let bridge = forced(&space, &["test_package"]);
    bridge.import("test_package").unwrap();

    let err = bridge.import("test_package.submodule").unwrap_err();
    match err {
        BridgeError::Configuration(msg) => {
            assert!(msg.contains("import_module(dotted_path: str) -> module"));
        }
        other => panic!("expected configuration error, got {other:?}"),
    }
}

#[test]
fn test_missing_import_capability_declines_leniently() {
    let space = sample_space_with(SpaceOptions {
        expose_import_module: false,
        ..Default::default()
    });
    let bridge = bridge_over(&space, BridgeConfig::default());
    let package = bridge.import("test_package").unwrap();

    let err = bridge.import("test_package.submodule").unwrap_err();
    assert!(err.is_module_not_found());

    // Attribute access still reaches the submodule through its parent.
    let sub = package.get_attr("submodule").unwrap();
    let sub = sub.as_module().unwrap();
    assert_eq!(sub.file().as_deref(), Some("<proxy for test_package.submodule>"));
    let constant = sub.get_attr("SUBMODULE_CONSTANT").unwrap();
    assert_eq!(
        constant.as_object().and_then(Object::as_str),
        Some("I am a constant")
    );
}

#[test]
fn test_closed_connection() {
    let space = sample_space();
    let bridge = forced(&space, &["sample_module"]);
    assert!(bridge.verify_connection_alive());
    space.close();
    assert!(!bridge.verify_connection_alive());
    assert!(matches!(
        bridge.import("sample_module"),
        Err(BridgeError::ConnectionClosed)
    ));
}

// ---------------------------------------------------------------------------
// Type membership
// ---------------------------------------------------------------------------

#[test]
fn test_membership_of_raw_handles() {
    let space = sample_space();
    let bridge = forced(&space, &["sample_module", "advanced_classes"]);
    let simple = class(&bridge, "sample_module", "SimpleClass");
    let property = class(&bridge, "advanced_classes", "PropertyClass");

    let raw = raw_instance(&space, "sample_module", "SimpleClass", vec![Object::from(1i64)]);
    let raw = Entity::Object(Object::Remote(raw));
    assert!(bridge.type_mapper().is_remote_handle(&raw));
    assert!(simple.is_instance(&raw));
    assert!(!property.is_instance(&raw));

    let wrapped = simple.instantiate(vec![Object::from(2i64)], vec![]).unwrap();
    assert!(simple.is_instance(&Entity::Instance(Arc::clone(&wrapped))));
    assert!(!property.is_instance(&Entity::Instance(wrapped)));
    assert!(!simple.is_instance(&Entity::Object(Object::from(3i64))));
}

#[test]
fn test_membership_survives_decorated_type_names() {
    let space = sample_space_with(SpaceOptions {
        type_prefix: Some("rpyc.core.netref".to_string()),
        ..Default::default()
    });
    let bridge = forced(&space, &["test_package"]);
    bridge.import("test_package.submodule").unwrap();
    let sub_class = class(&bridge, "test_package.submodule", "SubmoduleClass");

    let raw = raw_instance(&space, "test_package", "PackageClass", vec![]);
    assert!(!sub_class.is_instance(&Entity::Object(Object::Remote(raw))));

    let root = space.connection().root().unwrap();
    let import = root.get_attr("import_module").unwrap();
    let sub = import
        .as_remote()
        .unwrap()
        .call(vec![Object::from("test_package.submodule")], vec![])
        .unwrap();
    let class_handle = sub.as_remote().unwrap().get_attr("SubmoduleClass").unwrap();
    let raw = class_handle.as_remote().unwrap().call(vec![], vec![]).unwrap();
    let raw = raw.as_remote().unwrap().clone();
    assert!(sub_class.is_instance(&Entity::Object(Object::Remote(Arc::clone(&raw)))));

    let adopted = sub_class.wrap(raw).unwrap();
    let product = adopted.get_attr("multiply").unwrap();
    let product = product
        .as_remote()
        .unwrap()
        .call(vec![Object::from(21i64)], vec![])
        .unwrap();
    assert_eq!(product.as_int(), Some(42));
}

#[test]
fn test_wrap_rejects_foreign_instances() {
    let space = sample_space();
    let bridge = forced(&space, &["sample_module", "advanced_classes"]);
    let simple = class(&bridge, "sample_module", "SimpleClass");
    let raw = raw_instance(&space, "advanced_classes", "PropertyClass", vec![]);
    assert!(simple.wrap(raw).is_err());
}

// ---------------------------------------------------------------------------
// Stand-in instances
// ---------------------------------------------------------------------------

#[test]
fn test_computed_attribute_is_forwarded() {
    let space = sample_space();
    let bridge = forced(&space, &["sample_module"]);
    let simple = class(&bridge, "sample_module", "SimpleClass");

    let instance = simple.instantiate(vec![Object::from(5i64)], vec![]).unwrap();
    assert_eq!(instance.get_attr("doubled").unwrap().as_int(), Some(10));

    instance.set_attr("value", Object::from(7i64)).unwrap();
    assert_eq!(instance.get_attr("doubled").unwrap().as_int(), Some(14));
    assert_eq!(instance.to_str().unwrap(), "SimpleClass(7)");
}

#[test]
fn test_keyword_arguments_reach_the_constructor() {
    let space = sample_space();
    let bridge = forced(&space, &["advanced_classes"]);
    let derived = class(&bridge, "advanced_classes", "DerivedClass");

    let instance = derived
        .instantiate(
            vec![],
            vec![
                ("value".to_string(), Object::from(3i64)),
                ("extra".to_string(), Object::from(4i64)),
            ],
        )
        .unwrap();
    assert_eq!(instance.get_attr("computed_property").unwrap().as_int(), Some(7));
    let method = instance.get_attr("base_method").unwrap();
    let greeting = method.as_remote().unwrap().call(vec![], vec![]).unwrap();
    assert_eq!(greeting.as_str(), Some("derived: 3"));
}

#[test]
fn test_private_attribute_overlay() {
    let space = sample_space();
    let bridge = forced(&space, &["advanced_classes"]);
    let property = class(&bridge, "advanced_classes", "PropertyClass");
    let instance = property.instantiate(vec![], vec![]).unwrap();

    instance.set_attr("_private", Object::from(7i64)).unwrap();
    assert_eq!(instance.get_attr("_private").unwrap().as_int(), Some(7));
    assert_eq!(instance.overlay_names(), vec!["_private".to_string()]);
    // The remote object kept its own value.
    assert_eq!(instance.get_attr("read_only").unwrap().as_int(), Some(100));

    instance.set_attr("read_write", Object::from(5i64)).unwrap();
    assert_eq!(instance.get_attr("read_only").unwrap().as_int(), Some(105));
}

#[test]
fn test_private_attribute_overlay_can_be_disabled() {
    let space = sample_space();
    let config = BridgeConfig {
        forced: vec!["advanced_classes".to_string()],
        allow_private_attribute_fallback: false,
        ..Default::default()
    };
    let bridge = bridge_over(&space, config);
    let property = class(&bridge, "advanced_classes", "PropertyClass");
    let instance = property.instantiate(vec![], vec![]).unwrap();

    let err = instance.set_attr("_private", Object::from(7i64)).unwrap_err();
    assert_eq!(err.remote_kind(), Some(RemoteErrorKind::AccessDenied));
    assert!(instance.overlay_names().is_empty());
}

#[test]
fn test_forwarding_errors_keep_their_kind() {
    let space = sample_space();
    let bridge = forced(&space, &["sample_module"]);
    let simple = class(&bridge, "sample_module", "SimpleClass");
    let instance = simple.instantiate(vec![Object::from(1i64)], vec![]).unwrap();

    let err = instance.get_attr("no_such_thing").unwrap_err();
    assert!(err.is_attribute_error());
    assert!(err.to_string().contains("proxy forwarding failed for 'no_such_thing'"));

    let err = instance.len().unwrap_err();
    assert_eq!(err.remote_kind(), Some(RemoteErrorKind::Type));
}

#[test]
fn test_bookkeeping_names() {
    let space = sample_space();
    let bridge = forced(&space, &["sample_module"]);
    let simple = class(&bridge, "sample_module", "SimpleClass");
    let a = simple.instantiate(vec![Object::from(1i64)], vec![]).unwrap();
    let b = simple.instantiate(vec![Object::from(2i64)], vec![]).unwrap();

    let remote_class = a.get_attr("_remote_class").unwrap();
    assert!(remote_class.same_as(&Object::Remote(Arc::clone(simple.remote_class()))));
    assert!(a.set_attr("_remote_class", Object::from(1i64)).is_err());

    let b_handle = b.get_attr("_remote_instance").unwrap();
    a.set_attr("_remote_instance", b_handle).unwrap();
    assert_eq!(a.get_attr("value").unwrap().as_int(), Some(2));
}

#[test]
fn test_protocol_operations_are_forwarded() {
    let space = sample_space();
    let bridge = forced(&space, &["advanced_classes"]);
    let container = class(&bridge, "advanced_classes", "Container");
    let items = Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);

    let c = container
        .instantiate(vec![Object::Value(items.clone())], vec![])
        .unwrap();
    assert_eq!(c.len().unwrap(), 3);
    assert!(c.truthy().unwrap());
    assert_eq!(c.get_item(Object::from(1i64)).unwrap().as_int(), Some(2));

    c.set_item(Object::from(1i64), Object::from(20i64)).unwrap();
    let values: Vec<i64> = c.iter().unwrap().iter().filter_map(Object::as_int).collect();
    assert_eq!(values, vec![1, 20, 3]);

    let err = c.get_item(Object::from(10i64)).unwrap_err();
    assert_eq!(err.remote_kind(), Some(RemoteErrorKind::Index));

    assert_eq!(c.call(vec![Object::from(4i64)], vec![]).unwrap().as_int(), Some(4));
    assert_eq!(c.to_str().unwrap(), "Container([1, 20, 3, 4])");
    assert!(c.repr().unwrap().starts_with("<RemoteProxy for <advanced_classes.Container object"));
    assert_eq!(c.hash_value().unwrap(), 4 * 31);

    let empty = container.instantiate(vec![], vec![]).unwrap();
    assert!(!empty.truthy().unwrap());
    assert!(empty.is_empty().unwrap());
}

#[test]
fn test_equality_unwraps_stand_ins() {
    let space = sample_space();
    let bridge = forced(&space, &["advanced_classes"]);
    let container = class(&bridge, "advanced_classes", "Container");
    let items = || Object::Value(Value::List(vec![Value::Int(1)]));

    let a = container.instantiate(vec![items()], vec![]).unwrap();
    let b = container.instantiate(vec![items()], vec![]).unwrap();
    let c = container.instantiate(vec![], vec![]).unwrap();
    assert!(a.equals(&Entity::Instance(Arc::clone(&b))).unwrap());
    assert!(!a.equals(&Entity::Instance(c)).unwrap());
    assert!(a.equals(&Entity::Object(items())).unwrap());
}

// ---------------------------------------------------------------------------
// Classes
// ---------------------------------------------------------------------------

#[test]
fn test_class_level_access() {
    let space = sample_space();
    let bridge = forced(&space, &["advanced_classes"]);
    let base = class(&bridge, "advanced_classes", "BaseClass");
    let derived = class(&bridge, "advanced_classes", "DerivedClass");

    assert_eq!(base.module(), "advanced_classes.proxies");
    let helper = base.get_attr("static_helper").unwrap();
    let result = helper.as_remote().unwrap().call(vec![Object::from(3i64)], vec![]).unwrap();
    assert_eq!(result.as_int(), Some(300));

    let attr = derived.get_attr("base_attr").unwrap();
    assert_eq!(attr.as_str(), Some("base_value"));

    let factory = derived.get_attr("create_default").unwrap();
    let made = factory.as_remote().unwrap().call(vec![], vec![]).unwrap();
    let made = derived.wrap(made.as_remote().unwrap().clone()).unwrap();
    assert_eq!(made.get_attr("value").unwrap().as_int(), Some(42));

    let err = base.get_attr("missing").unwrap_err();
    assert!(err.is_attribute_error());
    assert!(err.to_string().contains("type object 'BaseClass' has no attribute 'missing'"));
}

#[test]
fn test_builtin_category_classes_pass_through() {
    let space = sample_space();
    let bridge = forced(&space, &["advanced_classes"]);
    let color = bridge.import_from("advanced_classes", "Color").unwrap();
    assert!(color.as_class().is_none());
    let red = color.as_object().unwrap().as_remote().unwrap().get_attr("RED").unwrap();
    assert_eq!(red.as_int(), Some(1));
}

// ---------------------------------------------------------------------------
// Laziness and packages
// ---------------------------------------------------------------------------

#[test]
fn test_deep_package_resolves_lazily() {
    let space = sample_space();
    let bridge = forced(&space, &["nested_package"]);

    let sub = bridge.import("nested_package.sub").unwrap();
    assert!(sub.is_package());
    assert_eq!(sub.package().as_deref(), Some("nested_package.sub"));
    assert!(sub.attr_names().is_empty());
    assert!(bridge
        .generator()
        .cached("nested_package.sub.deep_module")
        .is_none());

    let deep = sub.get_attr("deep_module").unwrap();
    let deep = deep.as_module().unwrap();
    assert!(!deep.is_package());
    assert_eq!(deep.package().as_deref(), Some("nested_package.sub"));
    assert!(deep.attr_names().is_empty());

    let func = deep.get_attr("deep_function").unwrap();
    assert_eq!(call(&func, vec![Object::from("x")]).as_str(), Some("deep: x"));
    assert_eq!(deep.attr_names(), vec!["deep_function".to_string()]);

    let again = bridge.import("nested_package.sub.deep_module").unwrap();
    assert!(Arc::ptr_eq(deep, &again));

    let deep_class = bridge
        .import_from("nested_package.sub.deep_module", "DeepClass")
        .unwrap();
    let instance = deep_class.as_class().unwrap().instantiate(vec![], vec![]).unwrap();
    let method = instance.get_attr("get_deep").unwrap();
    let value = method.as_remote().unwrap().call(vec![], vec![]).unwrap();
    assert_eq!(value.as_str(), Some("very deep"));
}

#[test]
fn test_dunder_names_never_resolve_remotely() {
    let space = sample_space();
    let bridge = forced(&space, &["sample_module"]);
    let module = bridge.import("sample_module").unwrap();
    let err = module.get_attr("__all__").unwrap_err();
    assert!(err.is_attribute_error());
    let err = module.get_attr("nothing_here").unwrap_err();
    assert!(err.is_attribute_error());
}

#[test]
fn test_import_from_missing_name() {
    let space = sample_space();
    let bridge = bridge_over(&space, BridgeConfig::default());
    let err = bridge.import_from("test_package", "does_not_exist").unwrap_err();
    assert!(matches!(err, BridgeError::CannotImportName { .. }), "got {err:?}");

    // A forced root reports the failed remote lookup instead.
    let space = sample_space();
    let bridge = forced(&space, &["test_package"]);
    let err = bridge.import_from("test_package", "does_not_exist").unwrap_err();
    assert_eq!(err.remote_kind(), Some(RemoteErrorKind::Import));
}

#[test]
fn test_private_module_member_keeps_refusal() {
    let space = ObjectSpace::new();
    let vault = ModuleBuilder::new("vault")
        .attr("_secret", 1i64)
        .attr("shown", 2i64)
        .build(&space);
    space.expose("vault", vault);
    let bridge = forced(&space, &["vault"]);
    let module = bridge.import("vault").unwrap();

    let shown = module.get_attr("shown").unwrap();
    assert_eq!(shown.as_object().and_then(Object::as_int), Some(2));

    let err = module.get_attr("_secret").unwrap_err();
    assert_eq!(err.remote_kind(), Some(RemoteErrorKind::AccessDenied), "got {err:?}");
    let msg = err.to_string();
    assert!(msg.contains("vault._secret"), "{msg}");
    assert!(msg.contains("cannot access private attribute '_secret'"), "{msg}");
}

// ---------------------------------------------------------------------------
// Unexpected remote failures
// ---------------------------------------------------------------------------

#[test]
fn test_internal_failure_is_wrapped_for_forced_roots() {
    let space = failing_import_space();
    let bridge = forced(&space, &["rootpkg"]);
    bridge.import("rootpkg").unwrap();

    let err = bridge.import("rootpkg.child").unwrap_err();
    assert!(!err.is_module_not_found());
    match &err {
        BridgeError::Import { path, message } => {
            assert_eq!(path, "rootpkg.child");
            assert!(message.contains("kaboom"), "{message}");
        }
        other => panic!("expected import error, got {other:?}"),
    }
    let msg = err.to_string();
    assert!(msg.contains("rootpkg.child") && msg.contains("kaboom"), "{msg}");
}

#[test]
fn test_internal_failure_is_wrapped_for_discovered_roots() {
    let space = failing_import_space();
    let bridge = bridge_over(&space, BridgeConfig::default());
    bridge.import("rootpkg").unwrap();
    assert_eq!(bridge.root_state("rootpkg"), Some(RootState::ConfirmedRemote));

    let err = bridge.import("rootpkg.child").unwrap_err();
    assert!(!err.is_module_not_found());
    match &err {
        BridgeError::Import { path, message } => {
            assert_eq!(path, "rootpkg.child");
            assert!(message.contains("kaboom"), "{message}");
        }
        other => panic!("expected import error, got {other:?}"),
    }
    // A failure is not an absence.
    assert_eq!(bridge.root_state("rootpkg"), Some(RootState::ConfirmedRemote));
}

#[test]
fn test_parent_placeholders() {
    let space = sample_space();
    let config = BridgeConfig {
        forced: vec!["nested_package".to_string(), "phantom".to_string()],
        create_parent_modules: true,
        ..Default::default()
    };
    let bridge = bridge_over(&space, config);

    let placeholder = bridge.imports().get("phantom").unwrap();
    assert!(placeholder.is_package());
    assert_eq!(placeholder.package().as_deref(), Some("phantom"));

    // Children still resolve remotely beneath the placeholder.
    let sub = bridge.import("nested_package.sub").unwrap();
    assert_eq!(sub.file().as_deref(), Some("<proxy for nested_package.sub>"));
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn test_uninstall_stops_resolution() {
    let space = sample_space();
    let bridge = forced(&space, &["sample_module", "advanced_classes"]);
    bridge.import("sample_module").unwrap();
    bridge.uninstall();
    bridge.uninstall();

    // Already-loaded modules stay; new ones are no longer found.
    assert!(bridge.import("sample_module").is_ok());
    assert!(bridge.import("advanced_classes").unwrap_err().is_module_not_found());
}

#[test]
fn test_scoped_installation() {
    let space = sample_space();
    let config = BridgeConfig {
        forced: vec!["sample_module".to_string()],
        ..Default::default()
    };
    let bridge =
        Bridge::with_config(space.connection(), Arc::new(ImportSystem::new()), config).unwrap();
    {
        let _guard = bridge.install_scoped().unwrap();
        assert!(bridge.import("sample_module").is_ok());
    }
    assert!(!bridge.is_installed());
}

#[test]
fn test_unforce_and_clear() {
    let space = sample_space();
    let bridge = forced(&space, &["sample_module", "test_package"]);
    bridge.unforce(["sample_module", "never_forced"]);
    assert_eq!(bridge.root_state("sample_module"), None);
    bridge.clear_forced();
    assert!(bridge.registered_roots().is_empty());
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[test]
fn test_concurrent_first_access_fabricates_once() {
    let space = sample_space();
    let bridge = forced(&space, &["sample_module"]);
    let module = bridge.import("sample_module").unwrap();

    const THREADS: usize = 8;
    let barrier = Barrier::new(THREADS);
    let results: Vec<Entity> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    module.get_attr("SimpleClass").unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(bridge.type_mapper().len(), 1);
    for entity in &results[1..] {
        assert!(entity.same_as(&results[0]));
    }
}
