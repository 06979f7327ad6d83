//! Service and bridge setup shared by every subcommand.

use crate::cli::BridgeArgs;
use crate::ui;
use portal_kernel::{Bridge, Entity, ImportSystem};
use portal_types::{BridgeConfig, BridgeError, Object, Value};
use portal_wire::{sample_space_with, ObjectSpace, SpaceOptions};
use std::sync::Arc;

/// A served sample service plus an installed bridge.
pub struct Session {
    pub space: ObjectSpace,
    pub bridge: Bridge,
}

/// Command-line flags override the config file.
fn apply_args(mut config: BridgeConfig, args: &BridgeArgs) -> BridgeConfig {
    for root in &args.force {
        if !config.forced.contains(root) {
            config.forced.push(root.clone());
        }
    }
    if args.no_discover {
        config.auto_discover_missing = false;
    }
    if args.strict_private {
        config.allow_private_attribute_fallback = false;
    }
    if args.parent_modules {
        config.create_parent_modules = true;
    }
    config
}

/// Serve the bundled service and install a bridge over it. Exits on a
/// configuration the bridge refuses.
pub fn boot(config: BridgeConfig, args: &BridgeArgs, explicit_config: bool) -> Session {
    let config = apply_args(config, args);
    let space = sample_space_with(SpaceOptions {
        expose_import_module: !args.no_import_capability,
        ..Default::default()
    });

    let bridge = match Bridge::with_config(space.connection(), Arc::new(ImportSystem::new()), config)
    {
        Ok(bridge) => bridge,
        Err(e) => {
            ui::error_with_fix(&e.to_string(), "force only top-level names, e.g. --force numpy");
            std::process::exit(1);
        }
    };
    if let Err(e) = bridge.install() {
        ui::error_with_fix(&e.to_string(), "pass --force ROOT or drop --no-discover");
        if !explicit_config {
            ui::hint("config is read from ~/.portal/config.toml unless --config is given");
        }
        std::process::exit(1);
    }
    Session { space, bridge }
}

/// Parse a command-line argument as JSON; anything that is not JSON is a
/// plain string.
pub fn parse_arg(raw: &str) -> Object {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => Object::Value(value),
        Err(_) => Object::from(raw),
    }
}

/// Render a returned object for display.
pub fn render_object(obj: &Object) -> String {
    match obj {
        Object::Value(Value::Str(s)) => format!("{s:?}"),
        Object::Value(v) => v.to_string(),
        Object::Remote(r) => r
            .repr()
            .unwrap_or_else(|e| format!("<remote object #{}: {e}>", r.object_id())),
    }
}

/// One-line description of a resolved entity.
pub fn describe(entity: &Entity) -> String {
    match entity {
        Entity::Class(class) => format!(
            "proxy class {}.{} for remote '{}'",
            class.module(),
            class.name(),
            class.path()
        ),
        Entity::Module(module) => format!(
            "{} {} ({})",
            if module.is_package() { "package" } else { "module" },
            module.name(),
            module.file().unwrap_or_else(|| "no file".to_string())
        ),
        Entity::Instance(instance) => instance
            .repr()
            .unwrap_or_else(|e| format!("<stand-in for {}: {e}>", instance.class().path())),
        Entity::Object(obj) => format!("{} {}", entity.kind_name(), render_object(obj)),
    }
}

/// Print a bridge error, with a pointer at the usual cause.
pub fn report(e: &BridgeError) {
    match e {
        BridgeError::ModuleNotFound { .. } => {
            ui::error_with_fix(&e.to_string(), "force the root remote with --force ROOT")
        }
        BridgeError::Configuration(_) => ui::error_with_fix(
            &e.to_string(),
            "drop --no-import-capability so the service can import nested modules",
        ),
        _ => ui::error(&e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_override_config() {
        let args = BridgeArgs {
            force: vec!["numpy".to_string(), "numpy".to_string()],
            no_discover: true,
            strict_private: true,
            ..Default::default()
        };
        let config = apply_args(BridgeConfig::default(), &args);
        assert_eq!(config.forced, vec!["numpy".to_string()]);
        assert!(!config.auto_discover_missing);
        assert!(!config.allow_private_attribute_fallback);
        assert!(!config.create_parent_modules);
    }

    #[test]
    fn test_parse_arg() {
        assert_eq!(parse_arg("21").as_int(), Some(21));
        assert_eq!(parse_arg("\"x\"").as_str(), Some("x"));
        assert_eq!(parse_arg("hello").as_str(), Some("hello"));
        assert!(matches!(parse_arg("[1, 2]"), Object::Value(Value::List(_))));
    }

    #[test]
    fn test_render_object() {
        assert_eq!(render_object(&Object::from("a")), "\"a\"");
        assert_eq!(render_object(&Object::from(3i64)), "3");
    }
}
