//! import, get, call, new.

use crate::cmd::session::{describe, parse_arg, render_object, report, Session};
use crate::ui;
use portal_kernel::{hook::root_name, Entity};
use portal_types::{BridgeError, Object};

pub fn cmd_import(session: &Session, modules: &[String], json: bool) -> bool {
    let bridge = &session.bridge;
    let mut ok = true;
    let mut out = Vec::new();
    for name in modules {
        match bridge.import(name) {
            Ok(module) => {
                let state = bridge.root_state(root_name(name));
                if json {
                    out.push(serde_json::json!({
                        "name": module.name(),
                        "file": module.file(),
                        "package": module.package(),
                        "is_package": module.is_package(),
                        "root_state": state,
                        "loaded_attributes": module.attr_names(),
                    }));
                    continue;
                }
                ui::section(module.name());
                ui::kv("File", module.file().as_deref().unwrap_or("-"));
                ui::kv(
                    "Kind",
                    if module.is_package() { "package" } else { "module" },
                );
                ui::kv("Package", module.package().as_deref().unwrap_or("-"));
                match state {
                    Some(state) => ui::kv_ok("Root", &format!("{state:?}")),
                    None => ui::kv("Root", "local"),
                }
                ui::blank();
            }
            Err(e) => {
                ok = false;
                if json {
                    out.push(serde_json::json!({ "name": name, "error": e.to_string() }));
                } else {
                    report(&e);
                }
            }
        }
    }
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&out).unwrap_or_default()
        );
    }
    ok
}

pub fn cmd_get(session: &Session, module: &str, name: &str) -> bool {
    match session.bridge.import_from(module, name) {
        Ok(entity) => {
            println!("{}", describe(&entity));
            if let Entity::Class(class) = &entity {
                ui::kv("Type id", &class.id().to_string());
            }
            true
        }
        Err(e) => {
            report(&e);
            false
        }
    }
}

fn call_entity(entity: &Entity, args: Vec<Object>) -> Result<String, BridgeError> {
    match entity {
        Entity::Class(class) => Ok(describe(&Entity::Instance(class.instantiate(args, Vec::new())?))),
        Entity::Instance(instance) => Ok(render_object(&instance.call(args, Vec::new())?)),
        Entity::Object(Object::Remote(handle)) => Ok(render_object(&handle.call(args, Vec::new())?)),
        other => Err(BridgeError::InvalidInput(format!(
            "a {} is not callable",
            other.kind_name()
        ))),
    }
}

pub fn cmd_call(session: &Session, module: &str, name: &str, args: &[String]) -> bool {
    let args: Vec<Object> = args.iter().map(|a| parse_arg(a)).collect();
    let result = session
        .bridge
        .import_from(module, name)
        .and_then(|entity| call_entity(&entity, args));
    match result {
        Ok(rendered) => {
            println!("{rendered}");
            true
        }
        Err(e) => {
            report(&e);
            false
        }
    }
}

pub fn cmd_new(
    session: &Session,
    module: &str,
    class: &str,
    args: &[String],
    attrs: &[String],
) -> bool {
    let entity = match session.bridge.import_from(module, class) {
        Ok(entity) => entity,
        Err(e) => {
            report(&e);
            return false;
        }
    };
    let Some(class) = entity.as_class() else {
        ui::error(&format!(
            "'{module}.{class}' is a {}, not a proxied class",
            entity.kind_name()
        ));
        return false;
    };
    let args: Vec<Object> = args.iter().map(|a| parse_arg(a)).collect();
    let instance = match class.instantiate(args, Vec::new()) {
        Ok(instance) => instance,
        Err(e) => {
            report(&e);
            return false;
        }
    };

    ui::section(&describe(&Entity::Instance(instance.clone())));
    if let Ok(text) = instance.to_str() {
        ui::kv("str", &text);
    }
    let mut ok = true;
    for attr in attrs {
        match instance.get_attr(attr) {
            Ok(value) => ui::kv(attr, &render_object(&value)),
            Err(e) => {
                ok = false;
                report(&e);
            }
        }
    }
    ok
}
