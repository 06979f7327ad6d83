//! roots, ping, config.

use crate::cmd::session::Session;
use crate::ui;
use portal_types::RemoteConnection;
use portal_wire::SAMPLE_ROOTS;

pub fn cmd_roots(session: &Session, json: bool) -> bool {
    let roots = session.bridge.registered_roots();
    if json {
        let body = serde_json::json!({
            "served": SAMPLE_ROOTS,
            "bridge": roots,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );
        return true;
    }

    ui::section("Served by the sample service");
    for root in SAMPLE_ROOTS {
        println!("    {root}");
    }
    ui::blank();
    ui::section("Bridge roots");
    if roots.is_empty() {
        ui::hint("nothing forced or discovered yet; use --force ROOT or import a name");
    }
    for (name, state) in &roots {
        ui::kv(name, &format!("{state:?}"));
    }
    true
}

pub fn cmd_ping(session: &Session) -> bool {
    if session.bridge.verify_connection_alive() {
        ui::success("connection alive");
        ui::kv("Finder", session.bridge.finder_id());
        ui::kv(
            "Closed",
            &session.space.is_closed().to_string(),
        );
        true
    } else {
        ui::error("connection is not answering");
        false
    }
}

pub fn cmd_config(session: &Session) -> bool {
    let config = session.bridge.config();
    ui::section("Bridge configuration");
    ui::kv(
        "Forced",
        &if config.forced.is_empty() {
            "-".to_string()
        } else {
            config.forced.join(", ")
        },
    );
    ui::kv("Discover", &config.auto_discover_missing.to_string());
    ui::kv(
        "Private",
        if config.allow_private_attribute_fallback {
            "kept locally when refused"
        } else {
            "refused"
        },
    );
    ui::kv("Placeholders", &config.create_parent_modules.to_string());
    ui::kv("Log level", &config.log_level);
    ui::kv(
        "Default file",
        &portal_kernel::config::default_config_path()
            .display()
            .to_string(),
    );
    true
}
