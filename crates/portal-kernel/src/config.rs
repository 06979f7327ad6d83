//! Bridge configuration loading from `~/.portal/config.toml` with defaults.
//!
//! A config file may list other TOML files under `include`. Includes are
//! merged first, in order; the including file overrides them.

use portal_types::BridgeConfig;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use tracing::{info, warn};

/// Maximum include nesting depth.
const MAX_INCLUDE_DEPTH: u32 = 10;

/// Load bridge configuration, falling back to defaults on any problem.
///
/// A missing file is not an error. An unreadable or malformed file, or a
/// broken include chain, is logged and yields the defaults.
pub fn load_config(path: Option<&Path>) -> BridgeConfig {
    let config_path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(default_config_path);

    if !config_path.exists() {
        info!(path = %config_path.display(), "Config file not found, using defaults");
        return BridgeConfig::default();
    }

    let merged = match read_with_includes(&config_path) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, path = %config_path.display(), "Failed to load config, using defaults");
            return BridgeConfig::default();
        }
    };

    match merged.try_into::<BridgeConfig>() {
        Ok(config) => {
            info!(path = %config_path.display(), forced = ?config.forced, "Loaded bridge configuration");
            config
        }
        Err(e) => {
            warn!(
                error = %e,
                path = %config_path.display(),
                "Config does not describe a bridge, using defaults"
            );
            BridgeConfig::default()
        }
    }
}

/// Read `path` and fold its includes in beneath it.
fn read_with_includes(path: &Path) -> Result<toml::Value, String> {
    let mut visited = HashSet::new();
    visited.insert(std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf()));
    let contents = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read '{}': {e}", path.display()))?;
    let value: toml::Value = toml::from_str(&contents)
        .map_err(|e| format!("cannot parse '{}': {e}", path.display()))?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    merge_includes(value, dir, &mut visited, 0)
}

fn merge_includes(
    mut value: toml::Value,
    dir: &Path,
    visited: &mut HashSet<PathBuf>,
    depth: u32,
) -> Result<toml::Value, String> {
    if depth > MAX_INCLUDE_DEPTH {
        return Err(format!("include depth exceeds {MAX_INCLUDE_DEPTH}"));
    }
    let includes = take_includes(&mut value)?;
    if includes.is_empty() {
        return Ok(value);
    }

    let mut merged = toml::Value::Table(toml::map::Map::new());
    for include in &includes {
        let resolved = resolve_include(dir, include)?;
        if !visited.insert(resolved.clone()) {
            return Err(format!("circular include '{include}'"));
        }
        info!(include = %include, "Loading config include");
        let contents = std::fs::read_to_string(&resolved)
            .map_err(|e| format!("cannot read include '{include}': {e}"))?;
        let child: toml::Value = toml::from_str(&contents)
            .map_err(|e| format!("cannot parse include '{include}': {e}"))?;
        let child_dir = resolved.parent().unwrap_or(dir).to_path_buf();
        let child = merge_includes(child, &child_dir, visited, depth + 1)?;
        deep_merge_toml(&mut merged, &child);
    }
    deep_merge_toml(&mut merged, &value);
    Ok(merged)
}

/// Remove and return the `include` list of a table.
fn take_includes(value: &mut toml::Value) -> Result<Vec<String>, String> {
    let Some(table) = value.as_table_mut() else {
        return Ok(Vec::new());
    };
    match table.remove("include") {
        None => Ok(Vec::new()),
        Some(toml::Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                toml::Value::String(s) => Ok(s),
                other => Err(format!("include entries must be strings, got {other}")),
            })
            .collect(),
        Some(other) => Err(format!("include must be an array, got {other}")),
    }
}

/// Resolve an include relative to `dir`, refusing anything that leaves it.
fn resolve_include(dir: &Path, include: &str) -> Result<PathBuf, String> {
    let relative = Path::new(include);
    if relative.is_absolute() {
        return Err(format!("include rejects absolute path '{include}'"));
    }
    if relative
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(format!("include rejects path traversal '{include}'"));
    }
    let resolved = std::fs::canonicalize(dir.join(relative))
        .map_err(|e| format!("include '{include}' cannot be resolved: {e}"))?;
    let root = std::fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
    if !resolved.starts_with(&root) {
        return Err(format!("include '{include}' escapes the config directory"));
    }
    Ok(resolved)
}

/// Deep-merge two TOML values. `overlay` wins; tables merge key by key.
pub fn deep_merge_toml(base: &mut toml::Value, overlay: &toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_tbl), toml::Value::Table(overlay_tbl)) => {
            for (key, overlay_val) in overlay_tbl {
                match base_tbl.get_mut(key) {
                    Some(base_val) => deep_merge_toml(base_val, overlay_val),
                    None => {
                        base_tbl.insert(key.clone(), overlay_val.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

/// The Portal home directory, `~/.portal`.
pub fn portal_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".portal")
}

/// Default config file path.
pub fn default_config_path() -> PathBuf {
    portal_home().join("config.toml")
}
