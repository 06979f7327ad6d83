//! Resolution hook: the finder and loader a bridge installs.
//!
//! The finder decides per dotted name whether the bridge handles it and how
//! strictly: forced roots fail loudly, auto-discovered roots decline quietly
//! and are remembered as absent. The loader fills the host module from the
//! stand-in module the generator produced.

use crate::bridge::BridgeShared;
use crate::eligibility::RootState;
use crate::generator::{is_module_shaped, ProxyGenerator};
use crate::host::{Finder, ImportSystem, Loader, Module, ModuleSpec};
use crate::proxy::Entity;
use portal_types::{BridgeError, BridgeResult, Object, RemoteError, RemoteErrorKind, IMPORT_MODULE};
use std::sync::{Arc, Weak};
use tracing::{debug, info};

/// Top-level segment of a dotted name.
pub fn root_name(fullname: &str) -> &str {
    fullname.split('.').next().unwrap_or(fullname)
}

/// Outcome of a remote lookup that did not fail outright.
enum Lookup {
    Found(Object),
    Decline,
}

/// Finder consulting the remote side.
pub struct RemoteFinder {
    id: String,
    shared: Arc<BridgeShared>,
}

impl RemoteFinder {
    pub(crate) fn new(shared: Arc<BridgeShared>) -> Self {
        Self {
            id: format!("portal-remote-{}", uuid::Uuid::new_v4()),
            shared,
        }
    }

    /// Strictness for `fullname`, or `None` to decline.
    fn strictness(&self, fullname: &str, imports: &ImportSystem) -> BridgeResult<Option<bool>> {
        let root = root_name(fullname);
        match self.shared.eligibility.state(root) {
            Some(RootState::Forced) => Ok(Some(true)),
            Some(RootState::ConfirmedRemote) => Ok(Some(false)),
            Some(RootState::ConfirmedAbsent) => {
                debug!(module = %fullname, "Root known absent, declining");
                Ok(None)
            }
            None => {
                if !self.shared.config.auto_discover_missing {
                    return Ok(None);
                }
                if root != fullname && imports.get(root).is_some() {
                    return Ok(None);
                }
                if imports.find_spec_excluding(fullname, &self.id)?.is_some() {
                    debug!(module = %fullname, "Satisfiable locally, not probing remote");
                    return Ok(None);
                }
                Ok(Some(false))
            }
        }
    }

    fn lookup(&self, fullname: &str, strict: bool) -> BridgeResult<Lookup> {
        let connection = &self.shared.connection;
        if connection.is_closed() {
            return Err(BridgeError::ConnectionClosed);
        }
        let root = connection.root().map_err(|e| unexpected(fullname, e))?;

        let result = if fullname.contains('.') {
            let capability = match root.has_attr(IMPORT_MODULE) {
                Ok(true) => root.get_attr(IMPORT_MODULE).map_err(|e| unexpected(fullname, e))?,
                Ok(false) => {
                    if strict {
                        return Err(BridgeError::Configuration(format!(
                            "cannot resolve '{fullname}': the remote service must expose \
                             `{IMPORT_MODULE}(dotted_path: str) -> module` on its root object"
                        )));
                    }
                    debug!(module = %fullname, capability = IMPORT_MODULE, "Remote lacks import capability, declining");
                    return Ok(Lookup::Decline);
                }
                Err(e) => return Err(unexpected(fullname, e)),
            };
            match capability.as_remote() {
                Some(import) => import.call(vec![Object::from(fullname)], Vec::new()),
                None => Err(RemoteError::type_error(format!("{IMPORT_MODULE} is not callable"))),
            }
        } else {
            root.get_attr(fullname)
        };

        match result {
            Ok(found) => Ok(Lookup::Found(found)),
            Err(e) if e.is_lookup_failure() => {
                if strict {
                    return Err(BridgeError::Lookup {
                        path: fullname.to_string(),
                        source: e,
                    });
                }
                self.shared.eligibility.mark_absent(root_name(fullname));
                debug!(module = %fullname, error = %e, "Remote lookup found nothing, declining");
                Ok(Lookup::Decline)
            }
            Err(e) => Err(unexpected(fullname, e)),
        }
    }

    /// A lenient root that resolved to something other than a module is
    /// never probed again.
    fn remember_non_module(&self, fullname: &str, strict: bool) {
        if !strict && !fullname.contains('.') {
            self.shared.eligibility.mark_absent(fullname);
        }
    }
}

fn unexpected(fullname: &str, e: RemoteError) -> BridgeError {
    if e.kind == RemoteErrorKind::Connection {
        return BridgeError::ConnectionClosed;
    }
    BridgeError::Import {
        path: fullname.to_string(),
        message: format!("remote lookup failed: {e}"),
    }
}

impl Finder for RemoteFinder {
    fn id(&self) -> &str {
        &self.id
    }

    fn find_spec(&self, fullname: &str, imports: &ImportSystem) -> BridgeResult<Option<ModuleSpec>> {
        let Some(strict) = self.strictness(fullname, imports)? else {
            return Ok(None);
        };
        let handle = match self.lookup(fullname, strict)? {
            Lookup::Found(Object::Remote(handle)) => handle,
            Lookup::Found(Object::Value(v)) => {
                debug!(module = %fullname, kind = v.type_name(), "Remote value is not a module, declining");
                self.remember_non_module(fullname, strict);
                return Ok(None);
            }
            Lookup::Decline => return Ok(None),
        };
        if !is_module_shaped(&handle).map_err(|e| unexpected(fullname, e))? {
            debug!(module = %fullname, "Remote object is not module-shaped, declining");
            self.remember_non_module(fullname, strict);
            return Ok(None);
        }

        self.shared.eligibility.mark_remote(root_name(fullname));
        let module = self
            .shared
            .generator
            .create_proxy_module(&handle, fullname)?;
        let is_package = module.is_package();
        info!(module = %fullname, package = is_package, strict, "Remote module found");
        Ok(Some(ModuleSpec {
            name: fullname.to_string(),
            loader: Arc::new(RemoteLoader {
                generator: Arc::downgrade(&self.shared.generator),
                name: fullname.to_string(),
            }),
            origin: module.file(),
            is_package,
            search_locations: is_package.then(Vec::new),
        }))
    }
}

/// Loader filling a host module from the generator's stand-in.
struct RemoteLoader {
    generator: Weak<ProxyGenerator>,
    name: String,
}

impl RemoteLoader {
    fn generator(&self) -> BridgeResult<Arc<ProxyGenerator>> {
        self.generator.upgrade().ok_or_else(|| BridgeError::Import {
            path: self.name.clone(),
            message: "the bridge that found this module is gone".to_string(),
        })
    }
}

impl Loader for RemoteLoader {
    fn create_module(&self, spec: &ModuleSpec) -> BridgeResult<Option<Arc<Module>>> {
        Ok(self.generator()?.cached_module(&spec.name))
    }

    fn exec_module(&self, module: &Arc<Module>) -> BridgeResult<()> {
        let generator = self.generator()?;
        let produced = generator
            .cached_module(&self.name)
            .ok_or_else(|| BridgeError::Import {
                path: self.name.clone(),
                message: "no proxy module was generated".to_string(),
            })?;
        if !Arc::ptr_eq(&produced, module) {
            module.populate_from(&produced);
            generator.adopt(&self.name, Entity::Module(Arc::clone(module)));
        }
        let package = if module.is_package() {
            self.name.clone()
        } else {
            self.name
                .rsplit_once('.')
                .map(|(parent, _)| parent.to_string())
                .unwrap_or_default()
        };
        module.set_package(package);
        debug!(module = %self.name, "Populated remote module");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_name() {
        assert_eq!(root_name("pkg.sub.deep"), "pkg");
        assert_eq!(root_name("flat"), "flat");
    }
}
