//! Type identity mapper.
//!
//! Records, for every fabricated proxy class, the remote type it stands for.
//! Membership checks against raw remote handles become a table lookup plus
//! name comparison: the RPC layer may decorate type names it reports (for
//! example with a `netref` prefix), so dotted suffixes count as matches.

use crate::proxy::Entity;
use dashmap::DashMap;
use portal_types::TypeInfo;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Identifier of a fabricated proxy class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProxyTypeId(u64);

impl ProxyTypeId {
    /// Allocate a fresh id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ProxyTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "proxy-type-{}", self.0)
    }
}

/// The remote identity of a proxy class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeIdentity {
    /// Remote module path.
    pub module: String,
    /// Remote simple name.
    pub name: String,
    /// `module.name`.
    pub qualified_name: String,
}

impl TypeIdentity {
    fn new(module: &str, name: &str) -> Self {
        let qualified_name = if module.is_empty() {
            name.to_string()
        } else {
            format!("{module}.{name}")
        };
        Self {
            module: module.to_string(),
            name: name.to_string(),
            qualified_name,
        }
    }

    /// Whether a remotely advertised type refers to this identity.
    pub fn matches(&self, remote: &TypeInfo) -> bool {
        let remote_fqn = remote.qualified_name();
        remote_fqn == self.qualified_name
            || is_dotted_suffix(&remote_fqn, &self.qualified_name)
            || remote.name == self.name
            || is_dotted_suffix(&remote.name, &self.name)
    }
}

fn is_dotted_suffix(candidate: &str, suffix: &str) -> bool {
    candidate
        .strip_suffix(suffix)
        .is_some_and(|head| head.ends_with('.'))
}

/// Bidirectional table between proxy classes and remote type identities.
///
/// Entries live as long as the mapper and are never removed.
pub struct TypeMapper {
    identities: DashMap<ProxyTypeId, TypeIdentity>,
    by_name: DashMap<String, ProxyTypeId>,
}

impl TypeMapper {
    /// Create an empty mapper.
    pub fn new() -> Self {
        Self {
            identities: DashMap::new(),
            by_name: DashMap::new(),
        }
    }

    /// Record that `id` stands for `module.name` remotely.
    ///
    /// Re-registering the same identity is harmless. A conflicting
    /// re-registration keeps the first identity and returns `false`.
    pub fn register(&self, id: ProxyTypeId, module: &str, name: &str) -> bool {
        let identity = TypeIdentity::new(module, name);
        if let Some(existing) = self.identities.get(&id) {
            if *existing != identity {
                warn!(
                    %id,
                    existing = %existing.qualified_name,
                    requested = %identity.qualified_name,
                    "Conflicting proxy type registration ignored"
                );
                return false;
            }
            return true;
        }
        debug!(%id, remote = %identity.qualified_name, "Registered proxy type");
        self.by_name
            .entry(identity.qualified_name.clone())
            .or_insert(id);
        self.identities.insert(id, identity);
        true
    }

    /// Remote identity of a proxy class.
    pub fn identity(&self, id: ProxyTypeId) -> Option<TypeIdentity> {
        self.identities.get(&id).map(|i| i.value().clone())
    }

    /// Proxy class registered for a remote fully-qualified name.
    pub fn proxy_for(&self, qualified_name: &str) -> Option<ProxyTypeId> {
        self.by_name.get(qualified_name).map(|id| *id.value())
    }

    /// Number of registered proxy classes.
    pub fn len(&self) -> usize {
        self.identities.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// Whether `entity` is a raw cross-process handle rather than local data
    /// or an already fabricated stand-in.
    pub fn is_remote_handle(&self, entity: &Entity) -> bool {
        matches!(entity, Entity::Object(obj) if obj.is_remote_handle())
    }

    /// Type membership of `entity` in proxy class `id`.
    ///
    /// A stand-in instance matches only its own class. A raw remote handle
    /// matches when its advertised type refers to the registered identity.
    /// Reflection failures count as non-membership.
    pub fn check_membership(&self, entity: &Entity, id: ProxyTypeId) -> bool {
        match entity {
            Entity::Instance(instance) => instance.class().id() == id,
            Entity::Object(obj) => {
                let Some(handle) = obj.as_remote() else {
                    return false;
                };
                let Some(identity) = self.identity(id) else {
                    return false;
                };
                match handle.type_of() {
                    Ok(remote) => {
                        let hit = identity.matches(&remote);
                        if !hit {
                            debug!(
                                expected = %identity.qualified_name,
                                actual = %remote.qualified_name(),
                                "Membership check failed"
                            );
                        }
                        hit
                    }
                    Err(e) => {
                        debug!(error = %e, %id, "Membership check could not reflect on handle");
                        false
                    }
                }
            }
            Entity::Class(_) | Entity::Module(_) => false,
        }
    }
}

impl Default for TypeMapper {
    fn default() -> Self {
        Self::new()
    }
}
