//! Actor Identity Registry
//!
//! Maps an actor's string identifier to whatever the owning role keeps for
//! it: the local runtime handle on a slave, the type name on a master. Each
//! entry also records the connection it belongs to so a lost link can be
//! cleaned up in one pass.
//!
//! All operations serialize on a single lock. Removal hands the stored value
//! back to the caller, so whichever of a `DestroyActor` and a link close gets
//! there first owns the handle and releases it; the other finds nothing.

use crate::error::{RemoteError, Result};
use network::ConnectionId;
use parking_lot::Mutex;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Longest identifier the wire format can carry
pub const MAX_ACTOR_UUID_LEN: usize = u8::MAX as usize;

/// Length of an identifier from [`ActorUuid::generate`]
pub const GENERATED_UUID_LEN: usize = 36;

/// Globally unique actor identifier chosen by the master
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorUuid(String);

impl ActorUuid {
    /// Fresh random identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Validate a caller- or peer-supplied identifier
    pub fn parse(uuid: impl Into<String>) -> Result<Self> {
        let uuid = uuid.into();
        if uuid.is_empty() {
            return Err(RemoteError::invalid_identifier(uuid, "empty identifier"));
        }
        if uuid.len() > MAX_ACTOR_UUID_LEN {
            let reason = format!("{} bytes exceeds {}", uuid.len(), MAX_ACTOR_UUID_LEN);
            return Err(RemoteError::invalid_identifier(uuid, reason));
        }
        Ok(Self(uuid))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ActorUuid {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ActorUuid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<ActorUuid> for String {
    fn from(uuid: ActorUuid) -> Self {
        uuid.0
    }
}

struct Entry<V> {
    connection: ConnectionId,
    value: V,
}

/// Identifier registry keyed by [`ActorUuid`]
pub struct IdentityRegistry<V> {
    entries: Mutex<HashMap<ActorUuid, Entry<V>>>,
}

/// Slave side: identifier to the hosted actor
pub type SlaveRegistry<H> = IdentityRegistry<H>;

/// Master side: identifier to the type name it was created with
pub type MasterRegistry = IdentityRegistry<String>;

impl<V> Default for IdentityRegistry<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> IdentityRegistry<V> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Insert a new entry
    ///
    /// An identifier that is already present is left untouched and `value` is
    /// handed back.
    pub fn insert(
        &self,
        uuid: ActorUuid,
        connection: ConnectionId,
        value: V,
    ) -> std::result::Result<(), V> {
        let mut entries = self.entries.lock();
        if entries.contains_key(&uuid) {
            tracing::warn!(actor = %uuid, %connection, "Refusing duplicate actor registration");
            return Err(value);
        }
        tracing::debug!(actor = %uuid, %connection, "Registering actor");
        entries.insert(uuid, Entry { connection, value });
        Ok(())
    }

    pub fn contains(&self, uuid: &str) -> bool {
        self.entries.lock().contains_key(uuid)
    }

    /// Connection the actor was created over
    pub fn connection_of(&self, uuid: &str) -> Option<ConnectionId> {
        self.entries.lock().get(uuid).map(|entry| entry.connection)
    }

    /// Clone of the stored value; the lock is released before it is returned
    pub fn get(&self, uuid: &str) -> Option<V>
    where
        V: Clone,
    {
        self.entries.lock().get(uuid).map(|entry| entry.value.clone())
    }

    /// Remove an entry, transferring ownership of its value to the caller
    pub fn remove(&self, uuid: &str) -> Option<(ActorUuid, ConnectionId, V)> {
        let mut entries = self.entries.lock();
        let (uuid, entry) = entries.remove_entry(uuid)?;
        tracing::debug!(actor = %uuid, connection = %entry.connection, "Unregistering actor");
        Some((uuid, entry.connection, entry.value))
    }

    /// Remove every entry that belongs to `connection`
    pub fn remove_connection(&self, connection: ConnectionId) -> Vec<(ActorUuid, V)> {
        let mut entries = self.entries.lock();
        let uuids: Vec<ActorUuid> = entries
            .iter()
            .filter(|(_, entry)| entry.connection == connection)
            .map(|(uuid, _)| uuid.clone())
            .collect();
        uuids
            .into_iter()
            .filter_map(|uuid| entries.remove(&uuid).map(|entry| (uuid, entry.value)))
            .collect()
    }

    /// Remove everything
    pub fn drain(&self) -> Vec<(ActorUuid, ConnectionId, V)> {
        self.entries
            .lock()
            .drain()
            .map(|(uuid, entry)| (uuid, entry.connection, entry.value))
            .collect()
    }

    /// Live entry count per connection
    pub fn count_by_connection(&self) -> HashMap<ConnectionId, usize> {
        let mut counts = HashMap::new();
        for entry in self.entries.lock().values() {
            *counts.entry(entry.connection).or_insert(0) += 1;
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn uuids(&self) -> Vec<ActorUuid> {
        self.entries.lock().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_actor_uuid_generation() {
        let id1 = ActorUuid::generate();
        let id2 = ActorUuid::generate();
        assert_ne!(id1, id2);
        assert_eq!(id1.as_str().len(), GENERATED_UUID_LEN);
    }

    #[test]
    fn test_actor_uuid_validation() {
        assert!(ActorUuid::parse("uuid-1").is_ok());
        assert!(ActorUuid::parse("x".repeat(255)).is_ok());
        assert!(matches!(
            ActorUuid::parse("x".repeat(256)),
            Err(RemoteError::InvalidIdentifier { .. })
        ));
        assert!(ActorUuid::parse("").is_err());
    }

    #[test]
    fn test_insert_lookup_remove() {
        let registry = SlaveRegistry::new();
        let conn = ConnectionId::next();
        let uuid = ActorUuid::parse("uuid-1").unwrap();

        registry.insert(uuid.clone(), conn, 7u32).unwrap();
        assert!(registry.contains("uuid-1"));
        assert_eq!(registry.connection_of("uuid-1"), Some(conn));
        assert_eq!(registry.get("uuid-1"), Some(7));

        // Duplicate keeps the original and returns the new value
        assert_eq!(registry.insert(uuid, conn, 9), Err(9));
        assert_eq!(registry.get("uuid-1"), Some(7));

        let (removed, on, value) = registry.remove("uuid-1").unwrap();
        assert_eq!(removed.as_str(), "uuid-1");
        assert_eq!((on, value), (conn, 7));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unknown_uuid_is_a_noop() {
        let registry: SlaveRegistry<u32> = SlaveRegistry::new();
        assert!(registry.remove("missing").is_none());
        assert!(registry.get("missing").is_none());
        assert!(registry.connection_of("missing").is_none());
    }

    #[test]
    fn test_remove_connection_only_touches_that_link() {
        let registry = MasterRegistry::new();
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        for (name, conn) in [("a1", a), ("a2", a), ("b1", b)] {
            registry
                .insert(ActorUuid::parse(name).unwrap(), conn, "Counter".to_string())
                .unwrap();
        }
        assert_eq!(registry.count_by_connection().get(&a), Some(&2));

        let mut removed: Vec<String> = registry
            .remove_connection(a)
            .into_iter()
            .map(|(uuid, _)| uuid.into())
            .collect();
        removed.sort();
        assert_eq!(removed, vec!["a1", "a2"]);
        assert_eq!(registry.uuids(), vec![ActorUuid::parse("b1").unwrap()]);
    }

    #[tokio::test]
    async fn test_concurrent_remove_releases_once() {
        let registry = Arc::new(SlaveRegistry::new());
        let conn = ConnectionId::next();
        for i in 0..64 {
            registry
                .insert(ActorUuid::parse(format!("uuid-{}", i)).unwrap(), conn, i)
                .unwrap();
        }

        // One task destroys individually while another tears the link down
        let by_uuid = {
            let registry = registry.clone();
            tokio::spawn(async move {
                (0..64)
                    .filter(|i| registry.remove(&format!("uuid-{}", i)).is_some())
                    .count()
            })
        };
        let by_link = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.remove_connection(conn).len() })
        };

        let total = by_uuid.await.unwrap() + by_link.await.unwrap();
        assert_eq!(total, 64);
        assert!(registry.is_empty());
    }
}
