use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use crate::error::{HandleKind, SqlBridgeError};

/// Concurrent map from opaque handles to owned resources.
///
/// Handles are random 128-bit UUIDs rendered as strings, so a handle freed by
/// [`Registry::remove`] can never alias a later registration. Every lookup is
/// explicit: an unknown, malformed, or foreign handle returns
/// [`SqlBridgeError::InvalidHandle`], never a panic.
pub(crate) struct Registry<T> {
    entries: DashMap<Uuid, Arc<T>>,
    kind: HandleKind,
}

impl<T> Registry<T> {
    pub(crate) fn new(kind: HandleKind) -> Self {
        Self {
            entries: DashMap::new(),
            kind,
        }
    }

    /// Insert a resource and issue its handle.
    pub(crate) fn register(&self, resource: T) -> (Uuid, String) {
        let id = Uuid::new_v4();
        self.entries.insert(id, Arc::new(resource));
        (id, id.to_string())
    }

    /// Parse a caller-supplied handle string without touching the map.
    ///
    /// Garbage input (null bytes, oversized strings, identifiers from another
    /// process) fails the UUID parse and is reported as `InvalidHandle`.
    pub(crate) fn parse(&self, handle: &str) -> Result<Uuid, SqlBridgeError> {
        Uuid::try_parse(handle).map_err(|_| SqlBridgeError::invalid_handle(self.kind, handle))
    }

    pub(crate) fn resolve(&self, handle: &str) -> Result<Arc<T>, SqlBridgeError> {
        let id = self.parse(handle)?;
        self.resolve_id(id, handle)
    }

    pub(crate) fn resolve_id(&self, id: Uuid, handle: &str) -> Result<Arc<T>, SqlBridgeError> {
        self.entries
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| SqlBridgeError::invalid_handle(self.kind, handle))
    }

    /// Resolve by internal id (cross-registry references).
    pub(crate) fn get(&self, id: Uuid) -> Option<Arc<T>> {
        self.entries.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    pub(crate) fn remove(&self, handle: &str) -> Result<Arc<T>, SqlBridgeError> {
        let id = self.parse(handle)?;
        self.entries
            .remove(&id)
            .map(|(_, resource)| resource)
            .ok_or_else(|| SqlBridgeError::invalid_handle(self.kind, handle))
    }

    pub(crate) fn remove_id(&self, id: Uuid) -> Option<Arc<T>> {
        self.entries.remove(&id).map(|(_, resource)| resource)
    }

    /// Drop every entry failing the predicate (cascading cleanup).
    pub(crate) fn retain(&self, mut keep: impl FnMut(&T) -> bool) {
        self.entries.retain(|_, resource| keep(resource));
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
