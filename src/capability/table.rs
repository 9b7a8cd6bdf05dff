//! Capability table: descriptor → handler.
//!
//! Each entry keeps the handler twice, once as `dyn Capability` for
//! dispatch and once as `dyn Any` so typed lookups can downcast without
//! the trait having to know about `Any`.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{Capability, CapabilityDescriptor};
use crate::error::{Result, SessionError};
use crate::protocol::CONTROL_PROTOCOL_ID;

struct Entry {
    handler: Arc<dyn Capability>,
    any: Arc<dyn Any + Send + Sync>,
}

/// Registered capabilities of one session.
#[derive(Default)]
pub struct CapabilityTable {
    entries: BTreeMap<CapabilityDescriptor, Entry>,
}

impl CapabilityTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `descriptor`, replacing any previous entry.
    ///
    /// Returns the replaced handler, if any.
    ///
    /// # Errors
    ///
    /// `ReservedProtocolId` if the handler claims the control id.
    pub fn register<C: Capability>(
        &mut self,
        descriptor: CapabilityDescriptor,
        handler: Arc<C>,
    ) -> Result<Option<Arc<dyn Capability>>> {
        if handler.protocol_id() == CONTROL_PROTOCOL_ID {
            return Err(SessionError::ReservedProtocolId(CONTROL_PROTOCOL_ID));
        }

        let entry = Entry {
            handler: handler.clone(),
            any: handler,
        };
        Ok(self.entries.insert(descriptor, entry).map(|e| e.handler))
    }

    /// Get the handler registered under `descriptor`.
    pub fn get(&self, descriptor: &CapabilityDescriptor) -> Option<Arc<dyn Capability>> {
        self.entries.get(descriptor).map(|e| e.handler.clone())
    }

    /// Get the handler under `descriptor` as its concrete type.
    pub fn get_typed<C: Capability>(&self, descriptor: &CapabilityDescriptor) -> Option<Arc<C>> {
        self.entries
            .get(descriptor)
            .and_then(|e| e.any.clone().downcast::<C>().ok())
    }

    /// Find the handler for a sub-protocol id.
    ///
    /// If several descriptors share an id, the lowest descriptor wins.
    pub fn by_protocol(&self, protocol_id: u16) -> Option<Arc<dyn Capability>> {
        self.entries
            .values()
            .find(|e| e.handler.protocol_id() == protocol_id)
            .map(|e| e.handler.clone())
    }

    /// Registered descriptors in order.
    pub fn descriptors(&self) -> Vec<CapabilityDescriptor> {
        self.entries.keys().cloned().collect()
    }

    /// Snapshot of the whole table.
    pub fn snapshot(&self) -> BTreeMap<CapabilityDescriptor, Arc<dyn Capability>> {
        self.entries
            .iter()
            .map(|(d, e)| (d.clone(), e.handler.clone()))
            .collect()
    }

    /// Check if a descriptor is registered.
    pub fn contains(&self, descriptor: &CapabilityDescriptor) -> bool {
        self.entries.contains_key(descriptor)
    }

    /// Number of registered capabilities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for CapabilityTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityTable")
            .field("capabilities", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}
