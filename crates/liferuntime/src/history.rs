use lifecore::audit::cluster;
use lifecore::{ClusterObject, ClusterStorage, Event, ItemId, KernelError, Result, Transaction};

/// Append-only audit trail of one item.
pub struct History<'s> {
    storage: &'s dyn ClusterStorage,
    item: ItemId,
    txn: Transaction,
}

impl<'s> History<'s> {
    pub fn new(storage: &'s dyn ClusterStorage, item: ItemId, txn: Transaction) -> Self {
        Self { storage, item, txn }
    }

    /// Highest event id stored so far, pending writes of the transaction included.
    pub fn last_event_id(&self) -> Result<Option<u64>> {
        let ids = self.storage.contents(self.item, cluster::AUDIT_TRAIL, Some(self.txn))?;
        Ok(ids.iter().filter_map(|id| id.parse::<u64>().ok()).max())
    }

    /// Stores `event` under the next free id and returns it with that id.
    pub fn add_event(&self, mut event: Event) -> Result<Event> {
        event.id = self.last_event_id()?.map(|id| id + 1).unwrap_or(0);
        self.storage.put(self.item, &ClusterObject::Event(event.clone()), self.txn)?;
        tracing::debug!(item = %self.item, "added event {} for {}", event.id, event.step_path);
        Ok(event)
    }

    pub fn event(&self, id: u64) -> Result<Event> {
        let path = format!("{}/{}", cluster::AUDIT_TRAIL, id);
        self.storage
            .get(self.item, &path, Some(self.txn))?
            .as_event()
            .cloned()
            .ok_or_else(|| KernelError::invalid(format!("{} is not an event", path)))
    }
}
