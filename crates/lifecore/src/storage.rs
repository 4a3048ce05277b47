use crate::audit::cluster;
use crate::{ClusterObject, ItemId, KernelError, Result, Transaction};

/// Transactional store of the cluster objects of every item.
///
/// Reads made with a transaction handle see the writes pending under it. A
/// handle stays usable after `commit` or `abort` until it is closed, so one
/// operation may commit several transitions in turn.
pub trait ClusterStorage: Send + Sync {
    /// Open a new transaction.
    fn begin(&self) -> Result<Transaction>;

    /// Object stored at `path`, failing `ObjectNotFound` when absent.
    fn get(&self, item: ItemId, path: &str, txn: Option<Transaction>) -> Result<ClusterObject>;

    fn put(&self, item: ItemId, object: &ClusterObject, txn: Transaction) -> Result<()>;

    fn remove(&self, item: ItemId, path: &str, txn: Transaction) -> Result<()>;

    /// Names of the direct children of `path`.
    fn contents(&self, item: ItemId, path: &str, txn: Option<Transaction>) -> Result<Vec<String>>;

    /// Make every pending write of `txn` durable, failing `Persistency`.
    fn commit(&self, txn: Transaction) -> Result<()>;

    /// Discard every pending write of `txn`.
    fn abort(&self, txn: Transaction);

    /// Release the handle, discarding anything still pending.
    fn close(&self, txn: Transaction);
}

/// Open transaction that is aborted and closed when dropped without a commit.
pub struct TransactionScope<'s> {
    storage: &'s dyn ClusterStorage,
    txn: Transaction,
    finished: bool,
}

impl<'s> TransactionScope<'s> {
    pub fn begin(storage: &'s dyn ClusterStorage) -> Result<Self> {
        let txn = storage.begin()?;
        tracing::trace!("opened {}", txn);
        Ok(Self {
            storage,
            txn,
            finished: false,
        })
    }

    pub fn txn(&self) -> Transaction {
        self.txn
    }

    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        let result = self.storage.commit(self.txn);
        if result.is_err() {
            self.storage.abort(self.txn);
        }
        self.storage.close(self.txn);
        result
    }

    pub fn abort(mut self) {
        self.finished = true;
        self.storage.abort(self.txn);
        self.storage.close(self.txn);
    }
}

impl Drop for TransactionScope<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!("aborting unfinished {}", self.txn);
            self.storage.abort(self.txn);
            self.storage.close(self.txn);
        }
    }
}

/// Value of the item property `name`, `None` when the item has no such property.
pub fn item_property(
    storage: &dyn ClusterStorage,
    item: ItemId,
    name: &str,
    txn: Option<Transaction>,
) -> Result<Option<String>> {
    match storage.get(item, &format!("{}/{}", cluster::PROPERTY, name), txn) {
        Ok(ClusterObject::Property(p)) => Ok(Some(p.value)),
        Ok(other) => Err(KernelError::invalid(format!(
            "{} is not a property",
            other.cluster_path()
        ))),
        Err(KernelError::ObjectNotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}
