//! Scoped ownership of a transient table.
//!
//! A [`TableGuard`] is created right after its table is. The owner either
//! [`release`](TableGuard::release)s it (drops the table and reports the
//! outcome) or [`disarm`](TableGuard::disarm)s it (keeps the table). If the
//! owning future is cancelled first, `Drop` spawns a best-effort drop on the
//! current runtime.

use tally_core::QualifiedName;
use tracing::{debug, warn};

use crate::error::DatabaseError;
use crate::store::TableStore;

pub(crate) struct TableGuard<S>
where
    S: TableStore + Clone + Send + Sync + 'static,
{
    store: S,
    table: QualifiedName,
    armed: bool,
}

impl<S> TableGuard<S>
where
    S: TableStore + Clone + Send + Sync + 'static,
{
    pub(crate) fn new(store: &S, table: QualifiedName) -> Self {
        Self {
            store: store.clone(),
            table,
            armed: true,
        }
    }

    pub(crate) const fn table(&self) -> &QualifiedName {
        &self.table
    }

    /// Keep the table.
    pub(crate) fn disarm(mut self) {
        self.armed = false;
    }

    /// Drop the table now.
    pub(crate) async fn release(mut self) -> Result<(), DatabaseError> {
        self.armed = false;
        self.store.drop_table(&self.table).await?;
        debug!(table = %self.table, "dropped transient table");
        Ok(())
    }
}

impl<S> Drop for TableGuard<S>
where
    S: TableStore + Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let store = self.store.clone();
        let table = self.table.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(%table, "operation abandoned; dropping table in background");
                handle.spawn(async move {
                    if let Err(e) = store.drop_table(&table).await {
                        warn!(%table, error = %e, "background drop failed");
                    }
                });
            }
            Err(_) => warn!(%table, "operation abandoned outside a runtime; table left behind"),
        }
    }
}
