use crate::{BootstrapReport, Filter, Record, Table};
use web_time::SystemTime;

/// The embedded store a tab connects to
///
/// Every handle opened from the same store sees the same tables. Handles are not isolated from
/// each other: coordination between them is the job of the connection pool and lock manager.
pub trait Store: 'static + waaa::Send + waaa::Sync {
    type Handle: StoreHandle;

    fn open(&self) -> impl '_ + waaa::Future<Output = crate::Result<Self::Handle>>;
}

/// An open connection to the embedded store
///
/// Each operation is atomic on its own. `put_many` and `clear` are atomic as a whole.
pub trait StoreHandle: 'static + waaa::Send + waaa::Sync {
    fn get<R: Record>(
        &self,
        key: R::Key,
    ) -> impl '_ + waaa::Future<Output = crate::Result<Option<R>>>;

    fn get_all<R: Record>(&self) -> impl '_ + waaa::Future<Output = crate::Result<Vec<R>>>;

    fn query<R: Record>(
        &self,
        filter: Filter,
    ) -> impl '_ + waaa::Future<Output = crate::Result<Vec<R>>>;

    /// Inserts or replaces the record with the same key
    fn put<R: Record>(&self, record: R) -> impl '_ + waaa::Future<Output = crate::Result<()>>;

    fn put_many<R: Record>(
        &self,
        records: Vec<R>,
    ) -> impl '_ + waaa::Future<Output = crate::Result<()>>;

    /// Deleting a missing key is not an error
    fn delete<R: Record>(&self, key: R::Key) -> impl '_ + waaa::Future<Output = crate::Result<()>>;

    fn count<R: Record>(&self) -> impl '_ + waaa::Future<Output = crate::Result<usize>>;

    /// Empties `tables` in a single transaction
    fn clear(
        &self,
        tables: &'static [Table],
    ) -> impl '_ + waaa::Future<Output = crate::Result<()>>;

    fn clear_all(&self) -> impl '_ + waaa::Future<Output = crate::Result<()>> {
        self.clear(&Table::ALL)
    }

    fn close(&self) -> impl '_ + waaa::Future<Output = crate::Result<()>>;

    /// Populates the default rows if they are not there yet
    fn bootstrap(
        &self,
        now: SystemTime,
    ) -> impl '_ + waaa::Future<Output = crate::Result<BootstrapReport>> {
        async move { crate::populate_defaults(self, now).await }
    }

    fn get_required<R: Record>(
        &self,
        key: R::Key,
    ) -> impl '_ + waaa::Future<Output = crate::Result<R>> {
        async move {
            let printed = key.to_string();
            self.get::<R>(key)
                .await?
                .ok_or(crate::Error::RecordDoesNotExist {
                    table: R::TABLE,
                    key: printed,
                })
        }
    }
}
