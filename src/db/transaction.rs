/*!
 * Transaction Helper Utilities
 *
 * Runs a unit of work inside a single database transaction: commit on
 * success, rollback on any error.
 */

use sea_orm::{DatabaseTransaction, DbErr, TransactionError, TransactionTrait};
use std::future::Future;
use std::pin::Pin;

/// Type alias for boxed future used in transactions
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Execute a function within a database transaction
///
/// ```rust,ignore
/// use stateset_forecast::db::with_transaction;
///
/// with_transaction(&db, |txn| {
///     Box::pin(async move {
///         ForecastData::delete_many().filter(...).exec(txn).await?;
///         row.insert(txn).await
///     })
/// })
/// .await?;
/// ```
pub async fn with_transaction<C, F, T, E>(db: &C, f: F) -> Result<T, E>
where
    C: TransactionTrait,
    F: for<'a> FnOnce(&'a DatabaseTransaction) -> BoxFuture<'a, Result<T, E>> + Send,
    T: Send,
    E: std::error::Error + From<DbErr> + Send,
{
    db.transaction(f).await.map_err(|e| match e {
        TransactionError::Connection(db_err) => E::from(db_err),
        TransactionError::Transaction(err) => err,
    })
}
