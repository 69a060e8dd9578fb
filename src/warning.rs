//! Per-row diagnostics
//!
//! Recoverable problems met while merging a row (a value that is not a
//! number, an image that cannot be fetched or uploaded) are recorded against
//! the row being imported instead of failing it. The importer drains them
//! once the row is done and hands them to the progress reporter.

use std::cell::RefCell;

use indexmap::IndexSet;

tokio::task_local! {
    static ROW_DIAGNOSTICS: RefCell<IndexSet<String>>;
}

/// Record a diagnostic against the row being imported.
///
/// A message already recorded for the row is kept once. Without a row in
/// progress the message only reaches the log.
pub fn collect(message: impl Into<String>) {
    let message = message.into();
    if ROW_DIAGNOSTICS
        .try_with(|diagnostics| diagnostics.borrow_mut().insert(message.clone()))
        .is_err()
    {
        tracing::debug!(%message, "diagnostic outside of a row");
    }
}

/// Import one row with diagnostics enabled, returning its outcome and the
/// diagnostics in the order they were first recorded.
pub async fn collect_warnings<F, T>(row: F) -> (T, Vec<String>)
where
    F: std::future::Future<Output = T>,
{
    ROW_DIAGNOSTICS
        .scope(RefCell::new(IndexSet::new()), async {
            let outcome = row.await;
            let diagnostics = ROW_DIAGNOSTICS.with(|diagnostics| diagnostics.take());
            (outcome, diagnostics.into_iter().collect())
        })
        .await
}

/// `format!`-style shorthand for [`collect`].
#[macro_export]
macro_rules! warn_row {
    ($($arg:tt)*) => {
        $crate::warning::collect(format!($($arg)*))
    };
}
