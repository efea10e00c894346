//! Optimistic local updates with rollback.
//!
//! A mutation is applied to local state first, then sent to the store. If
//! the store rejects it, the exact pre-mutation snapshot is restored and the
//! error is handed back for the caller to surface.

use geofeed_common::AppResult;
use std::future::Future;

/// Apply `mutate` to `state`, then await `remote`.
///
/// On error `state` is restored to its value before `mutate` ran.
pub async fn apply<S, T, F, Fut>(state: &mut S, mutate: F, remote: Fut) -> AppResult<T>
where
    S: Clone,
    F: FnOnce(&mut S),
    Fut: Future<Output = AppResult<T>>,
{
    let snapshot = state.clone();
    mutate(state);

    match remote.await {
        Ok(value) => Ok(value),
        Err(err) => {
            *state = snapshot;
            tracing::warn!(error = %err, code = err.error_code(), "Remote mutation failed, local change rolled back");
            Err(err)
        }
    }
}
