use std::future::Future;
use std::time::Duration;

use crate::error::DbError;

/// Retry budget for engine "database is locked" failures.
const LOCKED_MAX_RETRIES: u32 = 3;
/// Base backoff; doubles per retry, capped at [`LOCKED_BACKOFF_CAP`].
const LOCKED_BACKOFF_BASE: Duration = Duration::from_millis(100);
const LOCKED_BACKOFF_CAP: Duration = Duration::from_millis(1000);

/// Run `op`, retrying on locked-database failures with exponential backoff.
///
/// Any non-locked error propagates immediately. Once the budget is spent the
/// final failure surfaces as [`DbError::EngineLocked`].
pub(crate) async fn with_locked_retry<T, F, Fut>(mut op: F) -> Result<T, DbError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbError>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_locked() => {
                if attempt >= LOCKED_MAX_RETRIES {
                    return Err(DbError::EngineLocked(err.to_string()));
                }
                let backoff = LOCKED_BACKOFF_BASE * 2_u32.pow(attempt);
                tokio::time::sleep(backoff.min(LOCKED_BACKOFF_CAP)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
