//! Fixed-delay retry helper.
//!
//! One helper covers navigation, viewer-text extraction and batch inserts so
//! the attempt/delay behavior stays uniform across call sites.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

use crate::error::Result;

/// Run `op` up to `attempts` times, sleeping `delay` between attempts.
/// Returns the first success, or the last error once the budget is spent.
pub async fn retry_with_delay<T, F, Fut>(
    attempts: u32,
    delay: Duration,
    op_name: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= attempts {
                    return Err(err);
                }

                debug!(
                    "{} failed (attempt {}/{}): {}; retrying in {:?}",
                    op_name, attempt, attempts, err, delay
                );

                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
