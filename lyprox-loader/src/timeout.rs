//! Time bounds on remote calls.

use std::future::Future;
use std::time::Duration;

use lyprox_core::{LyproxError, LyproxResult};

/// Run `call` for at most `limit`.
///
/// An elapsed bound surfaces as `RemoteError::Unavailable` attributed to
/// `source_name`; the call is dropped and nothing it would have produced
/// is observed.
pub async fn with_timeout<T, Fut>(source_name: &str, limit: Duration, call: Fut) -> LyproxResult<T>
where
    Fut: Future<Output = LyproxResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(LyproxError::remote_unavailable(
            source_name,
            format!("timed out after {}s", limit.as_secs_f64()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lyprox_test_utils::assertions;

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_bound_is_unavailable() {
        let result: LyproxResult<()> = with_timeout("raw source", Duration::from_secs(1), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assertions::assert_remote_unavailable(&result);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inner_result_passes_through() {
        let ok = with_timeout("raw source", Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(ok.expect("should finish in time"), 7);

        let err: LyproxResult<()> = with_timeout("raw source", Duration::from_secs(1), async {
            Err(LyproxError::not_found("x"))
        })
        .await;
        assertions::assert_not_found(&err);
    }
}
