use std::future::Future;

use futures::stream::{self, StreamExt};
use tracing::warn;

use crate::core::{Error, FanOutFailure, Result};

/// Runs `op` for every index with at most `limit` calls in flight
///
/// Waits for every call to settle. Successes come back in index order; any
/// failure turns the whole run into one [`Error::AggregateFanOutFailure`]
/// naming each failed index. Cancellation of any call wins over failures.
pub(crate) async fn fan_out<I, T, F, Fut>(indices: I, limit: usize, op: F) -> Result<Vec<(usize, T)>>
where
    I: IntoIterator<Item = usize>,
    F: Fn(usize) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let settled: Vec<(usize, Result<T>)> = stream::iter(indices)
        .map(|index| {
            let call = op(index);
            async move { (index, call.await) }
        })
        .buffer_unordered(limit.max(1))
        .collect()
        .await;

    let mut done = Vec::with_capacity(settled.len());
    let mut failures = Vec::new();
    let mut cancelled = false;
    for (index, result) in settled {
        match result {
            Ok(value) => done.push((index, value)),
            Err(Error::Cancelled) => cancelled = true,
            Err(e) => failures.push(FanOutFailure {
                index,
                error: e.to_string(),
            }),
        }
    }

    if cancelled {
        return Err(Error::Cancelled);
    }
    if !failures.is_empty() {
        failures.sort_by_key(|f| f.index);
        warn!(failed = failures.len(), total = done.len() + failures.len(), "fan-out had failures");
        return Err(Error::AggregateFanOutFailure { failures });
    }

    done.sort_by_key(|(index, _)| *index);
    Ok(done)
}
