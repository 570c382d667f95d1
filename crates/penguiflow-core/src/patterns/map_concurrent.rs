//! Bounded concurrent map over a list of items, preserving input order and
//! attributing the first failure to its item index.
//!
//! Grounded in the tool-call fan-out pattern (`futures::future::join_all`
//! over independent futures), generalized with a semaphore so the fan-out
//! width is bounded rather than unconditionally parallel.

use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::error::{GraphError, Result};

/// Apply `f` to every item in `items` with at most `concurrency` running at
/// once, returning results in the original order. The first item whose
/// future errors short-circuits the overall result via
/// [`GraphError::MapItem`]; other in-flight items are allowed to finish but
/// their outcomes are discarded.
pub async fn map_concurrent<F, Fut>(items: Vec<Value>, concurrency: usize, f: F) -> Result<Vec<Value>>
where
    F: Fn(usize, Value) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<Value>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let f = Arc::new(f);

    let tasks = items.into_iter().enumerate().map(|(index, item)| {
        let semaphore = semaphore.clone();
        let f = f.clone();
        async move {
            match semaphore.acquire_owned().await {
                Ok(_permit) => (index, f(index, item).await),
                Err(_) => (
                    index,
                    Err(GraphError::Custom("map_concurrent semaphore closed".into())),
                ),
            }
        }
    });

    let outcomes = join_all(tasks).await;
    let mut results: Vec<Option<Value>> = vec![None; outcomes.len()];
    for (index, outcome) in outcomes {
        match outcome {
            Ok(value) => results[index] = Some(value),
            Err(e) => {
                return Err(GraphError::MapItem {
                    index,
                    error: e.to_string(),
                });
            }
        }
    }

    // Every index was populated: `join_all` only returns once every task in
    // `tasks` (one per input item) has completed.
    Ok(results.into_iter().flatten().collect())
}
