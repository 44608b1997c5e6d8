//! Generic concurrent fan-out over probe candidates.

use std::future::Future;

use crate::data::AgentSession;

/// Run `probe` over every candidate concurrently and collect the sessions it
/// yields.
///
/// One task per item with no concurrency cap; candidate sets are bounded by
/// the host's process count. Waits for every probe to finish (join
/// semantics); output order is unspecified and `None` results are dropped.
/// Probes signal "no session" by returning `None`, never by panicking.
pub async fn probe_all<T, F, Fut>(items: Vec<T>, probe: F) -> Vec<AgentSession>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = Option<AgentSession>>,
{
    futures::future::join_all(items.into_iter().map(probe))
        .await
        .into_iter()
        .flatten()
        .collect()
}
