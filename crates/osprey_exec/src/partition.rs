//! Per-partition query task and its result conduit.
//!
//! Each partition gets one task and one single-slot channel. The task
//! writes its outcome into the slot exactly once, racing the write against
//! cancellation, so it terminates even when nobody is left to read:
//!
//! - already cancelled at startup → publishes nothing, the closed channel
//!   tells the reader;
//! - outcome ready → publishes it (a dropped receiver just fails the send);
//! - cancellation during publish → gives up and exits.
//!
//! The reader side never learns which partition out-raced which; ordering
//! across partitions is deliberately unspecified.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use osprey_common::{CancelSignal, OspreyResult, PartitionQuery, Record};
use osprey_store::Partition;

use crate::timeout::run_with_timeout;

/// Spawn the query task for one partition and hand back the receiving end
/// of its conduit. `None` from the receiver means the task published
/// nothing (pre-cancelled, or cancelled while publishing).
pub fn spawn_partition_query(
    cancel: CancelSignal,
    partition: Partition,
    query: Arc<PartitionQuery>,
    timeout: Option<Duration>,
) -> mpsc::Receiver<OspreyResult<Vec<Record>>> {
    let (tx, rx) = mpsc::channel(1);

    tokio::spawn(async move {
        // A query cancelled before this task got scheduled never touches
        // the store.
        if cancel.is_cancelled() {
            tracing::trace!(partition = %partition.id, "partition query skipped, already cancelled");
            return;
        }

        let result = query_partition(&cancel, &partition, &query, timeout).await;

        tokio::select! {
            _ = cancel.cancelled() => {}
            sent = tx.send(result) => { let _ = sent; }
        }
    });

    rx
}

async fn query_partition(
    cancel: &CancelSignal,
    partition: &Partition,
    query: &Arc<PartitionQuery>,
    timeout: Option<Duration>,
) -> OspreyResult<Vec<Record>> {
    match timeout {
        Some(limit) => {
            let op = format!("partition {} query", partition.id);
            let store = Arc::clone(&partition.store);
            let signal = cancel.clone();
            let query = Arc::clone(query);
            run_with_timeout(cancel, &op, limit, async move {
                store.execute(&signal, &query).await
            })
            .await
        }
        None => partition.store.execute(cancel, query).await,
    }
}
