// src/analyze/mod.rs
//! Parallel Analysis Coordinator: batches items, scores batches on a
//! bounded pool, keeps actionable results and ranks them by relevancy.

pub mod ai_adapter;
pub mod batch;
pub mod discover;
pub mod reply;
pub mod scorer;
pub mod types;

use std::cmp::Reverse;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::ingest::types::Item;
use crate::store::SavedStore;

// Re-export convenient types.
pub use crate::analyze::ai_adapter::{DynReasoningClient, MeteredReasoner, ReasoningClient};
pub use crate::analyze::batch::make_batches;
pub use crate::analyze::scorer::BatchScorer;
pub use crate::analyze::types::{AnalysisResult, AnalyzedItem, Level};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("analyze_items_total", "Items submitted for scoring.");
        describe_counter!("analyze_kept_total", "Actionable items kept after scoring.");
        describe_counter!("analyze_batches_total", "Batches scored.");
        describe_counter!(
            "analyze_batch_failures_total",
            "Batches skipped because processing failed."
        );
        describe_histogram!("analyze_batch_ms", "Per-batch scoring time in milliseconds.");
    });
}

/// Stable sort, highest relevancy first; equal scores keep their order.
pub fn sort_by_relevancy(items: &mut [AnalyzedItem]) {
    items.sort_by_key(|a| Reverse(a.score()));
}

/// Score `items` in batches of `batch_size` with at most `workers` batches in
/// flight. Only actionable results are returned, ranked by relevancy.
///
/// A batch whose processing fails (store error, panicked worker) is logged
/// and skipped. Ties are ordered by input position, so the output does not
/// depend on batch completion order.
pub async fn analyze_parallel(
    scorer: Arc<BatchScorer>,
    store: Arc<dyn SavedStore>,
    items: Vec<Item>,
    context: &str,
    batch_size: usize,
    workers: usize,
) -> Vec<AnalyzedItem> {
    ensure_metrics_described();

    let total_items = items.len();
    let batches = make_batches(&items, batch_size);
    let total_batches = batches.len();
    info!(
        target: "analyze",
        items = total_items,
        batches = total_batches,
        batch_size,
        workers,
        "analyzing items in batches"
    );
    counter!("analyze_items_total").increment(total_items as u64);

    let context: Arc<str> = Arc::from(context);
    let permits = Arc::new(Semaphore::new(workers.max(1)));
    let mut tasks = JoinSet::new();

    let mut offset = 0usize;
    for batch in batches {
        let start = offset;
        offset += batch.len();
        let scorer = scorer.clone();
        let store = store.clone();
        let context = context.clone();
        let permits = permits.clone();
        tasks.spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| anyhow!("analysis pool closed"))?;
            let t0 = std::time::Instant::now();
            let analyses = scorer.score(&batch, &context).await;
            histogram!("analyze_batch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

            let mut out = Vec::with_capacity(batch.len());
            for (i, (item, analysis)) in batch.into_iter().zip(analyses).enumerate() {
                let saved = store
                    .is_already_saved(&item.id)
                    .await
                    .with_context(|| format!("duplicate check for item {}", item.id))?;
                out.push((start + i, AnalyzedItem::new(item, analysis, saved)));
            }
            Ok::<_, anyhow::Error>(out)
        });
    }

    let mut kept: Vec<(usize, AnalyzedItem)> = Vec::new();
    let mut completed = 0usize;
    while let Some(joined) = tasks.join_next().await {
        completed += 1;
        match joined {
            Ok(Ok(results)) => {
                counter!("analyze_batches_total").increment(1);
                let before = kept.len();
                kept.extend(
                    results
                        .into_iter()
                        .filter(|(_, a)| a.analysis.is_actionable),
                );
                debug!(
                    target: "analyze",
                    completed,
                    total = total_batches,
                    actionable = kept.len() - before,
                    "batch processed"
                );
            }
            Ok(Err(e)) => {
                counter!("analyze_batch_failures_total").increment(1);
                warn!(target: "analyze", error = %e, "batch processing failed");
            }
            Err(e) => {
                counter!("analyze_batch_failures_total").increment(1);
                warn!(target: "analyze", error = %e, "analysis worker failed");
            }
        }
    }

    kept.sort_by_key(|(seq, _)| *seq);
    let mut ranked: Vec<AnalyzedItem> = kept.into_iter().map(|(_, a)| a).collect();
    sort_by_relevancy(&mut ranked);

    counter!("analyze_kept_total").increment(ranked.len() as u64);
    info!(
        target: "analyze",
        actionable = ranked.len(),
        total = total_items,
        "analysis round complete"
    );
    ranked
}
