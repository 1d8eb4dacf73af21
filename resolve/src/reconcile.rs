use std::sync::Arc;

use facelink_vecstore::{Filter, Point};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::{Context, confirmed_points};
use crate::error::Result;
use crate::types::ReconcileReport;

enum Repair {
    None,
    Flagged { restored: usize },
}

/// Repairs drift between the review ledger and the pending collection.
///
/// The ledger is authoritative. A pending point still flagged unresolved
/// whose entry is resolved (or gone) is flagged resolved, and accepted
/// entries get their confirmed points back. Ledger entries still pending but
/// missing from the index are indexed again. Running it twice changes nothing
/// the second time.
pub struct Reconciler {
    ctx: Arc<Context>,
}

impl Reconciler {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    pub async fn run(&self, cancel: &CancellationToken) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let page_size = self.ctx.cfg.sweep_batch_size.max(1);
        let filter = Filter::unresolved();
        let mut offset: Option<String> = None;

        loop {
            if cancel.is_cancelled() {
                report.cancelled = true;
                return Ok(report);
            }
            let page = self
                .ctx
                .scroll(
                    &self.ctx.cfg.pending_collection,
                    Some(&filter),
                    offset.as_deref(),
                    page_size,
                )
                .await?;
            for point in page.points {
                report.scanned += 1;
                let id = point.id.clone();
                match self.repair_point(point).await {
                    Ok(Repair::None) => {}
                    Ok(Repair::Flagged { restored }) => {
                        report.flagged += 1;
                        report.restored += restored;
                    }
                    Err(e) => {
                        warn!(point = %id, error = %e, "reconcile: point skipped");
                        report.skipped += 1;
                    }
                }
            }
            match page.next_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        let mut skip = 0;
        loop {
            if cancel.is_cancelled() {
                report.cancelled = true;
                return Ok(report);
            }
            let batch = self.ctx.pending_batch(skip, page_size).await?;
            if batch.is_empty() {
                break;
            }
            skip += batch.len();
            for entry in &batch {
                let present = self
                    .ctx
                    .get_point(&self.ctx.cfg.pending_collection, &entry.id)
                    .await;
                let result = match present {
                    Ok(Some(_)) => continue,
                    Ok(None) if entry.vector.is_empty() => continue,
                    Ok(None) => self.ctx.upsert_pending(entry).await,
                    Err(e) => Err(e),
                };
                match result {
                    Ok(()) => {
                        debug!(review = %entry.id, "reconcile: pending point indexed");
                        report.indexed += 1;
                    }
                    Err(e) => {
                        warn!(review = %entry.id, error = %e, "reconcile: entry skipped");
                        report.skipped += 1;
                    }
                }
            }
        }

        info!(
            scanned = report.scanned,
            flagged = report.flagged,
            restored = report.restored,
            indexed = report.indexed,
            skipped = report.skipped,
            "reconcile finished"
        );
        Ok(report)
    }

    async fn repair_point(&self, mut point: Point) -> Result<Repair> {
        let review_id = point
            .payload
            .review_id
            .clone()
            .unwrap_or_else(|| point.id.clone());
        let entry = self.ctx.review(&review_id).await?;

        let Some(entry) = entry else {
            point.payload.resolved = true;
            self.ctx
                .upsert(&self.ctx.cfg.pending_collection, vec![point])
                .await?;
            debug!(review = %review_id, "reconcile: orphan point flagged");
            return Ok(Repair::Flagged { restored: 0 });
        };
        if !entry.resolved() {
            return Ok(Repair::None);
        }

        let mut restored = 0;
        if let Some(identity_id) = entry.identity_id() {
            let mut missing = Vec::new();
            for p in confirmed_points(&entry, identity_id) {
                if self
                    .ctx
                    .get_point(&self.ctx.cfg.confirmed_collection, &p.id)
                    .await?
                    .is_none()
                {
                    missing.push(p);
                }
            }
            restored = missing.len();
            self.ctx
                .upsert(&self.ctx.cfg.confirmed_collection, missing)
                .await?;
        }
        self.ctx.upsert_pending(&entry).await?;
        debug!(review = %entry.id, restored, "reconcile: resolved entry flagged");
        Ok(Repair::Flagged { restored })
    }
}
