//! Job coordinator: the only place where work moves between workers.
//!
//! Workers whose segment is exhausted send a steal request. The coordinator
//! runs [`plan_steal`] under the segment lock; when no victim qualifies yet
//! (a slow peer has not produced a first sample, or a silent one has not hit
//! the stall timeout) the request is parked and re-evaluated on every tick.
//! A request is answered `NoWork` only when no unwritten bytes remain
//! outside the requester, or when rebalancing is disabled.

use super::context::{JobContext, StealReply, WorkerMessage};
use crate::rebalance::{StealKind, StealPolicy, apply_steal, plan_steal};
use crate::types::{Event, WorkerId, WorkerReport};
use std::sync::Arc;
use std::time::{Duration, Instant};

type Parked = Vec<(WorkerId, tokio::sync::oneshot::Sender<StealReply>)>;

/// Serve steal requests until every worker has finished.
///
/// Returns the per-worker reports, indexed like the mirror list.
pub(crate) async fn run_coordinator(
    ctx: Arc<JobContext>,
    mut rx: tokio::sync::mpsc::Receiver<WorkerMessage>,
) -> Vec<WorkerReport> {
    let worker_count = ctx.mirrors.len();
    let policy = StealPolicy::from(&ctx.config.segment);
    let mut reports: Vec<Option<WorkerReport>> = vec![None; worker_count];
    let mut live = worker_count;
    let mut parked: Parked = Vec::new();

    let mut ticker = tokio::time::interval(tick_period(policy.stall_timeout));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    while live > 0 {
        tokio::select! {
            message = rx.recv() => match message {
                Some(WorkerMessage::StealRequest { worker, reply }) => {
                    parked.push((worker, reply));
                }
                Some(WorkerMessage::Finished { worker, report }) => {
                    reports[worker] = Some(report);
                    live -= 1;
                }
                // Every sender is gone; nothing more can arrive
                None => break,
            },
            _ = ticker.tick() => {}
        }

        if ctx.is_complete() && !ctx.stop.is_cancelled() {
            tracing::debug!(job_id = ctx.id.0, "All bytes written, stopping remaining workers");
            ctx.stop.cancel();
        }

        if !parked.is_empty() {
            parked = serve_parked(&ctx, &policy, parked).await;
        }
    }

    reports
        .into_iter()
        .enumerate()
        .map(|(worker, report)| {
            report.unwrap_or_else(|| WorkerReport {
                mirror: ctx.mirrors[worker].clone(),
                ..WorkerReport::default()
            })
        })
        .collect()
}

/// Answer whatever parked requests can be answered now; return the rest.
async fn serve_parked(ctx: &JobContext, policy: &StealPolicy, parked: Parked) -> Parked {
    let mut still_waiting = Vec::with_capacity(parked.len());
    let mut segments = ctx.segments.lock().await;

    for (worker, reply) in parked {
        if reply.is_closed() {
            continue;
        }
        if !ctx.rebalance || ctx.stop.is_cancelled() {
            reply.send(StealReply::NoWork).ok();
            continue;
        }

        let now = Instant::now();
        if let Some(plan) = plan_steal(&segments, worker, now, policy) {
            apply_steal(&mut segments, worker, &plan, now);
            match plan.kind {
                StealKind::Takeover => tracing::warn!(
                    job_id = ctx.id.0,
                    thief = worker,
                    victim = plan.victim,
                    start = plan.start,
                    end = plan.end,
                    "Worker stalled, handing its remaining range over"
                ),
                StealKind::Split => tracing::debug!(
                    job_id = ctx.id.0,
                    thief = worker,
                    victim = plan.victim,
                    start = plan.start,
                    end = plan.end,
                    "Split range of a slower worker"
                ),
            }
            ctx.emit(Event::WorkStolen {
                id: ctx.id,
                thief: worker,
                victim: plan.victim,
                start: plan.start,
                end: plan.end,
            });
            reply
                .send(StealReply::Granted {
                    start: plan.start,
                    end: plan.end,
                })
                .ok();
            continue;
        }

        let others_pending = segments
            .iter()
            .enumerate()
            .any(|(idx, segment)| idx != worker && !segment.is_exhausted());
        if others_pending {
            still_waiting.push((worker, reply));
        } else {
            reply.send(StealReply::NoWork).ok();
        }
    }

    still_waiting
}

/// How often parked requests are re-evaluated
fn tick_period(stall_timeout: Duration) -> Duration {
    (stall_timeout / 4).clamp(Duration::from_millis(10), Duration::from_millis(250))
}
