//! Work stealing between workers of one job
//!
//! [`plan_steal`] decides which segment an idle worker should take work from;
//! [`apply_steal`] moves the boundaries. Both are pure over a slice of
//! segments, so the coordinator can run them under the job lock and tests can
//! drive them with synthetic clocks.

use crate::config::SegmentConfig;
use crate::segment::{Segment, Throughput};
use crate::types::WorkerId;
use std::time::{Duration, Instant};

/// Thresholds for when a range is worth splitting
#[derive(Clone, Copy, Debug)]
pub struct StealPolicy {
    /// Silence after which a worker counts as stalled
    pub stall_timeout: Duration,
    /// Victims expected to finish sooner than this are left alone
    pub min_remaining: Duration,
    /// Victims with fewer unwritten bytes than this are left alone
    pub min_bytes: u64,
}

impl From<&SegmentConfig> for StealPolicy {
    fn from(config: &SegmentConfig) -> Self {
        Self {
            stall_timeout: config.stall_timeout,
            min_remaining: config.min_steal_remaining,
            min_bytes: config.min_steal_bytes,
        }
    }
}

/// How the victim's range is divided
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StealKind {
    /// Victim is stalled; its whole unwritten range moves
    Takeover,
    /// Victim keeps the head, requester takes the tail
    Split,
}

/// Outcome of a successful rebalancing decision
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StealPlan {
    /// Worker giving up bytes
    pub victim: WorkerId,
    /// First byte the requester now owns (the victim's new `end`)
    pub start: u64,
    /// One past the last byte the requester now owns (the victim's old `end`)
    pub end: u64,
    /// Split or full takeover
    pub kind: StealKind,
}

/// Pick a victim for `requester` and the range it should hand over
///
/// Measured victims strictly slower than the requester are preferred; among
/// them the one with the smallest estimated time left wins, as long as that
/// estimate exceeds [`StealPolicy::min_remaining`]. The tail they give up is
/// proportional to the requester's share of the combined speed. Stalled
/// victims are the fallback and lose their entire unwritten range.
pub fn plan_steal(
    segments: &[Segment],
    requester: WorkerId,
    now: Instant,
    policy: &StealPolicy,
) -> Option<StealPlan> {
    let requester_speed = segments.get(requester)?.rate(now);
    let min_secs = policy.min_remaining.as_secs_f64();

    let mut best_split: Option<(WorkerId, f64, f64)> = None;
    let mut stalled: Option<WorkerId> = None;

    for (idx, seg) in segments.iter().enumerate() {
        if idx == requester || seg.is_exhausted() {
            continue;
        }
        match seg.throughput(now, policy.stall_timeout) {
            Throughput::Stalled => {
                let larger = stalled.is_none_or(|s| seg.remaining() > segments[s].remaining());
                if larger {
                    stalled = Some(idx);
                }
            }
            Throughput::Measured(victim_speed) => {
                let Some(requester_speed) = requester_speed else {
                    continue;
                };
                if victim_speed >= requester_speed || seg.remaining() < policy.min_bytes {
                    continue;
                }
                let eta = seg.remaining() as f64 / victim_speed;
                if !eta.is_finite() || eta <= 0.0 || eta <= min_secs {
                    continue;
                }
                if best_split.is_none_or(|(_, best_eta, _)| eta < best_eta) {
                    best_split = Some((idx, eta, victim_speed));
                }
            }
            Throughput::Unknown => {}
        }
    }

    if let (Some((victim, _, victim_speed)), Some(requester_speed)) = (best_split, requester_speed)
    {
        let seg = &segments[victim];
        let remaining = seg.remaining();
        let fraction = requester_speed / (requester_speed + victim_speed);
        let share = ((remaining as f64 * fraction).round() as u64).clamp(1, remaining);
        return Some(StealPlan {
            victim,
            start: seg.end - share,
            end: seg.end,
            kind: StealKind::Split,
        });
    }

    stalled.map(|victim| {
        let seg = &segments[victim];
        StealPlan {
            victim,
            start: seg.position(),
            end: seg.end,
            kind: StealKind::Takeover,
        }
    })
}

/// Move the boundaries described by `plan`
///
/// The victim's `end` becomes `plan.start` and the requester owns
/// `[plan.start, plan.end)` with fresh measurement. A taken-over victim is
/// collapsed to `start == end`, except for bytes it still has in flight,
/// which stay with it until their write completes or is released.
pub fn apply_steal(segments: &mut [Segment], requester: WorkerId, plan: &StealPlan, now: Instant) {
    let victim = &mut segments[plan.victim];
    victim.end = plan.start;
    if plan.kind == StealKind::Takeover {
        victim.start = plan.start - victim.in_flight;
        victim.downloaded = 0;
    }
    segments[requester].assign(plan.start, plan.end, now);
}
