//! Resolution strategy handlers
//!
//! Each strategy has a planner, which computes the post-resolution edges, and
//! a check that recognises edges already in that post-resolution shape. The
//! handlers are looked up from a static table keyed by strategy.

use tgr_core::{EdgeState, ResolutionStrategy, TemporalEdge};

/// The two edges of a contradiction, ordered by `valid_from`.
///
/// When both facts carry the same timestamp the incoming claim is treated as
/// the later one.
#[derive(Debug, Clone)]
pub struct ClaimPair {
    pub earlier: TemporalEdge,
    pub later: TemporalEdge,
}

impl ClaimPair {
    pub fn new(existing: TemporalEdge, incoming: TemporalEdge) -> Self {
        if incoming.valid_from < existing.valid_from {
            Self {
                earlier: incoming,
                later: existing,
            }
        } else {
            Self {
                earlier: existing,
                later: incoming,
            }
        }
    }

    pub fn edges(&self) -> [&TemporalEdge; 2] {
        [&self.earlier, &self.later]
    }
}

/// Edges after a resolution, plus whether the key becomes multi-valued
#[derive(Debug, Clone)]
pub struct ResolutionPlan {
    pub earlier: TemporalEdge,
    pub later: TemporalEdge,
    pub multi_valued: bool,
}

pub struct StrategyHandler {
    pub strategy: ResolutionStrategy,
    pub plan: fn(&ClaimPair) -> Result<ResolutionPlan, String>,
    pub is_satisfied: fn(&ClaimPair) -> bool,
}

static HANDLERS: [StrategyHandler; 3] = [
    StrategyHandler {
        strategy: ResolutionStrategy::NewestWins,
        plan: plan_newest_wins,
        is_satisfied: newest_wins_satisfied,
    },
    StrategyHandler {
        strategy: ResolutionStrategy::Merge,
        plan: plan_merge,
        is_satisfied: merge_satisfied,
    },
    StrategyHandler {
        strategy: ResolutionStrategy::SplitTimeline,
        plan: plan_split_timeline,
        is_satisfied: split_timeline_satisfied,
    },
];

pub fn handler_for(strategy: ResolutionStrategy) -> Option<&'static StrategyHandler> {
    HANDLERS.iter().find(|handler| handler.strategy == strategy)
}

/// Close a live value that `successor` takes over from.
///
/// Under `split_timeline` an older value keeps its window up to the successor;
/// otherwise it is invalidated where the successor starts.
pub fn close_superseded(
    edge: &TemporalEdge,
    successor: &TemporalEdge,
    strategy: ResolutionStrategy,
) -> TemporalEdge {
    let mut closed = edge.clone();
    if strategy == ResolutionStrategy::SplitTimeline && edge.valid_from < successor.valid_from {
        closed.state = EdgeState::SplitValid;
        closed.valid_to = Some(successor.valid_from);
    } else {
        closed.state = EdgeState::Invalidated;
        closed.invalidated_at = Some(successor.valid_from);
    }
    closed
}

/// Confidence of merged edges
pub fn merged_confidence(a: f32, b: f32) -> f32 {
    a.max(b)
}

fn plan_newest_wins(pair: &ClaimPair) -> Result<ResolutionPlan, String> {
    let mut earlier = pair.earlier.clone();
    let mut later = pair.later.clone();

    later.state = EdgeState::Valid;
    earlier.state = EdgeState::Invalidated;
    earlier.invalidated_at = Some(later.valid_from);

    Ok(ResolutionPlan {
        earlier,
        later,
        multi_valued: false,
    })
}

fn newest_wins_satisfied(pair: &ClaimPair) -> bool {
    pair.later.state == EdgeState::Valid
        && pair.earlier.state == EdgeState::Invalidated
        && pair.earlier.invalidated_at == Some(pair.later.valid_from)
}

fn plan_merge(pair: &ClaimPair) -> Result<ResolutionPlan, String> {
    let mut earlier = pair.earlier.clone();
    let mut later = pair.later.clone();
    let confidence = merged_confidence(earlier.confidence, later.confidence);

    for edge in [&mut earlier, &mut later] {
        edge.state = EdgeState::MergedValid;
        edge.confidence = confidence;
    }

    Ok(ResolutionPlan {
        earlier,
        later,
        multi_valued: true,
    })
}

fn merge_satisfied(pair: &ClaimPair) -> bool {
    pair.edges().iter().all(|e| e.state == EdgeState::MergedValid)
}

fn plan_split_timeline(pair: &ClaimPair) -> Result<ResolutionPlan, String> {
    if pair.earlier.valid_from >= pair.later.valid_from {
        return Err(format!(
            "split_timeline needs distinct start times, both facts start at {}",
            pair.later.valid_from
        ));
    }

    let mut earlier = pair.earlier.clone();
    let mut later = pair.later.clone();

    // Half-open windows: [earlier.valid_from, later.valid_from) then [later.valid_from, ..)
    earlier.state = EdgeState::SplitValid;
    earlier.valid_to = Some(later.valid_from);
    later.state = EdgeState::Valid;

    Ok(ResolutionPlan {
        earlier,
        later,
        multi_valued: false,
    })
}

fn split_timeline_satisfied(pair: &ClaimPair) -> bool {
    pair.earlier.state == EdgeState::SplitValid
        && pair.earlier.valid_to == Some(pair.later.valid_from)
        && pair.later.state == EdgeState::Valid
}
