use crate::error::AppError;
use crate::sampler::Segment;
use crate::search::{SearchOutcome, SearchState};
use serde::Serialize;
use tracing::{info, warn};

/// One contiguous span of the timeline encoded at one CRF
#[derive(Debug, Clone, Serialize)]
pub struct Region {
    pub start_secs: f64,
    pub end_secs: f64,
    pub crf: u8,
    /// True when this region's segment never met the target and got
    /// the conservative substitute
    pub from_fallback: bool,
}

/// The parameter decision for the production encode
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DecisionKind {
    /// One CRF for the whole video
    Global { crf: u8 },
    /// Differing CRFs keyed by segment spans
    PerRegion { regions: Vec<Region> },
}

/// Aggregated outcome of all segment searches
#[derive(Debug, Clone, Serialize)]
pub struct FinalDecision {
    #[serde(flatten)]
    pub kind: DecisionKind,
    /// Extrapolated output size; informational only
    pub predicted_output_bytes: u64,
    /// Duration-weighted mean of expected segment scores; informational
    pub predicted_vmaf: f64,
    /// Segments that used the conservative fallback
    pub fallback_segments: Vec<usize>,
}

impl FinalDecision {
    /// The single CRF for a global decision, None for per-region
    pub fn global_crf(&self) -> Option<u8> {
        match &self.kind {
            DecisionKind::Global { crf } => Some(*crf),
            DecisionKind::PerRegion { .. } => None,
        }
    }
}

/// Expected encode outcome for one segment under the decided CRF
struct SegmentPlan {
    crf: u8,
    expected_score: f64,
    bytes_per_sec: f64,
    from_fallback: bool,
}

/// Combine terminal per-segment searches into one production decision.
///
/// Precondition (owned by the orchestrator): every state is terminal.
/// Fails only when not a single segment produced a scored trial; any
/// partial signal is reconciled via the conservative-fallback policy.
pub fn aggregate(
    states: &[SearchState],
    segments: &[Segment],
    total_duration_secs: f64,
    crf_tolerance: u8,
) -> Result<FinalDecision, AppError> {
    debug_assert!(states.iter().all(|s| s.is_converged()));
    debug_assert_eq!(states.len(), segments.len());

    // The most conservative parameter observed anywhere in the run:
    // substitute for segments whose own search never met target
    let conservative_crf = states
        .iter()
        .flat_map(|s| s.trials.iter())
        .filter(|t| t.is_scored())
        .map(|t| t.crf)
        .min()
        .ok_or_else(|| {
            AppError::AggregationInconsistency(
                "no segment produced a scored trial; nothing to decide from".to_string(),
            )
        })?;

    let mut fallback_segments = Vec::new();
    let mut plans = Vec::with_capacity(states.len());

    for (state, segment) in states.iter().zip(segments) {
        let plan = match state.outcome() {
            Some(SearchOutcome::Converged {
                crf,
                score,
                output_bytes,
            }) => SegmentPlan {
                crf: *crf,
                expected_score: *score,
                bytes_per_sec: *output_bytes as f64 / segment.duration_secs.max(0.001),
                from_fallback: false,
            },
            Some(SearchOutcome::QualityUnreachable { best }) => {
                fallback_segments.push(state.segment_index);
                // Prefer what this segment's own trials say about the
                // substituted CRF; fall back to its best-quality trial
                let observed = state
                    .trials
                    .iter()
                    .filter(|t| t.is_scored())
                    .find(|t| t.crf == conservative_crf);
                let (score, bytes) = match (observed, best) {
                    (Some(t), _) => (t.score.unwrap_or_default(), t.output_bytes.unwrap_or_default()),
                    (None, Some(b)) => (b.score, b.output_bytes),
                    (None, None) => (0.0, 0),
                };
                SegmentPlan {
                    crf: conservative_crf,
                    expected_score: score,
                    bytes_per_sec: bytes as f64 / segment.duration_secs.max(0.001),
                    from_fallback: true,
                }
            }
            None => {
                return Err(AppError::AggregationInconsistency(format!(
                    "segment {} search is not terminal",
                    state.segment_index
                )));
            }
        };
        plans.push(plan);
    }

    if !fallback_segments.is_empty() {
        warn!(
            "Segment(s) {:?} could not reach target quality; using conservative crf {}",
            fallback_segments, conservative_crf
        );
    }

    let min_crf = plans.iter().map(|p| p.crf).min().unwrap_or(conservative_crf);
    let max_crf = plans.iter().map(|p| p.crf).max().unwrap_or(conservative_crf);

    let kind = if max_crf - min_crf <= crf_tolerance {
        // Collapse to the most conservative converged value so no
        // region lands below its own requirement
        info!(
            "Segment CRFs within tolerance ({}..{}); collapsing to global crf {}",
            min_crf, max_crf, min_crf
        );
        DecisionKind::Global { crf: min_crf }
    } else {
        let regions = build_regions(&plans, segments, total_duration_secs);
        info!(
            "Segment CRFs spread {}..{} exceeds tolerance {}; keeping {} region(s)",
            min_crf,
            max_crf,
            crf_tolerance,
            regions.len()
        );
        DecisionKind::PerRegion { regions }
    };

    // Extrapolate each region's observed bytes-per-second to its span.
    // Full-length behavior can diverge (different reference patterns),
    // so this is an estimate, not a guarantee.
    let mut predicted_bytes = 0.0;
    let mut weighted_score = 0.0;
    for (plan, span) in plans.iter().zip(region_spans(segments, total_duration_secs)) {
        let span_secs = span.1 - span.0;
        predicted_bytes += plan.bytes_per_sec * span_secs;
        weighted_score += plan.expected_score * span_secs;
    }
    let predicted_vmaf = if total_duration_secs > 0.0 {
        weighted_score / total_duration_secs
    } else {
        0.0
    };

    Ok(FinalDecision {
        kind,
        predicted_output_bytes: predicted_bytes as u64,
        predicted_vmaf,
        fallback_segments,
    })
}

/// Each segment stands in for the span from its start to the next
/// segment's start; the first span starts at zero
fn region_spans(segments: &[Segment], total_duration_secs: f64) -> Vec<(f64, f64)> {
    (0..segments.len())
        .map(|i| {
            let start = if i == 0 { 0.0 } else { segments[i].start_secs };
            let end = segments
                .get(i + 1)
                .map(|s| s.start_secs)
                .unwrap_or(total_duration_secs);
            (start, end)
        })
        .collect()
}

fn build_regions(
    plans: &[SegmentPlan],
    segments: &[Segment],
    total_duration_secs: f64,
) -> Vec<Region> {
    let spans = region_spans(segments, total_duration_secs);
    let mut regions: Vec<Region> = Vec::new();
    for (plan, span) in plans.iter().zip(spans) {
        // Merge adjacent spans that landed on the same CRF
        if let Some(last) = regions.last_mut()
            && last.crf == plan.crf
        {
            last.end_secs = span.1;
            last.from_fallback |= plan.from_fallback;
            continue;
        }
        regions.push(Region {
            start_secs: span.0,
            end_secs: span.1,
            crf: plan.crf,
            from_fallback: plan.from_fallback,
        });
    }
    regions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trial::{TrialResult, TrialStatus};
    use std::path::PathBuf;
    use std::time::Duration;

    fn segment(index: usize, start: f64) -> Segment {
        Segment {
            index,
            start_secs: start,
            duration_secs: 12.0,
            sample_path: PathBuf::from(format!("/tmp/seg{:02}.mkv", index)),
        }
    }

    fn scored_trial(index: usize, crf: u8, score: f64, bytes: u64) -> TrialResult {
        TrialResult {
            segment_index: index,
            crf,
            attempt: 0,
            output_bytes: Some(bytes),
            score: Some(score),
            status: TrialStatus::Completed,
            wall: Duration::from_secs(2),
        }
    }

    /// A terminal state that converged at `crf`
    fn converged_state(index: usize, crf: u8, score: f64, bytes: u64) -> SearchState {
        let mut state = SearchState::new(index, 12, 36);
        state.push_trial(scored_trial(index, crf, score, bytes));
        state.finish(score - 0.5);
        assert!(matches!(
            state.outcome().unwrap(),
            SearchOutcome::Converged { .. }
        ));
        state
    }

    /// A terminal state whose trials never met the target
    fn unreachable_state(index: usize, best_crf: u8, best_score: f64) -> SearchState {
        let mut state = SearchState::new(index, 12, 36);
        state.push_trial(scored_trial(index, best_crf, best_score, 30_000_000));
        state.finish(96.0);
        state
    }

    #[test]
    fn close_crfs_collapse_to_conservative_global() {
        let states = vec![
            converged_state(0, 22, 96.5, 10_000_000),
            converged_state(1, 23, 96.2, 9_000_000),
            converged_state(2, 24, 96.1, 8_000_000),
        ];
        let segments = vec![segment(0, 100.0), segment(1, 300.0), segment(2, 500.0)];
        let decision = aggregate(&states, &segments, 600.0, 2).unwrap();
        assert_eq!(decision.global_crf(), Some(22));
        assert!(decision.fallback_segments.is_empty());
    }

    #[test]
    fn wide_spread_keeps_regions() {
        let states = vec![
            converged_state(0, 14, 96.5, 20_000_000),
            converged_state(1, 30, 96.2, 6_000_000),
        ];
        let segments = vec![segment(0, 100.0), segment(1, 400.0)];
        let decision = aggregate(&states, &segments, 600.0, 2).unwrap();
        match &decision.kind {
            DecisionKind::PerRegion { regions } => {
                assert_eq!(regions.len(), 2);
                assert_eq!(regions[0].crf, 14);
                assert_eq!(regions[0].start_secs, 0.0);
                assert_eq!(regions[0].end_secs, 400.0);
                assert_eq!(regions[1].crf, 30);
                assert_eq!(regions[1].end_secs, 600.0);
            }
            other => panic!("expected regions, got {:?}", other),
        }
    }

    #[test]
    fn adjacent_regions_with_same_crf_merge() {
        let states = vec![
            converged_state(0, 14, 96.5, 20_000_000),
            converged_state(1, 14, 96.4, 19_000_000),
            converged_state(2, 30, 96.2, 6_000_000),
        ];
        let segments = vec![segment(0, 100.0), segment(1, 250.0), segment(2, 400.0)];
        let decision = aggregate(&states, &segments, 600.0, 2).unwrap();
        match &decision.kind {
            DecisionKind::PerRegion { regions } => {
                assert_eq!(regions.len(), 2);
                assert_eq!(regions[0].end_secs, 400.0);
            }
            other => panic!("expected regions, got {:?}", other),
        }
    }

    #[test]
    fn unreachable_segments_get_most_conservative_observed_crf() {
        let states = vec![
            converged_state(0, 25, 96.3, 8_000_000),
            unreachable_state(1, 12, 93.0),
        ];
        let segments = vec![segment(0, 100.0), segment(1, 400.0)];
        let decision = aggregate(&states, &segments, 600.0, 2).unwrap();
        assert_eq!(decision.fallback_segments, vec![1]);
        match &decision.kind {
            DecisionKind::PerRegion { regions } => {
                let fallback_region = regions.iter().find(|r| r.from_fallback).unwrap();
                // Most conservative scored crf anywhere in the run is 12
                assert_eq!(fallback_region.crf, 12);
            }
            other => panic!("expected regions, got {:?}", other),
        }
    }

    #[test]
    fn all_unreachable_still_produces_a_decision() {
        let states = vec![unreachable_state(0, 12, 94.0), unreachable_state(1, 12, 92.0)];
        let segments = vec![segment(0, 100.0), segment(1, 400.0)];
        let decision = aggregate(&states, &segments, 600.0, 2).unwrap();
        assert_eq!(decision.global_crf(), Some(12));
        assert_eq!(decision.fallback_segments, vec![0, 1]);
        assert!(decision.predicted_vmaf < 96.0);
    }

    #[test]
    fn no_scored_trials_is_inconsistency() {
        let mut state = SearchState::new(0, 12, 36);
        state.finish(96.0);
        let states = vec![state];
        let segments = vec![segment(0, 100.0)];
        let err = aggregate(&states, &segments, 600.0, 2).unwrap_err();
        assert!(matches!(err, AppError::AggregationInconsistency(_)));
    }

    #[test]
    fn predicted_size_extrapolates_bytes_per_second() {
        // One segment: 12s trial at 12_000_000 bytes = 1 MB/s over 600s
        let states = vec![converged_state(0, 24, 96.5, 12_000_000)];
        let segments = vec![segment(0, 100.0)];
        let decision = aggregate(&states, &segments, 600.0, 2).unwrap();
        assert_eq!(decision.predicted_output_bytes, 600_000_000);
    }
}
