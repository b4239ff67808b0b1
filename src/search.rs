use crate::config::SearchConfig;
use crate::sampler::Segment;
use crate::trial::{TrialResult, TrialRunner};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The best trial a failed search has to offer as a fallback
#[derive(Debug, Clone)]
pub struct BestEffort {
    pub crf: u8,
    pub score: f64,
    pub output_bytes: u64,
}

/// Terminal disposition of one segment's search
#[derive(Debug, Clone)]
pub enum SearchOutcome {
    /// A CRF meeting the target was found
    Converged {
        crf: u8,
        score: f64,
        output_bytes: u64,
    },
    /// No tried CRF met the target within the range and budget
    QualityUnreachable {
        /// Highest-scoring trial observed, if any trial scored at all
        best: Option<BestEffort>,
    },
}

/// Per-segment search state: bounds, visited trials, terminal outcome.
///
/// Owned by exactly one controller; immutable once `converged` is set.
#[derive(Debug)]
pub struct SearchState {
    pub segment_index: usize,
    /// Current inclusive bounds over the CRF range. Signed so the
    /// crossed-bounds terminal condition needs no underflow care.
    lo: i32,
    hi: i32,
    pub trials: Vec<TrialResult>,
    seen_good: bool,
    seen_bad: bool,
    converged: bool,
    outcome: Option<SearchOutcome>,
    monotonicity_warned: bool,
}

impl SearchState {
    pub fn new(segment_index: usize, crf_min: u8, crf_max: u8) -> Self {
        Self {
            segment_index,
            lo: crf_min as i32,
            hi: crf_max as i32,
            trials: Vec::new(),
            seen_good: false,
            seen_bad: false,
            converged: false,
            outcome: None,
            monotonicity_warned: false,
        }
    }

    /// Next CRF to probe, or None when the bounds have crossed.
    ///
    /// Midpoint by default. Two asymmetric jumps shorten the easy
    /// cases: all-good history probes the cheap bound directly
    /// (trivially compressible content converges in two trials), and
    /// all-bad history probes the best-quality bound (hopeless content
    /// fails fast).
    pub fn next_candidate(&self) -> Option<u8> {
        if self.converged || self.lo > self.hi {
            return None;
        }
        let candidate = match (self.seen_good, self.seen_bad) {
            (true, false) => self.hi,
            (false, true) => self.lo,
            _ => (self.lo + self.hi) / 2,
        };
        Some(candidate as u8)
    }

    /// Record a scored probe and tighten the bounds around it
    pub fn apply_scored(&mut self, crf: u8, score: f64, output_bytes: u64, target: f64) {
        debug_assert!(!self.converged);
        self.check_monotonicity(score, output_bytes);
        if score >= target {
            self.seen_good = true;
            self.lo = crf as i32 + 1;
        } else {
            self.seen_bad = true;
            self.hi = crf as i32 - 1;
        }
    }

    /// Record a probe that stayed unscoreable after retries. Treated as
    /// failing the target so quality is never silently undershot.
    pub fn apply_unscoreable(&mut self, crf: u8) {
        debug_assert!(!self.converged);
        self.seen_bad = true;
        self.hi = crf as i32 - 1;
    }

    /// Append a trial to the visited sequence
    pub fn push_trial(&mut self, trial: TrialResult) {
        debug_assert!(!self.converged);
        self.trials.push(trial);
    }

    /// Seal the search and fix its outcome. One-way: no bound or trial
    /// mutation is accepted afterwards.
    pub fn finish(&mut self, target: f64) {
        if self.converged {
            return;
        }
        self.converged = true;
        self.outcome = Some(self.decide(target));
    }

    pub fn is_converged(&self) -> bool {
        self.converged
    }

    pub fn outcome(&self) -> Option<&SearchOutcome> {
        self.outcome.as_ref()
    }

    /// Number of trials issued, retries included
    pub fn trials_used(&self) -> u32 {
        self.trials.len() as u32
    }

    fn decide(&self, target: f64) -> SearchOutcome {
        let goods: Vec<&TrialResult> = self
            .trials
            .iter()
            .filter(|t| t.is_scored() && t.score.unwrap_or(f64::MIN) >= target)
            .collect();

        // Chosen parameter: the tightest compression that still met
        // target. On a score tie, prefer the smaller output.
        if let Some(best) = goods.iter().max_by_key(|t| t.crf) {
            let chosen = goods
                .iter()
                .filter(|t| t.score == best.score)
                .min_by_key(|t| t.output_bytes)
                .unwrap_or(best);
            return SearchOutcome::Converged {
                crf: chosen.crf,
                score: chosen.score.unwrap_or_default(),
                output_bytes: chosen.output_bytes.unwrap_or_default(),
            };
        }

        let best = self
            .trials
            .iter()
            .filter(|t| t.is_scored())
            .max_by(|a, b| {
                a.score
                    .partial_cmp(&b.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|t| BestEffort {
                crf: t.crf,
                score: t.score.unwrap_or_default(),
                output_bytes: t.output_bytes.unwrap_or_default(),
            });

        SearchOutcome::QualityUnreachable { best }
    }

    /// The search assumes size shrinks as quality drops. A violation
    /// does not break termination (bounds always tighten), but it does
    /// mean the chosen point may not be the cheapest one.
    fn check_monotonicity(&mut self, score: f64, output_bytes: u64) {
        if self.monotonicity_warned {
            return;
        }
        let violated = self.trials.iter().any(|t| {
            t.is_scored()
                && ((t.score.unwrap_or_default() < score && t.output_bytes.unwrap_or_default() > output_bytes)
                    || (t.score.unwrap_or_default() > score
                        && t.output_bytes.unwrap_or_default() < output_bytes))
        });
        if violated {
            self.monotonicity_warned = true;
            warn!(
                "Segment {}: size/quality monotonicity violated; continuing with conservative bounds",
                self.segment_index
            );
        }
    }
}

/// Drives one segment's bisection. Independent per segment; shares
/// nothing mutable with other controllers.
pub struct SearchController {
    runner: Arc<TrialRunner>,
    config: SearchConfig,
    target_vmaf: f64,
}

impl SearchController {
    pub fn new(runner: Arc<TrialRunner>, config: SearchConfig, target_vmaf: f64) -> Self {
        Self {
            runner,
            config,
            target_vmaf,
        }
    }

    /// Search one segment to a terminal state. Trials are strictly
    /// sequential within the segment: each probe depends on the
    /// previous result.
    pub async fn run(&self, segment: &Segment) -> SearchState {
        let mut state = SearchState::new(segment.index, self.config.crf_min, self.config.crf_max);
        let budget = self.config.max_trials_per_segment;

        while let Some(crf) = state.next_candidate() {
            if state.trials_used() >= budget {
                debug!(
                    "Segment {}: trial budget ({}) exhausted",
                    segment.index, budget
                );
                break;
            }

            match self.probe_candidate(&mut state, segment, crf, budget).await {
                Some((score, output_bytes)) => {
                    state.apply_scored(crf, score, output_bytes, self.target_vmaf)
                }
                None => {
                    debug!(
                        "Segment {}: crf {} unscoreable, tightening toward higher quality",
                        segment.index, crf
                    );
                    state.apply_unscoreable(crf);
                }
            }
        }

        state.finish(self.target_vmaf);
        match state.outcome() {
            Some(SearchOutcome::Converged { crf, score, .. }) => info!(
                "Segment {}: converged at crf {} (vmaf {:.2}) after {} trial(s)",
                segment.index,
                crf,
                score,
                state.trials_used()
            ),
            Some(SearchOutcome::QualityUnreachable { best }) => warn!(
                "Segment {}: target {:.1} unreachable after {} trial(s){}",
                segment.index,
                self.target_vmaf,
                state.trials_used(),
                best.as_ref()
                    .map(|b| format!("; best was crf {} at vmaf {:.2}", b.crf, b.score))
                    .unwrap_or_default()
            ),
            None => {}
        }
        state
    }

    /// Probe one candidate, retrying transient tool failures with the
    /// same CRF up to the retry budget
    async fn probe_candidate(
        &self,
        state: &mut SearchState,
        segment: &Segment,
        crf: u8,
        budget: u32,
    ) -> Option<(f64, u64)> {
        let mut attempt = 0;
        while state.trials_used() < budget && attempt <= self.config.max_retries {
            let result = self.runner.run_trial(segment, crf, attempt).await;
            let scored = result.score.zip(result.output_bytes).filter(|_| result.is_scored());
            if scored.is_none() {
                debug!(
                    "Segment {}: crf {} attempt {} unscored after {:?}",
                    segment.index, crf, result.attempt, result.wall
                );
            }
            state.push_trial(result);
            if scored.is_some() {
                return scored;
            }
            attempt += 1;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::mock::{MockCall, MockEncode, MockTools};
    use crate::tools::{ScoreProfile, ToolSuite};
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Semaphore;

    fn segment() -> Segment {
        Segment {
            index: 0,
            start_secs: 60.0,
            duration_secs: 12.0,
            sample_path: PathBuf::from("/tmp/seg00_at60s.mkv"),
        }
    }

    fn search_config() -> SearchConfig {
        SearchConfig::default()
    }

    fn controller_with(tools: impl ToolSuite + 'static, config: SearchConfig) -> SearchController {
        let runner = TrialRunner::new(
            Arc::new(tools),
            Arc::new(Semaphore::new(2)),
            Duration::from_secs(5),
            ScoreProfile {
                model: "vmaf_v0.6.1neg",
                pixel_format: "yuv420p",
                threads: 1,
                subsample: 1,
            },
            "slow".to_string(),
            "yuv420p",
            std::env::temp_dir(),
        );
        SearchController::new(Arc::new(runner), config, 96.0)
    }

    /// Linear score curve crossing the target between crf_min and crf_max
    fn sloped_tools() -> MockTools {
        // 99.5 at crf 12, about 87.5 at crf 36; crosses 96.0 at crf 19
        MockTools::new(|_, crf| Some(99.5 - (crf as f64 - 12.0) * 0.5))
    }

    #[tokio::test]
    async fn converges_to_highest_crf_meeting_target() {
        let controller = controller_with(sloped_tools(), search_config());
        let state = controller.run(&segment()).await;
        assert!(state.is_converged());
        match state.outcome().unwrap() {
            SearchOutcome::Converged { crf, score, .. } => {
                assert_eq!(*crf, 19, "99.5 - (19-12)*0.5 = 96.0 is the last good crf");
                assert!(*score >= 96.0);
            }
            other => panic!("expected convergence, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn chosen_score_meets_target_for_any_curve() {
        for crossing in [12.0, 15.0, 24.0, 30.0, 36.0] {
            let tools = MockTools::new(move |_, crf| {
                Some(if (crf as f64) <= crossing { 97.0 } else { 90.0 })
            });
            let controller = controller_with(tools, search_config());
            let state = controller.run(&segment()).await;
            if let Some(SearchOutcome::Converged { crf, score, .. }) = state.outcome() {
                assert!(
                    *score >= 96.0,
                    "crossing {}: chose crf {} below target",
                    crossing,
                    crf
                );
                assert_eq!(*crf as f64, crossing);
            } else {
                panic!("crossing {}: should converge", crossing);
            }
        }
    }

    #[tokio::test]
    async fn trivially_compressible_content_converges_in_two_trials() {
        // Every crf meets the target: first midpoint probe is good,
        // second probe jumps straight to the cheap bound
        let tools = MockTools::new(|_, _| Some(99.0));
        let controller = controller_with(tools, search_config());
        let state = controller.run(&segment()).await;
        assert_eq!(state.trials_used(), 2);
        match state.outcome().unwrap() {
            SearchOutcome::Converged { crf, .. } => assert_eq!(*crf, 36),
            other => panic!("expected convergence, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn hopeless_content_fails_fast_as_unreachable() {
        let tools = MockTools::new(|_, _| Some(80.0));
        let controller = controller_with(tools, search_config());
        let state = controller.run(&segment()).await;
        assert_eq!(state.trials_used(), 2, "midpoint bad, then jump to crf_min");
        match state.outcome().unwrap() {
            SearchOutcome::QualityUnreachable { best } => {
                let best = best.as_ref().unwrap();
                assert_eq!(best.score, 80.0);
            }
            other => panic!("expected unreachable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn trial_count_stays_within_log_bound() {
        for crossing in 12..=36u8 {
            let tools =
                MockTools::new(move |_, crf| Some(if crf <= crossing { 96.5 } else { 95.0 }));
            let controller = controller_with(tools, search_config());
            let state = controller.run(&segment()).await;
            // space = 25 discrete values; ceil(log2(25)) + 2 = 7
            assert!(
                state.trials_used() <= 7,
                "crossing {}: {} trials",
                crossing,
                state.trials_used()
            );
        }
    }

    #[tokio::test]
    async fn never_exceeds_trial_budget() {
        let mut config = search_config();
        config.max_trials_per_segment = 3;
        // Scores hover at the target boundary to force a long search
        let tools = MockTools::new(|_, crf| Some(if crf <= 23 { 96.1 } else { 95.9 }));
        let controller = controller_with(tools, config);
        let state = controller.run(&segment()).await;
        assert!(state.trials_used() <= 3);
        assert!(state.is_converged());
    }

    #[tokio::test]
    async fn transient_tool_failure_is_retried_then_scored() {
        // Encoder fails the first two attempts at any candidate,
        // then recovers on the final retry
        let tools = MockTools::new(|_, _| Some(99.0)).with_encode(|call| match call {
            MockCall::Trial { attempt, .. } if *attempt < 2 => MockEncode::Fail,
            _ => MockEncode::Ok,
        });
        let controller = controller_with(tools, search_config());
        let state = controller.run(&segment()).await;
        assert!(state.is_converged());
        assert!(matches!(
            state.outcome().unwrap(),
            SearchOutcome::Converged { .. }
        ));
        // First candidate burned two failed attempts before scoring
        assert!(state.trials_used() >= 3);
    }

    #[tokio::test]
    async fn persistent_failures_exhaust_budget_into_unreachable() {
        let tools = MockTools::new(|_, _| Some(99.0)).with_encode(|_| MockEncode::Fail);
        let controller = controller_with(tools, search_config());
        let state = controller.run(&segment()).await;
        assert!(state.is_converged());
        assert!(state.trials_used() <= search_config().max_trials_per_segment);
        match state.outcome().unwrap() {
            SearchOutcome::QualityUnreachable { best } => assert!(best.is_none()),
            other => panic!("expected unreachable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn score_jitter_within_tolerance_still_converges() {
        // Deterministic sub-0.05 jitter around a sloped curve, keyed on
        // crf parity: the kind of noise real metric runs exhibit
        let tools = MockTools::new(|_, crf| {
            let base = 99.5 - (crf as f64 - 12.0) * 0.5;
            Some(base + if crf % 2 == 0 { 0.04 } else { -0.04 })
        });
        let controller = controller_with(tools, search_config());
        let state = controller.run(&segment()).await;
        assert!(state.is_converged());
        if let Some(SearchOutcome::Converged { score, .. }) = state.outcome() {
            assert!(*score >= 96.0);
        } else {
            panic!("should converge despite jitter");
        }
    }

    #[tokio::test]
    async fn monotonicity_violation_degrades_gracefully() {
        // Size curve inverted at one point: bigger file, lower quality
        let tools = MockTools::new(|_, crf| Some(99.5 - (crf as f64 - 12.0) * 0.5))
            .with_bytes(|_, crf| {
                if crf == 19 {
                    50_000_000 // larger than any lower-crf trial
                } else {
                    40_000_000u64.saturating_sub(crf as u64 * 700_000)
                }
            });
        let controller = controller_with(tools, search_config());
        let state = controller.run(&segment()).await;
        // Still terminates and still refuses to commit below target
        assert!(state.is_converged());
        if let Some(SearchOutcome::Converged { score, .. }) = state.outcome() {
            assert!(*score >= 96.0);
        } else {
            panic!("should converge");
        }
    }

    #[tokio::test]
    async fn bounds_never_invert_during_search() {
        let mut state = SearchState::new(0, 12, 36);
        let mut guard = 0;
        while let Some(crf) = state.next_candidate() {
            assert!(state.lo <= state.hi + 1, "bounds inverted beyond terminal");
            state.apply_scored(crf, 90.0, 1_000, 96.0);
            guard += 1;
            assert!(guard < 30, "search must terminate");
        }
        state.finish(96.0);
        assert!(state.is_converged());
    }

    #[test]
    fn tie_on_score_prefers_smaller_output() {
        let mut state = SearchState::new(0, 12, 36);
        let mk = |crf: u8, score: f64, bytes: u64| TrialResult {
            segment_index: 0,
            crf,
            attempt: 0,
            output_bytes: Some(bytes),
            score: Some(score),
            status: crate::trial::TrialStatus::Completed,
            wall: Duration::from_secs(1),
        };
        state.push_trial(mk(20, 97.0, 9_000_000));
        state.push_trial(mk(24, 97.0, 8_000_000));
        state.finish(96.0);
        match state.outcome().unwrap() {
            SearchOutcome::Converged { crf, output_bytes, .. } => {
                assert_eq!(*crf, 24);
                assert_eq!(*output_bytes, 8_000_000);
            }
            other => panic!("expected convergence, got {:?}", other),
        }
    }

    #[test]
    fn outcome_is_immutable_after_finish() {
        let mut state = SearchState::new(0, 12, 36);
        state.finish(96.0);
        assert!(state.is_converged());
        // A second finish is a no-op, not a re-decision
        state.finish(10.0);
        assert!(matches!(
            state.outcome().unwrap(),
            SearchOutcome::QualityUnreachable { .. }
        ));
    }
}
