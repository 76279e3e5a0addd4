//! Bounded review/revise loop over the trading plan
//!
//! ```text
//! review -> APPROVED ------------------------------> return draft
//!        -> NEEDS_REVISION, revisions < max -------> revise -> review ...
//!        -> NEEDS_REVISION, revisions == max ------> return draft as is
//! ```
//!
//! With `max_revisions = n` and no approval the loop makes `n` revision
//! calls and `n + 1` review calls. Each call is a full worker task, so its
//! own tool loop is bounded by the worker's `max_iterations`.

use crate::prompts::{REVIEW_TASK, REVISE_TASK, RunPrompts};
use crate::verdict::{ParseSource, Review, ReviewVerdict, parse_review};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use tradeflow_core::{Message, Role, RunContext};
use tradeflow_runtime::{WorkerOutcome, WorkerRuntime};

/// Working state of one review cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionState {
    pub draft: String,
    /// Revisions made so far
    pub iteration: usize,
    /// Tool-loop bound of each review/revise worker
    pub max_iterations: usize,
    pub max_revisions: usize,
    pub last_verdict: Option<ReviewVerdict>,
}

impl RevisionState {
    pub fn new(draft: impl Into<String>, max_iterations: usize, max_revisions: usize) -> Self {
        Self {
            draft: draft.into(),
            iteration: 0,
            max_iterations,
            max_revisions,
            last_verdict: None,
        }
    }

    pub fn revisions_exhausted(&self) -> bool {
        self.iteration >= self.max_revisions
    }
}

/// Result of a review cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionOutcome {
    /// Final draft, approved or not
    pub draft: String,
    pub revisions: usize,
    pub reviews: usize,
    pub approved: bool,
    pub last_review: Review,
    /// Every review and revise worker, in call order
    #[serde(skip)]
    pub workers: Vec<WorkerOutcome>,
}

impl RevisionOutcome {
    /// Draft with a note on how it got there
    pub fn annotated_draft(&self) -> String {
        let status = if self.approved {
            "approved"
        } else {
            "not approved"
        };
        format!(
            "{}\n\n[{} revision(s), {} review(s), final review {}]",
            self.draft.trim_end(),
            self.revisions,
            self.reviews,
            status
        )
    }
}

/// Drives the risk reviewer against the trader's draft
pub struct RevisionController<'a> {
    runtime: &'a WorkerRuntime,
    prompts: &'a RunPrompts<'a>,
    max_revisions: usize,
    risk_summary: Option<String>,
}

impl<'a> RevisionController<'a> {
    pub fn new(runtime: &'a WorkerRuntime, prompts: &'a RunPrompts<'a>, max_revisions: usize) -> Self {
        Self {
            runtime,
            prompts,
            max_revisions,
            risk_summary: None,
        }
    }

    /// Risk findings shown to the reviewer
    pub fn with_risk_summary(mut self, summary: impl Into<String>) -> Self {
        self.risk_summary = Some(summary.into());
        self
    }

    /// Run the cycle on `draft`
    pub async fn run(&self, draft: impl Into<String>, ctx: &RunContext) -> RevisionOutcome {
        let mut state = RevisionState::new(
            draft,
            self.runtime.config().max_iterations,
            self.max_revisions,
        );
        let mut workers = Vec::new();
        let mut reviews = 0;

        loop {
            reviews += 1;
            let (review, outcome) = self.review(&state, reviews, ctx).await;
            workers.push(outcome);
            state.last_verdict = Some(review.verdict);

            info!(
                review = reviews,
                revisions = state.iteration,
                verdict = %review.verdict,
                source = ?review.source,
                "Trading plan reviewed"
            );

            if review.is_approved() || state.revisions_exhausted() {
                if !review.is_approved() {
                    warn!(
                        revisions = state.iteration,
                        "Revision cap reached; keeping the unapproved draft"
                    );
                }
                return RevisionOutcome {
                    draft: state.draft,
                    revisions: state.iteration,
                    reviews,
                    approved: review.is_approved(),
                    last_review: review,
                    workers,
                };
            }

            state.iteration += 1;
            let outcome = self.revise(&state, &review, ctx).await;
            if outcome.is_fallback() {
                warn!(revision = state.iteration, "Revision failed; keeping the previous draft");
            } else {
                state.draft.clone_from(&outcome.report);
            }
            workers.push(outcome);
        }
    }

    async fn review(
        &self,
        state: &RevisionState,
        number: usize,
        ctx: &RunContext,
    ) -> (Review, WorkerOutcome) {
        let briefing = self.prompts.briefing(
            REVIEW_TASK,
            json!({
                "review": number,
                "draft": state.draft,
                "risk_summary": self.risk_summary,
            }),
        );
        let outcome = self
            .runtime
            .create_worker(
                Role::RiskReviewer,
                self.prompts.system(Role::RiskReviewer).text,
                vec![Message::user(briefing)],
            )
            .run(ctx)
            .await;

        let review = if outcome.is_fallback() {
            // an unreadable review must not block the plan
            Review {
                verdict: ReviewVerdict::Approved,
                feedback: outcome.report.clone(),
                issues: Vec::new(),
                source: ParseSource::Default,
            }
        } else {
            parse_review(&outcome.report)
        };

        (review, outcome)
    }

    async fn revise(&self, state: &RevisionState, review: &Review, ctx: &RunContext) -> WorkerOutcome {
        let briefing = self.prompts.briefing(
            REVISE_TASK,
            json!({
                "revision": state.iteration,
                "draft": state.draft,
                "feedback": review.feedback,
                "issues": review.issues,
            }),
        );
        self.runtime
            .create_worker(
                Role::Trader,
                self.prompts.system(Role::Trader).text,
                vec![Message::user(briefing)],
            )
            .run(ctx)
            .await
    }
}
