//! Feedback sink: user verdicts on agent messages.

use std::sync::Arc;

use tracing::instrument;

use crate::context::RequestContext;
use crate::store::{FeedbackOutcome, FeedbackStats, FeedbackUpsert, StoreError, TelemetryStore};

/// Append-only feedback persistence, upserted per (message, endpoint,
/// user).
pub struct FeedbackService {
    telemetry: Arc<dyn TelemetryStore>,
}

impl FeedbackService {
    pub fn new(telemetry: Arc<dyn TelemetryStore>) -> Self {
        Self { telemetry }
    }

    /// Records (or clears, when `outcome` is `None`) the caller's verdict
    /// on one message.
    #[instrument(skip(self, ctx), fields(correlation_id = %ctx.correlation_id))]
    pub async fn record(
        &self,
        ctx: &RequestContext,
        message_id: &str,
        endpoint: &str,
        game_id: &str,
        outcome: Option<FeedbackOutcome>,
    ) -> Result<(), StoreError> {
        self.telemetry
            .upsert_feedback(FeedbackUpsert {
                message_id: message_id.to_string(),
                endpoint: endpoint.to_string(),
                user_id: ctx.caller.user_id.clone(),
                game_id: game_id.to_string(),
                outcome,
            })
            .await
    }

    /// Totals and per-endpoint/per-outcome histograms.
    pub async fn stats(&self, game_id: Option<&str>) -> Result<FeedbackStats, StoreError> {
        self.telemetry.feedback_stats(game_id).await
    }
}
