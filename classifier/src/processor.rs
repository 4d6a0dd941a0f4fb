//! Ticket classification.
//!
//! [`TicketProcessor`] prompts the model and validates its reply strictly:
//! the reply must be a JSON object whose `category` and `sentiment` are
//! exactly one of the allowed labels. Anything else is a
//! [`ClassificationError`], never a guess.

use crate::model::{LanguageModel, ModelError};
use crate::prompt::{ALLOWED_SENTIMENTS, build_prompt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use support_copilot_core::ticket::{Category, Classification};
use thiserror::Error;

/// Why a ticket could not be classified
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassificationError {
    /// The model call failed
    #[error("model call failed: {0}")]
    Model(#[from] ModelError),

    /// The reply was not a JSON object with both keys
    #[error("model returned invalid JSON: {0}")]
    InvalidJson(String),

    /// The reply used a category outside the allowed set
    #[error("model returned unknown category: {0}")]
    UnknownCategory(String),

    /// The reply used a sentiment outside the allowed set
    #[error("model returned unknown sentiment: {0}")]
    UnknownSentiment(String),
}

#[derive(Debug, Deserialize)]
struct RawClassification {
    category: String,
    sentiment: String,
}

/// Parses and validates a model reply
///
/// # Errors
///
/// Returns [`ClassificationError`] if the reply is not strict JSON or uses a
/// label outside the allowed sets.
pub fn parse_reply(reply: &str) -> Result<Classification, ClassificationError> {
    let raw: RawClassification = serde_json::from_str(reply.trim())
        .map_err(|e| ClassificationError::InvalidJson(e.to_string()))?;

    let category = Category::ALL
        .into_iter()
        .find(|c| c.label() == raw.category)
        .ok_or(ClassificationError::UnknownCategory(raw.category))?;
    let sentiment = ALLOWED_SENTIMENTS
        .into_iter()
        .find(|s| s.label() == raw.sentiment)
        .ok_or(ClassificationError::UnknownSentiment(raw.sentiment))?;

    Ok(Classification {
        category,
        sentiment,
    })
}

/// Classifies ticket descriptions with a language model
#[derive(Clone)]
pub struct TicketProcessor {
    model: Arc<dyn LanguageModel>,
}

impl TicketProcessor {
    /// Create a processor backed by `model`
    #[must_use]
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Classifies one description
    ///
    /// # Errors
    ///
    /// Returns [`ClassificationError`] if the model call fails or its reply
    /// does not validate.
    #[tracing::instrument(skip_all, fields(model = self.model.name()))]
    pub async fn classify(&self, description: &str) -> Result<Classification, ClassificationError> {
        let start = Instant::now();
        let reply = self.model.complete(build_prompt(description)).await;
        metrics::histogram!("classifier.llm.duration_seconds").record(start.elapsed().as_secs_f64());

        let reply = reply.inspect_err(|error| {
            tracing::warn!(%error, "Model call failed");
        })?;

        parse_reply(&reply).inspect_err(|error| {
            tracing::warn!(%error, output = %reply, "Model reply rejected");
        })
    }
}

impl std::fmt::Debug for TicketProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketProcessor")
            .field("model", &self.model.name())
            .finish()
    }
}

/// A model that always answers with the same reply, for tests and local runs
#[derive(Debug, Clone)]
pub struct FixedReplyModel {
    reply: Result<String, ModelError>,
}

impl FixedReplyModel {
    /// Always answer `reply`
    #[must_use]
    pub fn replying(reply: impl Into<String>) -> Self {
        Self {
            reply: Ok(reply.into()),
        }
    }

    /// Always fail with `error`
    #[must_use]
    pub const fn failing(error: ModelError) -> Self {
        Self { reply: Err(error) }
    }
}

impl LanguageModel for FixedReplyModel {
    fn complete(
        &self,
        _prompt: String,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<String, ModelError>> + Send + '_>>
    {
        let reply = self.reply.clone();
        Box::pin(async move { reply })
    }

    fn name(&self) -> &str {
        "fixed-reply"
    }
}
