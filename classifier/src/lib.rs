//! Ticket classification service.
//!
//! A small HTTP service: the desk client posts `{ticket_id, description}` to
//! `/process-ticket`, the service asks a language model for a category and a
//! sentiment, validates the answer against the allowed labels and writes it
//! back through the record store. The client learns about the result from its
//! update subscription, not from this response.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use support_copilot_classifier::{AppState, Config, TicketProcessor, router};
//!
//! let state = AppState {
//!     config: Arc::new(Config::from_env()),
//!     processor: TicketProcessor::new(model),
//!     records,
//! };
//! axum::serve(listener, router(state)).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod model;
pub mod processor;
pub mod prompt;
pub mod routes;

pub use config::Config;
pub use error::AppError;
pub use model::{ChatCompletionsClient, LanguageModel, ModelError};
pub use processor::{ClassificationError, TicketProcessor};
pub use routes::{AppState, router};
