//! The ticket entity.
//!
//! A ticket is created by the client with a client-generated identifier and
//! stays unprocessed until the external classifier writes back a category and
//! a sentiment. Only those classification fields (and `processed`) ever change
//! after creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque, client-generated ticket identifier
///
/// The same identifier is used for the optimistic entry and for the stored
/// row, so an entry keeps its identity from submission to classification.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(String);

impl TicketId {
    /// Wraps an existing identifier
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random identifier (UUID v4)
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TicketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TicketId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Sentiment label attached by the classifier
///
/// Labels are matched case-insensitively. Anything the client does not
/// recognize becomes [`Sentiment::Unknown`] instead of being guessed at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Sentiment {
    /// Satisfied or appreciative tone
    Positive,
    /// Frustrated or unhappy tone
    Negative,
    /// Neither positive nor negative
    Neutral,
    /// A label this client does not recognize
    Unknown,
}

impl Sentiment {
    /// Parses a classifier label
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "positive" => Self::Positive,
            "negative" => Self::Negative,
            "neutral" => Self::Neutral,
            _ => Self::Unknown,
        }
    }

    /// Canonical label
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Positive => "Positive",
            Self::Negative => "Negative",
            Self::Neutral => "Neutral",
            Self::Unknown => "Unknown",
        }
    }
}

impl From<String> for Sentiment {
    fn from(label: String) -> Self {
        Self::from_label(&label)
    }
}

impl From<Sentiment> for String {
    fn from(sentiment: Sentiment) -> Self {
        sentiment.label().to_string()
    }
}

impl std::fmt::Display for Sentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Category assigned by the classifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Bugs, outages, integration problems
    Technical,
    /// Invoices, charges, refunds
    Billing,
    /// Pricing, plans, sales questions
    Commercial,
}

impl Category {
    /// All categories, in prompt order
    pub const ALL: [Self; 3] = [Self::Technical, Self::Billing, Self::Commercial];

    /// Parses a label, case-insensitively
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|category| category.label().eq_ignore_ascii_case(label.trim()))
    }

    /// Canonical label
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Technical => "Technical",
            Self::Billing => "Billing",
            Self::Commercial => "Commercial",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of classifying one ticket
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Assigned category
    pub category: Category,
    /// Assigned sentiment
    pub sentiment: Sentiment,
}

/// A support ticket
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Client-generated identifier
    pub id: TicketId,
    /// Creation time, the only ordering key
    pub created_at: DateTime<Utc>,
    /// Free text entered by the user
    pub description: String,
    /// Category label, absent until classified
    pub category: Option<String>,
    /// Sentiment, absent until classified
    pub sentiment: Option<Sentiment>,
    /// Set by the classifier writeback
    pub processed: bool,
}

impl Ticket {
    /// Creates an unprocessed ticket with no classification
    #[must_use]
    pub fn new(id: TicketId, description: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            created_at,
            description: description.into(),
            category: None,
            sentiment: None,
            processed: false,
        }
    }

    /// Copies the classification fields of `update` onto this ticket
    ///
    /// `id`, `created_at` and `description` are left untouched.
    pub fn absorb_update(&mut self, update: &Self) {
        self.category.clone_from(&update.category);
        self.sentiment = update.sentiment;
        self.processed = update.processed;
    }

    /// Returns this ticket as the classifier would write it back
    #[must_use]
    pub fn classified(mut self, classification: Classification) -> Self {
        self.category = Some(classification.category.label().to_string());
        self.sentiment = Some(classification.sentiment);
        self.processed = true;
        self
    }
}
