//! View projection.
//!
//! Pure functions from state to what the interface shows. Nothing here is
//! remembered between renders: every projection is recomputed from the
//! current state.

use crate::desk::DeskState;
use crate::submission::SubmissionState;
use crate::ticket::{Sentiment, Ticket, TicketId};
use crate::tickets::{LiveStatus, TicketEntry, TicketsState};
use serde::Serialize;

/// Number of placeholder cards shown while loading
pub const SKELETON_COUNT: usize = 3;

/// Label shown when a ticket has no category yet
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Timestamp layout on cards, e.g. `Jan 1, 2024, 12:00 AM`
pub const TIMESTAMP_FORMAT: &str = "%b %-d, %Y, %I:%M %p";

/// Status badge on a card
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum StatusBadge {
    /// Waiting for classification
    Pending,
    /// Classified
    Processed,
    /// Saving or triggering failed; the ticket will not progress
    FailedToSubmit,
}

impl StatusBadge {
    /// Badge text
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Processed => "Processed",
            Self::FailedToSubmit => "Failed to submit",
        }
    }
}

/// Visual treatment of a sentiment tag
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Tone {
    /// Positive styling
    Positive,
    /// Negative styling
    Negative,
    /// Neutral styling, also used for unknown labels
    Neutral,
}

impl From<Sentiment> for Tone {
    fn from(sentiment: Sentiment) -> Self {
        match sentiment {
            Sentiment::Positive => Self::Positive,
            Sentiment::Negative => Self::Negative,
            Sentiment::Neutral | Sentiment::Unknown => Self::Neutral,
        }
    }
}

/// Sentiment tag on a card
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SentimentTag {
    /// Tag text
    pub label: &'static str,
    /// Styling
    pub tone: Tone,
}

/// One rendered ticket
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TicketCard {
    /// Ticket identifier
    pub id: TicketId,
    /// Formatted creation time
    pub timestamp: String,
    /// Ticket text
    pub description: String,
    /// Status badge
    pub status: StatusBadge,
    /// Category label, or [`UNCATEGORIZED`]
    pub category: String,
    /// Present only once a sentiment is known
    pub sentiment: Option<SentimentTag>,
}

impl TicketCard {
    /// Projects one list entry
    #[must_use]
    pub fn project(entry: &TicketEntry) -> Self {
        let ticket: &Ticket = &entry.ticket;
        let status = if ticket.processed {
            StatusBadge::Processed
        } else if entry.delivery.is_failed() {
            StatusBadge::FailedToSubmit
        } else {
            StatusBadge::Pending
        };

        Self {
            id: ticket.id.clone(),
            timestamp: ticket.created_at.format(TIMESTAMP_FORMAT).to_string(),
            description: ticket.description.clone(),
            status,
            category: ticket
                .category
                .clone()
                .unwrap_or_else(|| UNCATEGORIZED.to_string()),
            sentiment: ticket.sentiment.map(|sentiment| SentimentTag {
                label: sentiment.label(),
                tone: sentiment.into(),
            }),
        }
    }
}

/// The ticket list, in exactly one of three shapes
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum TicketListView {
    /// Bulk load in progress
    Loading {
        /// Number of skeleton cards
        placeholders: usize,
    },
    /// Loaded, nothing to show
    Empty,
    /// Cards in display order
    Populated(Vec<TicketCard>),
}

impl TicketListView {
    /// Projects the synchronizer state
    ///
    /// Loading wins over content: entries inserted before the bulk load
    /// completes show up once it does.
    #[must_use]
    pub fn project(state: &TicketsState) -> Self {
        if state.loading {
            Self::Loading {
                placeholders: SKELETON_COUNT,
            }
        } else if state.is_empty() {
            Self::Empty
        } else {
            Self::Populated(state.entries.iter().map(TicketCard::project).collect())
        }
    }

    /// Cards, if populated
    #[must_use]
    pub fn cards(&self) -> &[TicketCard] {
        match self {
            Self::Populated(cards) => cards,
            Self::Loading { .. } | Self::Empty => &[],
        }
    }
}

/// The ticket form
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FormView {
    /// Whether the submit action is enabled
    pub can_submit: bool,
    /// Whether a submission is in flight
    pub busy: bool,
    /// Characters in the trimmed draft
    pub character_count: usize,
    /// Submit button text
    pub button_label: &'static str,
    /// Message of the last failure
    pub error: Option<String>,
}

impl FormView {
    /// Projects the form state
    #[must_use]
    pub fn project(state: &SubmissionState) -> Self {
        Self {
            can_submit: state.can_submit(),
            busy: state.busy,
            character_count: state.draft.trim().chars().count(),
            button_label: if state.busy {
                "Processing..."
            } else {
                "Submit Ticket"
            },
            error: state.error.as_ref().map(ToString::to_string),
        }
    }
}

/// Page header
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct HeaderView {
    /// Whether the live badge is lit
    pub live: bool,
}

impl HeaderView {
    /// Projects the push channel status
    #[must_use]
    pub const fn project(live: LiveStatus) -> Self {
        Self {
            live: matches!(live, LiveStatus::Live),
        }
    }
}

/// Everything rendered on one screen
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeskView {
    /// Header
    pub header: HeaderView,
    /// Ticket form
    pub form: FormView,
    /// Ticket list
    pub list: TicketListView,
}

impl DeskView {
    /// Projects the whole client state
    #[must_use]
    pub fn project(state: &DeskState) -> Self {
        Self {
            header: HeaderView::project(state.tickets.live),
            form: FormView::project(&state.submission),
            list: TicketListView::project(&state.tickets),
        }
    }
}
