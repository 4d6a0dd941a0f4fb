//! Plain-text rendering of the desk view.

use std::fmt::Write;
use support_copilot_core::view::{DeskView, StatusBadge, TicketCard, TicketListView, Tone};

const TITLE: &str = "AI Support Copilot";
const RULE: &str = "----------------------------------------";

/// Renders one screen
#[must_use]
pub fn render(view: &DeskView) -> String {
    let mut out = String::new();

    let live = if view.header.live { "[Live]" } else { "[Offline]" };
    let _ = writeln!(out, "{TITLE}  {live}");
    let _ = writeln!(out, "{RULE}");

    render_list(&mut out, &view.list);

    let _ = writeln!(out, "{RULE}");
    if let Some(error) = &view.form.error {
        let _ = writeln!(out, "! {error}");
    }
    let prompt = if view.form.busy {
        view.form.button_label
    } else {
        "Describe your issue and press Enter"
    };
    let _ = writeln!(out, "> {prompt}");

    out
}

fn render_list(out: &mut String, list: &TicketListView) {
    match list {
        TicketListView::Loading { placeholders } => {
            for _ in 0..*placeholders {
                let _ = writeln!(out, "  ░░░░░░░░░░░░  ░░░░░░░░░░░░░░░░░░░░");
            }
        },
        TicketListView::Empty => {
            let _ = writeln!(out, "No tickets yet");
            let _ = writeln!(
                out,
                "Create your first ticket to get started. AI will process it automatically."
            );
        },
        TicketListView::Populated(cards) => {
            for card in cards {
                render_card(out, card);
            }
        },
    }
}

fn render_card(out: &mut String, card: &TicketCard) {
    let marker = match card.status {
        StatusBadge::Pending => '·',
        StatusBadge::Processed => '✓',
        StatusBadge::FailedToSubmit => '✗',
    };
    let _ = writeln!(
        out,
        "{marker} {}  [{}]",
        card.timestamp,
        card.status.label()
    );
    let _ = writeln!(out, "  {}", card.description);

    let mut tags = format!("  #{}", card.category);
    if let Some(sentiment) = &card.sentiment {
        let sign = match sentiment.tone {
            Tone::Positive => "+",
            Tone::Negative => "-",
            Tone::Neutral => "~",
        };
        let _ = write!(tags, "  {sign}{}", sentiment.label);
    }
    let _ = writeln!(out, "{tags}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use support_copilot_core::ticket::TicketId;
    use support_copilot_core::view::{FormView, HeaderView, SKELETON_COUNT, SentimentTag};

    fn view(list: TicketListView) -> DeskView {
        DeskView {
            header: HeaderView { live: true },
            form: FormView {
                can_submit: false,
                busy: false,
                character_count: 0,
                button_label: "Submit Ticket",
                error: None,
            },
            list,
        }
    }

    fn card(status: StatusBadge, sentiment: Option<SentimentTag>) -> TicketCard {
        TicketCard {
            id: TicketId::new("t1"),
            timestamp: "Jan 1, 2024, 12:00 AM".to_string(),
            description: "My invoice is wrong".to_string(),
            status,
            category: "Billing".to_string(),
            sentiment,
        }
    }

    #[test]
    fn loading_shows_skeleton_rows() {
        let screen = render(&view(TicketListView::Loading {
            placeholders: SKELETON_COUNT,
        }));

        assert_eq!(
            screen.lines().filter(|line| line.starts_with("  ░")).count(),
            SKELETON_COUNT
        );
    }

    #[test]
    fn empty_list_invites_first_ticket() {
        let screen = render(&view(TicketListView::Empty));
        assert!(screen.contains("No tickets yet"));
    }

    #[test]
    fn cards_show_badge_category_and_sentiment() {
        let screen = render(&view(TicketListView::Populated(vec![
            card(
                StatusBadge::Processed,
                Some(SentimentTag {
                    label: "Negative",
                    tone: Tone::Negative,
                }),
            ),
            card(StatusBadge::FailedToSubmit, None),
        ])));

        assert!(screen.contains("✓ Jan 1, 2024, 12:00 AM  [Processed]"));
        assert!(screen.contains("  #Billing  -Negative"));
        assert!(screen.contains("✗ Jan 1, 2024, 12:00 AM  [Failed to submit]"));
    }

    #[test]
    fn header_and_form_state() {
        let mut offline = view(TicketListView::Empty);
        offline.header.live = false;
        offline.form.busy = true;
        offline.form.button_label = "Processing...";
        offline.form.error = Some("Could not save ticket: db down".to_string());

        let screen = render(&offline);

        assert!(screen.starts_with("AI Support Copilot  [Offline]"));
        assert!(screen.contains("! Could not save ticket: db down"));
        assert!(screen.contains("> Processing..."));
    }
}
