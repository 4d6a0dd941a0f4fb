//! Classification prompt.

use support_copilot_core::ticket::{Category, Sentiment};

/// Sentiments the model may answer with, in prompt order
pub const ALLOWED_SENTIMENTS: [Sentiment; 3] =
    [Sentiment::Positive, Sentiment::Neutral, Sentiment::Negative];

/// Builds the strict JSON-only prompt for one ticket description
#[must_use]
pub fn build_prompt(description: &str) -> String {
    let categories = Category::ALL.map(Category::label).join(", ");
    let sentiments = ALLOWED_SENTIMENTS.map(Sentiment::label).join(", ");

    format!(
        "You are a support ticket classifier.

Return ONLY a valid JSON object with the exact keys:
- category
- sentiment

Allowed values:
- category: [{categories}]
- sentiment: [{sentiments}]

Rules:
- Do NOT add any extra keys.
- Do NOT include explanations.
- Output must be strict JSON (no markdown, no code fences).

Ticket description:
\"\"\"{description}\"\"\""
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_allowed_labels() {
        let prompt = build_prompt("Refund please");

        assert!(prompt.contains("- category: [Technical, Billing, Commercial]"));
        assert!(prompt.contains("- sentiment: [Positive, Neutral, Negative]"));
    }

    #[test]
    fn quotes_the_description_last() {
        let prompt = build_prompt("App crashes on login");

        assert!(prompt.starts_with("You are a support ticket classifier."));
        assert!(prompt.ends_with("\"\"\"App crashes on login\"\"\""));
    }
}
