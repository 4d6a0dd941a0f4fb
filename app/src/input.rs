//! Line-oriented ticket entry.
//!
//! Each line is one ticket. Lines are handled strictly in order: the next one
//! is not read until the previous submission finished, so text typed during a
//! submission waits in the input buffer instead of racing it.

use support_copilot_core::ticket::TicketId;
use support_copilot_runtime::session::{SessionError, TicketSession};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{info, warn};

/// Types `line` into the form and submits it
///
/// # Errors
///
/// Whatever [`TicketSession::submit`] returns, or [`SessionError::Store`] if
/// the draft could not be updated.
pub async fn submit_line(session: &TicketSession, line: &str) -> Result<TicketId, SessionError> {
    session.set_draft(line).await?;
    session.submit(line).await
}

/// Submits every line of `input` until it ends
///
/// Returns the number of tickets submitted successfully. Failures are shown
/// by the form and logged; they do not stop the loop.
///
/// # Errors
///
/// Returns the I/O error if `input` cannot be read.
pub async fn run_input<R>(session: &TicketSession, input: R) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut submitted = 0;

    while let Some(line) = lines.next_line().await? {
        match submit_line(session, &line).await {
            Ok(id) => {
                submitted += 1;
                info!(ticket_id = %id, "Ticket submitted");
            },
            Err(SessionError::Refused(reason)) => info!(reason, "Submission refused"),
            Err(SessionError::Store(error)) => {
                warn!(%error, "Session stopped accepting tickets");
                break;
            },
            Err(error) => warn!(%error, "Submission failed"),
        }
    }

    Ok(submitted)
}
