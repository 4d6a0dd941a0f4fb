//! Scripted classification trigger
//!
//! Records every job it receives and answers with a configured outcome.
//! Optionally plays the external classifier: after accepting a job it writes
//! a classification back into an [`InMemoryRecordStore`], which pushes the
//! update to subscribers like the real pipeline would.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Mutex poisoning only follows a test panic

use crate::record_store::InMemoryRecordStore;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use support_copilot_core::records::RecordStore;
use support_copilot_core::ticket::Classification;
use support_copilot_core::trigger::{ClassificationJob, ClassificationTrigger, TriggerError};

#[derive(Default)]
struct Script {
    jobs: Vec<ClassificationJob>,
    failure: Option<TriggerError>,
    delay: Option<Duration>,
    writeback: Option<(InMemoryRecordStore, Classification)>,
}

/// Trigger double with a scripted outcome
#[derive(Clone, Default)]
pub struct ScriptedTrigger {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTrigger {
    /// Accepts every job
    #[must_use]
    pub fn accepting() -> Self {
        Self::default()
    }

    /// Rejects every job with `error`
    #[must_use]
    pub fn failing(error: TriggerError) -> Self {
        let trigger = Self::default();
        trigger.script.lock().unwrap().failure = Some(error);
        trigger
    }

    /// Accepts every job, then writes `classification` back into `records`
    #[must_use]
    pub fn classifying_into(records: InMemoryRecordStore, classification: Classification) -> Self {
        let trigger = Self::default();
        trigger.script.lock().unwrap().writeback = Some((records, classification));
        trigger
    }

    /// Delay before answering
    pub fn set_delay(&self, delay: Duration) {
        self.script.lock().unwrap().delay = Some(delay);
    }

    /// Jobs received so far, in order
    #[must_use]
    pub fn jobs(&self) -> Vec<ClassificationJob> {
        self.script.lock().unwrap().jobs.clone()
    }

    /// Number of jobs received so far
    #[must_use]
    pub fn calls(&self) -> usize {
        self.script.lock().unwrap().jobs.len()
    }
}

impl std::fmt::Debug for ScriptedTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedTrigger")
            .field("calls", &self.calls())
            .finish_non_exhaustive()
    }
}

impl ClassificationTrigger for ScriptedTrigger {
    fn trigger(
        &self,
        job: ClassificationJob,
    ) -> Pin<Box<dyn Future<Output = Result<(), TriggerError>> + Send + '_>> {
        Box::pin(async move {
            let (delay, failure, writeback) = {
                let mut script = self.script.lock().unwrap();
                script.jobs.push(job.clone());
                (script.delay, script.failure.clone(), script.writeback.clone())
            };

            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(error) = failure {
                return Err(error);
            }

            if let Some((records, classification)) = writeback {
                // Classification completes later, out of band.
                tokio::spawn(async move {
                    if let Err(error) = records.mark_processed(job.ticket_id, classification).await {
                        tracing::warn!(%error, "Scripted classifier writeback failed");
                    }
                });
            }
            Ok(())
        })
    }
}
