//! Effect construction helpers
//!
//! Reducers describe gateway calls as effects. [`gateway_call!`] removes the
//! `Box::pin(async move { .. })` noise around them.

/// Create an `Effect::Future` that awaits a fallible gateway call and maps
/// both outcomes into actions
///
/// # Example
///
/// ```rust,ignore
/// use support_copilot_core::gateway_call;
///
/// gateway_call! {
///     call: async move { records.create(ticket).await },
///     on_success: |()| Some(SubmissionAction::Saved { id, description }),
///     on_error: |error| Some(SubmissionAction::Failed { id, error: SyncError::persist(&error) })
/// }
/// ```
#[macro_export]
macro_rules! gateway_call {
    (
        call: $call:expr,
        on_success: |$success_param:pat_param| $success_body:expr,
        on_error: |$error_param:ident| $error_body:expr
    ) => {
        $crate::effect::Effect::Future(::std::boxed::Box::pin(async move {
            match $call.await {
                ::std::result::Result::Ok($success_param) => $success_body,
                ::std::result::Result::Err($error_param) => $error_body,
            }
        }))
    };
}
