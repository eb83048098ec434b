// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use tracing::{info, warn};

use crate::error::{ErrorCode, WireError};
use crate::progress::{Progress, ProgressMachine, Transition};
use crate::stream::JobStream;

/// Failure message when a stream stops before a terminal event.
pub const UNEXPECTED_END: &str = "Connection to job stream ended unexpectedly.";

/// Callbacks for the feature that owns a job stream.
pub trait JobObserver<P> {
    /// A non-terminal frame changed the machine.
    fn on_update(&mut self, _machine: &ProgressMachine<P>) {}

    fn on_success(&mut self, machine: &ProgressMachine<P>);

    fn on_failure(&mut self, message: &str);
}

/// Feed `stream` into `machine` until a terminal transition.
///
/// The stream is closed as soon as the job completes or fails, and exactly
/// one of `on_success` / `on_failure` is called. A stream that ends or
/// breaks first is reported as [`UNEXPECTED_END`].
pub async fn drive_job<P: Progress>(
    mut stream: JobStream,
    machine: &mut ProgressMachine<P>,
    observer: &mut dyn JobObserver<P>,
) -> Result<(), WireError> {
    if machine.is_terminal() {
        stream.close();
        return Err(ErrorCode::Internal.with_message("job already finished; reset before reuse"));
    }

    while let Some(item) = stream.next_frame().await {
        let frame = match item {
            Ok(frame) => frame,
            Err(e) => {
                warn!(err = %e, "job stream broke");
                break;
            }
        };
        match machine.apply(&frame) {
            Transition::Ignored => {}
            Transition::Updated => observer.on_update(machine),
            Transition::Completed => {
                stream.close();
                info!(events = machine.log().len(), "job completed");
                observer.on_success(machine);
                return Ok(());
            }
            Transition::Failed(message) => {
                stream.close();
                warn!(err = %message, "job failed");
                observer.on_failure(&message);
                return Err(ErrorCode::JobFailed.with_message(message));
            }
        }
    }

    stream.close();
    machine.fail(UNEXPECTED_END);
    warn!("job stream ended before a terminal event");
    observer.on_failure(UNEXPECTED_END);
    Err(ErrorCode::JobFailed.with_message(UNEXPECTED_END))
}
