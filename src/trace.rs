//! Diagnostic call-site augmentation.
//!
//! Errors delivered through completions surface far from the call that
//! caused them. With verbose mode enabled on a handle, each enqueueing
//! method captures its call site so a failing outcome carries the original
//! caller's frames in its message. Pure instrumentation; augmentation
//! happens at most once per error.

use std::backtrace::Backtrace;

use crate::error::CompatError;

const MARKER: &str = "\n--> in ";

/// Call-site snapshot taken when a unit of work is enqueued.
#[derive(Debug)]
pub(crate) struct TracePoint {
    label: String,
    backtrace: Backtrace,
}

impl TracePoint {
    /// Capture the call site, or nothing when verbose mode is off.
    pub(crate) fn capture(enabled: bool, method: &str, detail: &str) -> Option<TracePoint> {
        if !enabled {
            return None;
        }
        Some(TracePoint {
            label: format!("{method}({detail:?})"),
            backtrace: Backtrace::force_capture(),
        })
    }
}

/// Append the captured call site to an error's message, once.
pub(crate) fn augment<T>(
    result: Result<T, CompatError>,
    point: Option<&TracePoint>,
) -> Result<T, CompatError> {
    result.map_err(|err| augment_error(err, point))
}

pub(crate) fn augment_error(err: CompatError, point: Option<&TracePoint>) -> CompatError {
    let Some(point) = point else { return err };
    if err.message().contains(MARKER) {
        return err;
    }
    err.map_message(|msg| format!("{msg}{MARKER}{}\n{}", point.label, point.backtrace))
}
