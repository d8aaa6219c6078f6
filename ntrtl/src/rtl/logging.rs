//! Exception logging gate (§4.7).
//!
//! A single process-wide flag decides whether the dispatcher and unwind
//! driver call through to
//! [`ExceptionEnvironment::log_exception_handler`](crate::rtl::environment::ExceptionEnvironment::log_exception_handler)
//! around each handler invocation. Off by default, matching a kernel that
//! hasn't set the debugging flag that turns this on.

use core::sync::atomic::{AtomicBool, Ordering};

static HANDLER_LOGGING_ENABLED: AtomicBool = AtomicBool::new(false);

pub fn set_exception_logging_enabled(enabled: bool) {
    HANDLER_LOGGING_ENABLED.store(enabled, Ordering::SeqCst);
}

pub fn is_exception_logging_enabled() -> bool {
    HANDLER_LOGGING_ENABLED.load(Ordering::Relaxed)
}
