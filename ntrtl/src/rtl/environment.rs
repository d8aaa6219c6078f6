//! The seam between this core and everything it doesn't own: machine-context
//! capture, the registry of per-image function tables, the raise/continue
//! system calls, and the optional logging hook. A host kernel supplies one
//! concrete implementation; tests supply another.

use crate::ke::kpcr::Kirql;
use crate::ke::prcb::ProcessorBlockView;
use crate::rtl::exception::{Context, ExceptionDisposition, ExceptionRecord, RegistrationRecord};
use crate::rtl::function_table::FunctionTableLookup;

pub trait ExceptionEnvironment {
    /// Inclusive low / exclusive high bound of the thread's primary stack.
    fn stack_limits(&self) -> (usize, usize);

    /// Head of the thread's handler chain (`CHAIN_END` if empty).
    fn registration_head(&self) -> *mut RegistrationRecord;

    /// Remove `node` from the handler chain.
    fn unlink_handler(&self, node: *mut RegistrationRecord);

    /// Resolve a handler's registered function table, keyed by its address.
    fn lookup_function_table(&self, handler_address: usize) -> FunctionTableLookup;

    /// Snapshot the caller's machine context (control, integer, segment
    /// categories — `CaptureContext` never fills floating point).
    fn capture_context(&self) -> Context;

    /// Resume execution at `context`. Never returns.
    fn continue_execution(&self, context: &Context, alertable: bool) -> !;

    /// Raise `exception_record`, letting this core's own environment
    /// capture context and dispatch it as a fresh, first-chance exception.
    /// Never returns.
    fn raise_exception(&self, exception_record: &ExceptionRecord) -> !;

    /// Raise `exception_record` with an explicit, already-adjusted context
    /// (the unwind driver's final "target not found" escalation). Never
    /// returns.
    fn raise_exception_with_context(
        &self,
        exception_record: &ExceptionRecord,
        context_record: &Context,
        first_chance: bool,
    ) -> !;

    /// Optional pre-invocation logging hook (§4.7). Returns an opaque index
    /// to hand back to `log_last_exception_disposition`.
    fn log_exception_handler(
        &self,
        exception_record: &ExceptionRecord,
        context_record: &Context,
        bias: u32,
        node_prefix: *const u8,
        prefix_length: usize,
    ) -> u32;

    /// Optional post-invocation logging hook (§4.7).
    fn log_last_exception_disposition(&self, log_index: u32, disposition: ExceptionDisposition);

    fn current_irql(&self) -> Kirql;

    fn current_processor_block(&self) -> ProcessorBlockView;
}
