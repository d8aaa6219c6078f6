//! Runtime Library (rtl) — exception dispatch and unwind.
//!
//! Mirrors the layout of `base/ntos/rtl/i386/exdsptch.c`: one module for the
//! shared data model, one for the handler-chain accessor, one for the
//! per-image function table registry the validator consults, one for the
//! environment seam, one for the optional logging hook, and one each for
//! the dispatcher and unwind driver state machines.

pub mod chain;
pub mod dispatch;
pub mod environment;
pub mod exception;
pub mod function_table;
pub mod logging;
pub mod unwind;

#[cfg(test)]
pub mod test_support;

pub use dispatch::{dispatch_exception, is_valid_handler};
pub use environment::ExceptionEnvironment;
pub use exception::{
    Context, DispatcherContext, ExceptionDisposition, ExceptionFlags, ExceptionHandler,
    ExceptionPointers, ExceptionRecord, RegistrationRecord, CHAIN_END,
    EXCEPTION_MAXIMUM_PARAMETERS,
};
pub use function_table::{FunctionTableError, FunctionTableLookup, FunctionTableRegistry};
pub use unwind::rtl_unwind;
