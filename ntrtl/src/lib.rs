//! ntrtl — Runtime Library exception dispatch/unwind core
//!
//! A Rust port of the frame-based Structured Exception Handling dispatcher
//! and unwind driver for a flat 32-bit, 4-byte-aligned call-frame model.
//! Modeled after Windows NT's `ntoskrnl!Rtl{DispatchException,Unwind,IsValidHandler}`
//! (`base/ntos/rtl/i386/exdsptch.c`).
//!
//! This crate is the *core* only: walking the per-thread handler chain,
//! validating handler pointers against a registered function table, and
//! running the two state machines in `rtl::dispatch` and `rtl::unwind`.
//! Everything the core cannot know on its own — where the stack lives,
//! how to capture machine state, how to actually transfer control back to
//! faulting code — is expressed as the [`rtl::environment::ExceptionEnvironment`]
//! trait that a host kernel implements.
//!
//! # Compilation
//!
//! Freestanding (`no_std`) outside of test builds; `cargo test` runs the
//! suite on the host so the `#[cfg(test)]` modules in this crate are
//! actually exercised, unlike a `#![no_main]` kernel binary.
#![cfg_attr(not(test), no_std)]
#![allow(clippy::missing_safety_doc)]
#![allow(clippy::too_many_arguments)]

#[cfg(test)]
extern crate std;

pub mod ke;
pub mod rtl;

mod serial;
