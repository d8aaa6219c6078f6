//! Kernel Executive (ke) — the slice of per-processor/per-thread state the
//! exception core's alternate-stack policy (§4.2) depends on.
//!
//! Trimmed to exactly what `rtl::dispatch`/`rtl::unwind` need: the current
//! IRQL and the DPC stack's top address and active flag. Everything else a
//! real `KPRCB`/`KPCR` carries (scheduler queues, GS-base plumbing, APCs) is
//! out of scope for this core and lives in the host kernel.

pub mod kpcr;
pub mod prcb;

pub use kpcr::Kirql;
pub use prcb::KERNEL_STACK_SIZE;
