//! Exception record, context record, and handler-chain node layouts.
//!
//! These mirror the i386 `EXCEPTION_RECORD`/`CONTEXT`/`EXCEPTION_REGISTRATION_RECORD`
//! shapes `exdsptch.c` operates on. Field widths stay `u32` where the real
//! ABI is 32-bit regardless of host pointer width (this core models a flat
//! 32-bit call-frame machine); chain pointers are native Rust pointers since
//! they're the thing this crate actually dereferences.

use core::ptr;

use crate::rtl::environment::ExceptionEnvironment;

/// Bytes in one machine word on the modeled architecture. Used for the
/// logging hook's fixed-size chain-node prefix, independent of host
/// pointer width.
pub const WORD_SIZE: usize = 4;

/// Maximum number of `exception_information` slots (NT-compatible).
pub const EXCEPTION_MAXIMUM_PARAMETERS: usize = 15;

bitflags::bitflags! {
    /// Flags carried on an [`ExceptionRecord`]. The dispatcher and unwind
    /// driver only ever OR bits into an existing record; they never clear
    /// bits a handler didn't ask to clear.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ExceptionFlags: u32 {
        /// Handlers must not request `ExceptionContinueExecution` for this record.
        const NONCONTINUABLE = 0x0000_0001;
        /// Set on the record driving an in-progress unwind.
        const UNWINDING = 0x0000_0002;
        /// Set when the unwind has no target frame (unwinds to chain end).
        const EXIT_UNWIND = 0x0000_0004;
        /// Set when a handler-chain node failed the bounds/validity check.
        const STACK_INVALID = 0x0000_0008;
        /// Set for the duration a nested exception is being dispatched inside
        /// another handler's frame.
        const NESTED_CALL = 0x0000_0010;
        /// Set on the record handed to a handler whose frame is the unwind's
        /// target.
        const TARGET_UNWIND = 0x0000_0020;
        /// Set when a handler reports `ExceptionCollidedUnwind` during an
        /// unwind already in progress.
        const COLLIDED_UNWIND = 0x0000_0040;
    }
}

/// Synthesized status codes this core raises on its own error paths (§7).
pub mod status {
    pub const STATUS_NONCONTINUABLE_EXCEPTION: u32 = 0xC000_0025;
    pub const STATUS_INVALID_DISPOSITION: u32 = 0xC000_0026;
    pub const STATUS_UNWIND: u32 = 0xC000_0027;
    pub const STATUS_BAD_STACK: u32 = 0xC000_0028;
    pub const STATUS_INVALID_UNWIND_TARGET: u32 = 0xC000_0029;
}

/// An exception, in flight or synthesized by this core's own error paths.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct ExceptionRecord {
    pub exception_code: u32,
    pub exception_flags: ExceptionFlags,
    pub exception_record: *mut ExceptionRecord,
    pub exception_address: usize,
    pub number_parameters: u32,
    pub exception_information: [u32; EXCEPTION_MAXIMUM_PARAMETERS],
}

// Exposed across the mock environment's thread boundary in tests only;
// nothing here actually requires cross-thread sharing in production use.
unsafe impl Send for ExceptionRecord {}

impl ExceptionRecord {
    pub const fn new(code: u32, flags: ExceptionFlags, address: usize) -> Self {
        Self {
            exception_code: code,
            exception_flags: flags,
            exception_record: ptr::null_mut(),
            exception_address: address,
            number_parameters: 0,
            exception_information: [0; EXCEPTION_MAXIMUM_PARAMETERS],
        }
    }

    pub fn is_noncontinuable(&self) -> bool {
        self.exception_flags.contains(ExceptionFlags::NONCONTINUABLE)
    }
}

/// Raise a fresh, chained, noncontinuable exception pointing back at `inner`
/// — the shape every §7 error path (bad stack, invalid disposition, invalid
/// unwind target, a handler that can't continue a noncontinuable exception)
/// shares.
pub(crate) fn raise_chained<E: ExceptionEnvironment>(env: &E, code: u32, inner: &ExceptionRecord) -> ! {
    let mut fresh = ExceptionRecord::new(code, ExceptionFlags::NONCONTINUABLE, inner.exception_address);
    fresh.exception_record = inner as *const ExceptionRecord as *mut ExceptionRecord;
    env.raise_exception(&fresh)
}

/// x86 floating-point save area, carried for ABI fidelity; this core never
/// inspects it.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct FloatingSaveArea {
    pub control_word: u32,
    pub status_word: u32,
    pub tag_word: u32,
    pub error_offset: u32,
    pub error_selector: u32,
    pub data_offset: u32,
    pub data_selector: u32,
    pub register_area: [u8; 80],
    pub cr0_npx_state: u32,
}

impl FloatingSaveArea {
    pub const fn zeroed() -> Self {
        Self {
            control_word: 0,
            status_word: 0,
            tag_word: 0,
            error_offset: 0,
            error_selector: 0,
            data_offset: 0,
            data_selector: 0,
            register_area: [0; 80],
            cr0_npx_state: 0,
        }
    }
}

/// `CONTEXT_FLAGS` category bits (i386).
pub mod context_flags {
    pub const CONTEXT_I386: u32 = 0x0001_0000;
    pub const CONTEXT_CONTROL: u32 = CONTEXT_I386 | 0x0000_0001;
    pub const CONTEXT_INTEGER: u32 = CONTEXT_I386 | 0x0000_0002;
    pub const CONTEXT_SEGMENTS: u32 = CONTEXT_I386 | 0x0000_0004;
    pub const CONTEXT_FLOATING_POINT: u32 = CONTEXT_I386 | 0x0000_0008;
    pub const CONTEXT_DEBUG_REGISTERS: u32 = CONTEXT_I386 | 0x0000_0010;
    /// What `CaptureContext` actually fills: control, integer, segments.
    pub const CONTEXT_FULL: u32 = CONTEXT_CONTROL | CONTEXT_INTEGER | CONTEXT_SEGMENTS;
}

/// i386 `CONTEXT` — the machine-context snapshot handed to handlers and
/// restored by `Continue`.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct Context {
    pub context_flags: u32,
    pub dr0: u32,
    pub dr1: u32,
    pub dr2: u32,
    pub dr3: u32,
    pub dr6: u32,
    pub dr7: u32,
    pub float_save: FloatingSaveArea,
    pub seg_gs: u32,
    pub seg_fs: u32,
    pub seg_es: u32,
    pub seg_ds: u32,
    pub edi: u32,
    pub esi: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
    pub ebp: u32,
    pub eip: u32,
    pub seg_cs: u32,
    pub eflags: u32,
    pub esp: u32,
    pub seg_ss: u32,
}

impl Context {
    pub const fn zeroed() -> Self {
        Self {
            context_flags: 0,
            dr0: 0,
            dr1: 0,
            dr2: 0,
            dr3: 0,
            dr6: 0,
            dr7: 0,
            float_save: FloatingSaveArea::zeroed(),
            seg_gs: 0,
            seg_fs: 0,
            seg_es: 0,
            seg_ds: 0,
            edi: 0,
            esi: 0,
            ebx: 0,
            edx: 0,
            ecx: 0,
            eax: 0,
            ebp: 0,
            eip: 0,
            seg_cs: 0,
            eflags: 0,
            esp: 0,
            seg_ss: 0,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// `EXCEPTION_DISPOSITION` — what a handler (or the unwind driver's
/// trampoline) reports back to its caller. Discriminants match the NT ABI.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionDisposition {
    ContinueExecution = 0,
    ContinueSearch = 1,
    NestedException = 2,
    CollidedUnwind = 3,
}

/// A node in the per-thread singly-linked handler chain.
#[repr(C)]
pub struct RegistrationRecord {
    pub next: *mut RegistrationRecord,
    pub handler: ExceptionHandler,
}

/// Sentinel terminating the handler chain. Distinct from the null pointer,
/// which this core instead uses as the "no nested region" sentinel.
pub const CHAIN_END: *mut RegistrationRecord = usize::MAX as *mut RegistrationRecord;

/// Required alignment of a registration record's address.
pub const REGISTRATION_RECORD_ALIGNMENT: usize = 4;

/// A handler's entry point. Exception- and unwind-mode trampolines share
/// this signature; `dispatcher_context` is the explicit channel a handler
/// uses to hand a replacement registration pointer back to its caller on
/// `NestedException`/`CollidedUnwind`.
pub type ExceptionHandler = extern "C" fn(
    exception_record: *mut ExceptionRecord,
    establisher_frame: *mut RegistrationRecord,
    context_record: *mut Context,
    dispatcher_context: *mut DispatcherContext,
) -> ExceptionDisposition;

/// Per-call scratch a handler can write through to report state back to the
/// dispatcher/unwind driver without walking back up the stack.
#[repr(C)]
pub struct DispatcherContext {
    pub registration_pointer: *mut RegistrationRecord,
}

/// The `(ExceptionRecord, ContextRecord)` pair handed to a top-level handler
/// (e.g. at a `raise`/`continue` system call boundary); not consumed by the
/// dispatcher or unwind driver themselves.
#[repr(C)]
pub struct ExceptionPointers {
    pub exception_record: *mut ExceptionRecord,
    pub context_record: *mut Context,
}
