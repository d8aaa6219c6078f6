//! Exception dispatch (§4.5) — `RtlDispatchException`.
//!
//! Walks the thread's handler chain innermost-first, invoking each
//! handler's trampoline and acting on its disposition, until a handler
//! claims the exception, the chain is exhausted, or the chain itself turns
//! out to be corrupt.

use core::ptr;

use crate::ke::kpcr::irql;
use crate::rtl::environment::ExceptionEnvironment;
use crate::rtl::exception::{
    raise_chained, status, Context, DispatcherContext, ExceptionDisposition, ExceptionFlags,
    ExceptionHandler, ExceptionRecord, RegistrationRecord, REGISTRATION_RECORD_ALIGNMENT, CHAIN_END,
};
use crate::rtl::function_table::FunctionTableLookup;

/// Binary search over a sorted, RVA-biased handler table (§4.3). `low`/`high`
/// stay within `[0, table.len())`; equality at the midpoint is valid, and an
/// empty table is always invalid.
fn binary_search_table(table: &[usize], value: usize) -> bool {
    if table.is_empty() {
        return false;
    }
    let mut low: isize = 0;
    let mut high: isize = table.len() as isize - 1;
    while high >= low {
        let middle = (low + high) >> 1;
        let entry = table[middle as usize];
        if value < entry {
            high = middle - 1;
        } else if value > entry {
            low = middle + 1;
        } else {
            return true;
        }
    }
    false
}

/// Validate a handler address against its image's registered function
/// table. An image that never registered anything is trusted (there's
/// nothing to check it against); an image registered as carrying no
/// handlers, or a handler address absent from its table, is rejected.
pub fn is_valid_handler<E: ExceptionEnvironment>(env: &E, handler: ExceptionHandler) -> bool {
    let handler_address = handler as usize;
    match env.lookup_function_table(handler_address) {
        FunctionTableLookup::NotRegistered => true,
        FunctionTableLookup::NoHandlers => {
            log::warn!("handler {:#x}: image registered with no handlers", handler_address);
            false
        }
        FunctionTableLookup::Table { image_base, table } => {
            let biased = handler_address.wrapping_sub(image_base);
            let valid = binary_search_table(table, biased);
            if !valid {
                log::warn!("handler {:#x}: not present in registered table", handler_address);
            }
            valid
        }
    }
}

/// The stack-bounds probe: is a registration record's address within
/// `[low, high)` and correctly aligned? Shared by the dispatcher and the
/// unwind driver.
pub(crate) fn stack_bounds(address: usize, low: usize, high: usize) -> bool {
    let end = address.wrapping_add(core::mem::size_of::<RegistrationRecord>());
    address % REGISTRATION_RECORD_ALIGNMENT == 0 && address >= low && end <= high
}

/// Shared §4.2 alternate-stack substitution. `used` tracks the one-shot
/// allowance across an entire dispatch/unwind call. Returns the DPC stack's
/// bounds if the node legitimately lies within it and the allowance hasn't
/// been spent yet.
pub(crate) fn try_alternate_stack<E: ExceptionEnvironment>(
    env: &E,
    reg_address: usize,
    used: &mut bool,
) -> Option<(usize, usize)> {
    if *used || reg_address % REGISTRATION_RECORD_ALIGNMENT != 0 {
        return None;
    }
    if env.current_irql() < irql::DISPATCH_LEVEL {
        return None;
    }
    let prcb = env.current_processor_block();
    if !prcb.dpc_routine_active {
        return None;
    }
    let end = reg_address.wrapping_add(core::mem::size_of::<RegistrationRecord>());
    let low = prcb.dpc_stack_low();
    let high = prcb.dpc_stack_top;
    if reg_address >= low && end <= high {
        *used = true;
        Some((low, high))
    } else {
        None
    }
}

/// The exception-mode trampoline (§4.4): invoke `handler` with the four
/// parameters it expects, `dispatcher_context` given explicitly rather than
/// discovered through up-level stack addressing (see DESIGN.md).
pub fn execute_handler_for_exception(
    exception_record: *mut ExceptionRecord,
    establisher_frame: *mut RegistrationRecord,
    context_record: *mut Context,
    dispatcher_context: *mut DispatcherContext,
    handler: ExceptionHandler,
) -> ExceptionDisposition {
    handler(exception_record, establisher_frame, context_record, dispatcher_context)
}

/// Walk the handler chain innermost-first, invoking each handler until one
/// claims the exception (`true`) or the chain is exhausted or corrupt
/// (`false`).
pub fn dispatch_exception<E: ExceptionEnvironment>(
    env: &E,
    exception_record: &mut ExceptionRecord,
    context_record: &mut Context,
) -> bool {
    let (mut low, mut high) = env.stack_limits();
    let mut alt_stack_used = false;
    let mut reg = env.registration_head();
    let mut nested: *mut RegistrationRecord = ptr::null_mut();

    loop {
        if reg == CHAIN_END {
            return false;
        }

        let reg_address = reg as usize;
        if !stack_bounds(reg_address, low, high) {
            if let Some((new_low, new_high)) = try_alternate_stack(env, reg_address, &mut alt_stack_used) {
                low = new_low;
                high = new_high;
                continue;
            }
            exception_record.exception_flags.insert(ExceptionFlags::STACK_INVALID);
            return false;
        }

        let handler = unsafe { (*reg).handler };
        if !is_valid_handler(env, handler) {
            exception_record.exception_flags.insert(ExceptionFlags::STACK_INVALID);
            return false;
        }

        let log_index = if crate::rtl::logging::is_exception_logging_enabled() {
            Some(env.log_exception_handler(
                exception_record,
                context_record,
                0,
                reg as *const u8,
                4 * crate::rtl::exception::WORD_SIZE,
            ))
        } else {
            None
        };

        let mut dispatcher_context = DispatcherContext {
            registration_pointer: ptr::null_mut(),
        };
        let disposition = execute_handler_for_exception(
            exception_record,
            reg,
            context_record,
            &mut dispatcher_context,
            handler,
        );

        if let Some(index) = log_index {
            env.log_last_exception_disposition(index, disposition);
        }

        if !nested.is_null() && reg == nested {
            exception_record.exception_flags.remove(ExceptionFlags::NESTED_CALL);
            nested = ptr::null_mut();
        }

        match disposition {
            ExceptionDisposition::ContinueExecution => {
                if exception_record.is_noncontinuable() {
                    raise_chained(env, status::STATUS_NONCONTINUABLE_EXCEPTION, exception_record);
                }
                return true;
            }
            ExceptionDisposition::ContinueSearch => {
                if exception_record.exception_flags.contains(ExceptionFlags::STACK_INVALID) {
                    return false;
                }
            }
            ExceptionDisposition::NestedException => {
                exception_record.exception_flags.insert(ExceptionFlags::NESTED_CALL);
                if (dispatcher_context.registration_pointer as usize) > (nested as usize) {
                    nested = dispatcher_context.registration_pointer;
                }
            }
            ExceptionDisposition::CollidedUnwind => {
                raise_chained(env, status::STATUS_INVALID_DISPOSITION, exception_record);
            }
        }

        reg = unsafe { (*reg).next };
    }
}
