//! Stack unwind (§4.6) — `RtlUnwind`.
//!
//! Walks the handler chain in unwind mode, invoking each handler so it can
//! run cleanup and unlinking it, until the target frame is reached (or the
//! chain is exhausted, for an exit unwind).

use core::ptr;

use crate::rtl::dispatch::{stack_bounds, try_alternate_stack};
use crate::rtl::environment::ExceptionEnvironment;
use crate::rtl::exception::{
    raise_chained, status, Context, DispatcherContext, ExceptionDisposition, ExceptionFlags,
    ExceptionHandler, ExceptionRecord, RegistrationRecord, CHAIN_END,
};

/// The unwind-mode trampoline (§4.4): same signature as its exception-mode
/// sibling, same explicit `dispatcher_context` channel.
pub fn execute_handler_for_unwind(
    exception_record: *mut ExceptionRecord,
    establisher_frame: *mut RegistrationRecord,
    context_record: *mut Context,
    dispatcher_context: *mut DispatcherContext,
    handler: ExceptionHandler,
) -> ExceptionDisposition {
    handler(exception_record, establisher_frame, context_record, dispatcher_context)
}

/// Number of caller-supplied words this core's own call convention pops off
/// the captured stack pointer before handing it to a handler or `Continue`
/// (see DESIGN.md's note on the calling-convention open question).
const CALLER_ARGUMENT_WORDS: u32 = 4;

/// Unwind the stack to `target_frame` (or, if `None`, to the end of the
/// chain — an "exit unwind"), running each intervening handler in unwind
/// mode. Never returns. Reaching `target_frame` mid-walk always resumes
/// execution there. Otherwise, once the chain is exhausted: an explicit
/// `Some(CHAIN_END)` target resumes execution (the caller just wanted
/// every handler unwound, with no further escalation), but an ordinary
/// exit unwind (`None`) or a target that was never found instead raises,
/// giving the debugger and subsystem a chance to see the unwind.
pub fn rtl_unwind<E: ExceptionEnvironment>(
    env: &E,
    target_frame: Option<*mut RegistrationRecord>,
    exception_record: Option<&mut ExceptionRecord>,
    return_value: usize,
) -> ! {
    let mut synthesized;
    let exception_record: &mut ExceptionRecord = match exception_record {
        Some(record) => record,
        None => {
            synthesized = ExceptionRecord::new(status::STATUS_UNWIND, ExceptionFlags::empty(), 0);
            &mut synthesized
        }
    };

    if target_frame.is_some() {
        exception_record.exception_flags.insert(ExceptionFlags::UNWINDING);
    } else {
        exception_record
            .exception_flags
            .insert(ExceptionFlags::UNWINDING | ExceptionFlags::EXIT_UNWIND);
    }

    let mut context_record = env.capture_context();
    context_record.esp = context_record.esp.wrapping_add(CALLER_ARGUMENT_WORDS * 4);
    context_record.eax = return_value as u32;

    let (mut low, mut high) = env.stack_limits();
    let mut alt_stack_used = false;
    // An ordinary exit unwind (no target supplied) compares against null,
    // not CHAIN_END: those are two distinct sentinels (see `rtl::exception`),
    // and no real registration pointer is ever null, so this never matches
    // inside the loop and the exit unwind always falls through to the
    // post-loop raise below. An explicit `Some(CHAIN_END)` target, by
    // contrast, really does want the post-loop continue.
    let target = target_frame.unwrap_or(ptr::null_mut());
    let mut reg = env.registration_head();

    while reg != CHAIN_END {
        if reg == target {
            env.continue_execution(&context_record, false);
        }

        if let Some(tf) = target_frame {
            if (tf as usize) < (reg as usize) {
                raise_chained(env, status::STATUS_INVALID_UNWIND_TARGET, exception_record);
            }
        }

        let reg_address = reg as usize;
        if !stack_bounds(reg_address, low, high) {
            if let Some((new_low, new_high)) = try_alternate_stack(env, reg_address, &mut alt_stack_used) {
                low = new_low;
                high = new_high;
                continue;
            }
            raise_chained(env, status::STATUS_BAD_STACK, exception_record);
        }

        let handler = unsafe { (*reg).handler };
        let mut dispatcher_context = DispatcherContext {
            registration_pointer: ptr::null_mut(),
        };
        let disposition = execute_handler_for_unwind(
            exception_record,
            reg,
            &mut context_record,
            &mut dispatcher_context,
            handler,
        );

        match disposition {
            ExceptionDisposition::ContinueSearch => {}
            ExceptionDisposition::CollidedUnwind => {
                reg = dispatcher_context.registration_pointer;
            }
            _ => raise_chained(env, status::STATUS_INVALID_DISPOSITION, exception_record),
        }

        let prior = reg;
        reg = unsafe { (*prior).next };
        env.unlink_handler(prior);
    }

    if target == CHAIN_END {
        env.continue_execution(&context_record, false);
    } else {
        env.raise_exception_with_context(exception_record, &context_record, false);
    }
}
