//! A fully in-memory [`ExceptionEnvironment`] for exercising the dispatcher
//! and unwind driver without a real kernel underneath.
//!
//! Every handler registered through [`MockEnvironment::chain`] shares one
//! `extern "C" fn`, [`scripted_handler`]; its actual behavior per node is
//! looked up from a thread-local script table set up by the test before
//! calling into `dispatch_exception`/`rtl_unwind`. Each `#[test]` runs on
//! its own OS thread, so the thread-local state never leaks between tests.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use crate::ke::kpcr::irql;
use crate::ke::kpcr::Kirql;
use crate::ke::prcb::ProcessorBlockView;
use crate::rtl::chain::ThreadHandlerChain;
use crate::rtl::environment::ExceptionEnvironment;
use crate::rtl::exception::{
    Context, DispatcherContext, ExceptionDisposition, ExceptionHandler, ExceptionRecord,
    RegistrationRecord, CHAIN_END,
};
use crate::rtl::function_table::{FunctionTableLookup, FunctionTableRegistry};

thread_local! {
    static SCRIPTS: RefCell<HashMap<usize, Script>> = RefCell::new(HashMap::new());
    static CALL_LOG: RefCell<Vec<usize>> = RefCell::new(Vec::new());
}

/// What [`scripted_handler`] should report when invoked on a given node.
#[derive(Debug, Clone, Copy)]
pub struct Script {
    disposition: ExceptionDisposition,
    replacement: Option<*mut RegistrationRecord>,
}

impl Script {
    pub fn continue_search() -> Self {
        Self {
            disposition: ExceptionDisposition::ContinueSearch,
            replacement: None,
        }
    }

    pub fn continue_execution() -> Self {
        Self {
            disposition: ExceptionDisposition::ContinueExecution,
            replacement: None,
        }
    }

    pub fn nested_exception(replacement: *mut RegistrationRecord) -> Self {
        Self {
            disposition: ExceptionDisposition::NestedException,
            replacement: Some(replacement),
        }
    }

    pub fn collided_unwind(replacement: *mut RegistrationRecord) -> Self {
        Self {
            disposition: ExceptionDisposition::CollidedUnwind,
            replacement: Some(replacement),
        }
    }
}

/// The one handler every test-built chain node uses. Looks itself up in the
/// current thread's script table by its own establisher-frame address.
pub extern "C" fn scripted_handler(
    _exception_record: *mut ExceptionRecord,
    establisher_frame: *mut RegistrationRecord,
    _context_record: *mut Context,
    dispatcher_context: *mut DispatcherContext,
) -> ExceptionDisposition {
    CALL_LOG.with(|log| log.borrow_mut().push(establisher_frame as usize));
    let script = SCRIPTS
        .with(|scripts| scripts.borrow().get(&(establisher_frame as usize)).copied())
        .unwrap_or_else(Script::continue_search);
    if let Some(replacement) = script.replacement {
        unsafe {
            (*dispatcher_context).registration_pointer = replacement;
        }
    }
    script.disposition
}

/// Backing storage for test chain nodes. A single reserved `Vec` so nodes
/// land at strictly increasing addresses, matching how a real call stack
/// places progressively outer frames at higher addresses — the invariant
/// the unwind driver's target-frame comparisons rely on.
struct NodeArena {
    storage: RefCell<Vec<RegistrationRecord>>,
}

impl NodeArena {
    fn new(capacity: usize) -> Self {
        Self {
            storage: RefCell::new(Vec::with_capacity(capacity)),
        }
    }

    /// Build `len` nodes, innermost (index 0) first, each linked to the
    /// next and the last terminated by `CHAIN_END`.
    fn build_chain(&self, handler: ExceptionHandler, len: usize) -> Vec<*mut RegistrationRecord> {
        let mut storage = self.storage.borrow_mut();
        assert!(
            storage.capacity() - storage.len() >= len,
            "NodeArena capacity exhausted; raise the reserved capacity"
        );
        let start = storage.len();
        for _ in 0..len {
            storage.push(RegistrationRecord {
                next: CHAIN_END,
                handler,
            });
        }
        let ptrs: Vec<*mut RegistrationRecord> = (start..start + len)
            .map(|i| &mut storage[i] as *mut RegistrationRecord)
            .collect();
        for window in 0..ptrs.len().saturating_sub(1) {
            unsafe {
                (*ptrs[window]).next = ptrs[window + 1];
            }
        }
        ptrs
    }
}

pub struct MockEnvironment {
    arena: NodeArena,
    chain: ThreadHandlerChain,
    stack_limits: Cell<(usize, usize)>,
    irql: Cell<Kirql>,
    processor_block: Cell<ProcessorBlockView>,
    function_tables: RefCell<FunctionTableRegistry>,
    last_continue_context: Cell<Context>,
    log_calls: Cell<u32>,
}

impl MockEnvironment {
    pub fn new() -> Self {
        SCRIPTS.with(|s| s.borrow_mut().clear());
        CALL_LOG.with(|c| c.borrow_mut().clear());
        Self {
            arena: NodeArena::new(32),
            chain: ThreadHandlerChain::new(),
            stack_limits: Cell::new((0, usize::MAX)),
            irql: Cell::new(irql::PASSIVE_LEVEL),
            processor_block: Cell::new(ProcessorBlockView {
                dpc_stack_top: 0,
                dpc_routine_active: false,
            }),
            function_tables: RefCell::new(FunctionTableRegistry::new()),
            last_continue_context: Cell::new(Context::zeroed()),
            log_calls: Cell::new(0),
        }
    }

    /// Build a chain of `len` freshly scripted (default: `ContinueSearch`)
    /// nodes and install it as this environment's registration chain.
    pub fn chain(&self, len: usize) -> Vec<*mut RegistrationRecord> {
        let ptrs = self.arena.build_chain(scripted_handler, len);
        self.chain.set_head(*ptrs.first().unwrap_or(&CHAIN_END));
        ptrs
    }

    pub fn set_head(&self, node: *mut RegistrationRecord) {
        self.chain.set_head(node);
    }

    pub fn set_stack_limits(&self, low: usize, high: usize) {
        self.stack_limits.set((low, high));
    }

    pub fn set_irql(&self, irql: Kirql) {
        self.irql.set(irql);
    }

    pub fn set_processor_block(&self, view: ProcessorBlockView) {
        self.processor_block.set(view);
    }

    pub fn register_table(&self, image_base: usize, image_size: usize, table: &'static [usize]) {
        self.function_tables
            .borrow_mut()
            .register_table(image_base, image_size, table)
            .expect("test table registration");
    }

    pub fn script(&self, node: *mut RegistrationRecord, script: Script) {
        SCRIPTS.with(|s| s.borrow_mut().insert(node as usize, script));
    }

    pub fn call_log(&self) -> Vec<usize> {
        CALL_LOG.with(|c| c.borrow().clone())
    }

    pub fn last_continue_context(&self) -> Context {
        self.last_continue_context.get()
    }
}

impl Default for MockEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl ExceptionEnvironment for MockEnvironment {
    fn stack_limits(&self) -> (usize, usize) {
        self.stack_limits.get()
    }

    fn registration_head(&self) -> *mut RegistrationRecord {
        self.chain.head()
    }

    fn unlink_handler(&self, node: *mut RegistrationRecord) {
        unsafe { self.chain.unlink(node) }
    }

    fn lookup_function_table(&self, handler_address: usize) -> FunctionTableLookup {
        self.function_tables.borrow().lookup(handler_address)
    }

    fn capture_context(&self) -> Context {
        Context::zeroed()
    }

    fn continue_execution(&self, context: &Context, _alertable: bool) -> ! {
        self.last_continue_context.set(*context);
        panic!("continue_execution");
    }

    fn raise_exception(&self, exception_record: &ExceptionRecord) -> ! {
        panic!("raise_exception: code={:#x}", exception_record.exception_code);
    }

    fn raise_exception_with_context(
        &self,
        exception_record: &ExceptionRecord,
        _context_record: &Context,
        first_chance: bool,
    ) -> ! {
        panic!(
            "raise_exception_with_context: code={:#x} first_chance={}",
            exception_record.exception_code, first_chance
        );
    }

    fn log_exception_handler(
        &self,
        _exception_record: &ExceptionRecord,
        _context_record: &Context,
        _bias: u32,
        _node_prefix: *const u8,
        _prefix_length: usize,
    ) -> u32 {
        let index = self.log_calls.get();
        self.log_calls.set(index + 1);
        index
    }

    fn log_last_exception_disposition(&self, _log_index: u32, _disposition: ExceptionDisposition) {}

    fn current_irql(&self) -> Kirql {
        self.irql.get()
    }

    fn current_processor_block(&self) -> ProcessorBlockView {
        self.processor_block.get()
    }
}

/// Extract the panic message from a `catch_unwind` result whose closure
/// always diverges through one of this mock's `-> !` methods.
pub fn panic_message<T>(result: std::thread::Result<T>) -> String {
    let payload = result.expect_err("expected the call to panic through a `!` method");
    if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        String::from("<non-string panic payload>")
    }
}
