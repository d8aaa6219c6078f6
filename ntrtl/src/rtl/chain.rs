//! Handler-chain accessor (§4.1/§6 — `GetRegistrationHead`/`UnlinkHandler`).
//!
//! On real x86 NT this is `fs:[0]`: the head of the thread's handler chain,
//! stored in thread-resident memory the dispatcher and unwind driver mutate
//! directly rather than through an allocator. [`ThreadHandlerChain`] models
//! that same shape as a plain cell so an
//! [`ExceptionEnvironment`](crate::rtl::environment::ExceptionEnvironment)
//! implementation can hand the core a reference to its thread's actual
//! chain storage.

use core::cell::Cell;

use crate::rtl::exception::{RegistrationRecord, CHAIN_END};

pub struct ThreadHandlerChain {
    head: Cell<*mut RegistrationRecord>,
}

impl ThreadHandlerChain {
    pub const fn new() -> Self {
        Self {
            head: Cell::new(CHAIN_END),
        }
    }

    pub fn head(&self) -> *mut RegistrationRecord {
        self.head.get()
    }

    pub fn set_head(&self, node: *mut RegistrationRecord) {
        self.head.set(node);
    }

    /// Link `node` onto the head of the chain. Establishing a protected
    /// region is outside this core's own contract, but the test harness and
    /// a host's entry/exit thunks both need it.
    ///
    /// # Safety
    /// `node` must point at a live `RegistrationRecord` that outlives its
    /// time on the chain.
    pub unsafe fn push(&self, node: *mut RegistrationRecord) {
        (*node).next = self.head.get();
        self.head.set(node);
    }

    /// Remove `node` from the chain, whether it's the head or spliced in
    /// further down.
    ///
    /// # Safety
    /// `node`, and every node between the head and `node`, must point at
    /// live `RegistrationRecord`s.
    pub unsafe fn unlink(&self, node: *mut RegistrationRecord) {
        if self.head.get() == node {
            self.head.set((*node).next);
            return;
        }
        let mut cursor = self.head.get();
        while cursor != CHAIN_END {
            let next = (*cursor).next;
            if next == node {
                (*cursor).next = (*node).next;
                return;
            }
            cursor = next;
        }
    }
}

impl Default for ThreadHandlerChain {
    fn default() -> Self {
        Self::new()
    }
}
