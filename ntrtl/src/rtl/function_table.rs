//! Per-image registered function table (§4.3) — the backing store behind
//! [`ExceptionEnvironment::lookup_function_table`](crate::rtl::environment::ExceptionEnvironment::lookup_function_table).
//!
//! An image registers either a sorted table of RVA-biased handler entries,
//! or an explicit "no handlers" marker; an image that never registered
//! anything is reported as such so the validator can fall back to trusting
//! the handler (the legacy, pre-SEH-hardening behavior).

use spin::Mutex;

/// Upper bound on distinct images this core tracks at once.
pub const MAX_REGISTERED_IMAGES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionTableError {
    /// The registry has no free slots.
    Full,
    /// An entry already exists for this image base.
    AlreadyRegistered,
    /// The supplied table isn't sorted ascending, breaking the validator's
    /// binary-search precondition.
    TableNotSorted,
}

/// What [`FunctionTableRegistry::lookup`] found for a handler's containing image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionTableLookup {
    /// No image covering this address ever registered a table.
    NotRegistered,
    /// The image explicitly registered as carrying no exception handlers.
    NoHandlers,
    /// The image's sorted, RVA-biased handler table.
    Table {
        image_base: usize,
        table: &'static [usize],
    },
}

#[derive(Debug, Clone, Copy)]
enum RegisteredKind {
    Table(&'static [usize]),
    NoHandlers,
}

#[derive(Debug, Clone, Copy)]
struct RegistryEntry {
    image_base: usize,
    image_size: usize,
    kind: RegisteredKind,
}

/// A fixed-capacity table of per-image registrations, guarded by a spinlock
/// the way the rest of this kernel's global tables are.
pub struct FunctionTableRegistry {
    entries: [Option<RegistryEntry>; MAX_REGISTERED_IMAGES],
    count: usize,
}

impl FunctionTableRegistry {
    pub const fn new() -> Self {
        Self {
            entries: [None; MAX_REGISTERED_IMAGES],
            count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn register_table(
        &mut self,
        image_base: usize,
        image_size: usize,
        table: &'static [usize],
    ) -> Result<(), FunctionTableError> {
        self.register(image_base, image_size, RegisteredKind::Table(table), table)
    }

    pub fn register_no_handlers(
        &mut self,
        image_base: usize,
        image_size: usize,
    ) -> Result<(), FunctionTableError> {
        self.register(image_base, image_size, RegisteredKind::NoHandlers, &[])
    }

    fn register(
        &mut self,
        image_base: usize,
        image_size: usize,
        kind: RegisteredKind,
        table: &'static [usize],
    ) -> Result<(), FunctionTableError> {
        if self.entries.iter().flatten().any(|e| e.image_base == image_base) {
            return Err(FunctionTableError::AlreadyRegistered);
        }
        if table.windows(2).any(|w| w[0] > w[1]) {
            return Err(FunctionTableError::TableNotSorted);
        }
        let slot = self
            .entries
            .iter_mut()
            .find(|e| e.is_none())
            .ok_or(FunctionTableError::Full)?;
        *slot = Some(RegistryEntry {
            image_base,
            image_size,
            kind,
        });
        self.count += 1;
        Ok(())
    }

    /// Drop an image's registration, e.g. on unload.
    pub fn unregister(&mut self, image_base: usize) {
        if let Some(slot) = self
            .entries
            .iter_mut()
            .find(|e| matches!(e, Some(entry) if entry.image_base == image_base))
        {
            *slot = None;
            self.count -= 1;
        }
    }

    pub fn lookup(&self, address: usize) -> FunctionTableLookup {
        for entry in self.entries.iter().flatten() {
            if address >= entry.image_base && address < entry.image_base + entry.image_size {
                return match entry.kind {
                    RegisteredKind::NoHandlers => FunctionTableLookup::NoHandlers,
                    RegisteredKind::Table(table) => FunctionTableLookup::Table {
                        image_base: entry.image_base,
                        table,
                    },
                };
            }
        }
        FunctionTableLookup::NotRegistered
    }
}

impl Default for FunctionTableRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The process-wide registry a host kernel's [`ExceptionEnvironment`](crate::rtl::environment::ExceptionEnvironment)
/// implementation is expected to consult from `lookup_function_table`.
pub static REGISTRY: Mutex<FunctionTableRegistry> = Mutex::new(FunctionTableRegistry::new());
