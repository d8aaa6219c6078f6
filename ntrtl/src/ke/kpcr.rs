//! IRQL (Interrupt Request Level)
//!
//! The full `KPCR`/`KPRCB` pair lives in the host kernel; this module keeps
//! only the `Kirql` type and level constants the alternate-stack check in
//! `rtl::dispatch`/`rtl::unwind` compares against
//! (`ExceptionEnvironment::current_irql() >= irql::DISPATCH_LEVEL`).

/// Interrupt Request Level type
pub type Kirql = u8;

/// IRQL levels (NT compatible)
pub mod irql {
    use super::Kirql;

    /// Passive level - normal thread execution, all interrupts enabled
    pub const PASSIVE_LEVEL: Kirql = 0;
    /// APC level - APCs are disabled
    pub const APC_LEVEL: Kirql = 1;
    /// Dispatch level - thread preemption disabled, DPCs run here
    pub const DISPATCH_LEVEL: Kirql = 2;
    /// Highest level - all interrupts disabled
    pub const HIGH_LEVEL: Kirql = 31;
}
