//! Execution selection module.
//!
//! This module defines how the CPU kernels are scheduled and provides
//! functions to set and get the current execution mode.
//!
//! # Supported Modes
//!
//! - `Auto` — Parallel for large tensors, sequential for small ones (default).
//! - `Sequential` — Single-threaded, with a fixed and reproducible summation order.
//! - `Parallel` — Always split the work across the `rayon` thread pool.
//!
//! The mode is stored globally using an `AtomicU8`, so it can be switched at
//! runtime without threading a configuration value through every call. A
//! per-call override is available through
//! [`spatial_bn_gradient_with`](crate::backprop::spatial_bn_gradient_with).

use core::convert::TryFrom;
use core::sync::atomic::{AtomicU8, Ordering};

/// Element count at which [`Execution::Auto`] switches to the parallel path.
pub const PARALLEL_THRESHOLD: usize = 1 << 15;

/// Enumeration of the available execution modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Execution {
    /// Pick per call from the tensor size (default).
    #[default]
    Auto = 0,
    /// Single-threaded; results are bit-reproducible.
    Sequential,
    /// Multi-threaded through `rayon`.
    Parallel,
}

impl Execution {
    /// Resolves `Auto` against an element count.
    ///
    /// Returns `true` when the parallel kernels should be used.
    pub fn is_parallel_for(self, numel: usize) -> bool {
        match self {
            Self::Auto => numel >= PARALLEL_THRESHOLD,
            Self::Sequential => false,
            Self::Parallel => true,
        }
    }
}

impl TryFrom<u8> for Execution {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Auto),
            1 => Ok(Self::Sequential),
            2 => Ok(Self::Parallel),
            _ => Err(()),
        }
    }
}

/// Internal global state for the active execution mode.
///
/// Relaxed enough for a setting that changes rarely; the release/acquire pair
/// only guarantees a store is seen by calls started after it.
static GLOBAL_EXECUTION: AtomicU8 = AtomicU8::new(Execution::Auto as u8);

/// Sets the execution mode used by calls that do not pass one explicitly.
///
/// # Example
///
/// ```
/// use spatial_bn::backend::{set_execution, Execution};
/// set_execution(Execution::Sequential);
/// # set_execution(Execution::Auto);
/// ```
pub fn set_execution(e: Execution) {
    GLOBAL_EXECUTION.store(e as u8, Ordering::Release);
}

/// Returns the currently active execution mode.
///
/// If the stored value is invalid, defaults to [`Execution::Auto`].
pub fn get_execution() -> Execution {
    Execution::try_from(GLOBAL_EXECUTION.load(Ordering::Acquire)).unwrap_or_default()
}
