//! # Operation Dispatch Layer
//!
//! This module validates gradient requests and schedules them on the CPU
//! kernels, either sequentially or across the `rayon` thread pool.
//!
//! ## Submodules
//!
//! - [`dispatch`] — Shape/statistics validation, output sizing and execution selection
//! - `cpu` — The reduction and propagation kernels, generic over the tensor layout
//!
//! ## Execution Selection
//!
//! Callers pick an [`Execution`](crate::backend::Execution) explicitly or rely
//! on the global one from [`backend`](crate::backend). `Auto` goes parallel
//! only once a tensor is large enough to amortize the thread hand-off.
//!
//! ## Notes
//!
//! - Validation happens here, in one backend-agnostic place, before any output is touched
//! - Kernels never allocate the caller's buffers; outputs are resized in place

pub mod dispatch;

pub(crate) mod cpu;
