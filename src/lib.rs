//! spatial_bn: the backward pass of spatial batch normalization, on the CPU.
//!
//! Given a 4D activation, its per-channel scale, the mean and inverse
//! standard deviation saved by the forward pass, and the gradient flowing
//! back from the output, computes the gradients with respect to the input,
//! the scale and the bias.
//!
//! # Features
//!
//! - Channel-major (`NCHW`) and channel-minor (`NHWC`) layouts behind one kernel.
//! - Sequential execution with a reproducible summation order, or `rayon` parallelism.
//! - Validation up front: a rejected call never writes to its outputs.
//!
//! # Modules
//!
//! - [`tensors`] — Flat tensor storage and the `tensor!` macro.
//! - [`layout`] — Layout tags, logical dimensions and the saved statistics.
//! - [`backprop`] — The public gradient entry points.
//! - [`ops`] — Validation/dispatch and the CPU kernels.
//! - [`backend`] — Global execution mode selection.
//! - [`error`] — The crate error type.
//! - [`approx`] — Tolerance-based float comparison.
//!
//! # Example
//!
//! ```rust
//! use spatial_bn::backprop::spatial_bn_gradient;
//! use spatial_bn::layout::{Layout, SavedStats};
//! use spatial_bn::tensor;
//!
//! // N=1, H=1, W=2, C=2 in channel-minor order
//! let x = tensor!([[[[0.5f32, 1.0], [1.5, 3.0]]]]);
//! let dy = tensor!([[[[1.0f32, 0.0], [0.0, 1.0]]]]);
//! let grads = spatial_bn_gradient(
//!     &x, &dy, &[1.0, 1.0], SavedStats::new(&[1.0, 2.0], &[2.0, 1.0]), Layout::ChannelMinor,
//! )?;
//! assert_eq!(grads.bias_grad.data, vec![1.0, 1.0]);
//! # Ok::<(), spatial_bn::error::BnError>(())
//! ```

pub mod approx;
pub mod backend;
pub mod backprop;
pub mod error;
pub mod layout;
pub mod ops;
pub mod tensors;

pub use backprop::{
    spatial_bn_gradient, spatial_bn_gradient_into, spatial_bn_gradient_with, BnGradients,
};
pub use error::{BnError, Result};
pub use layout::{Dims, Layout, SavedStats};
