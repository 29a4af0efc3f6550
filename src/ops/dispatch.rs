//! Operation Dispatch Layer
//!
//! Turns a gradient request into a kernel call:
//!
//! 1. Validate every input against the requested layout
//! 2. Resolve the [`Execution`] mode against the tensor size
//! 3. Size the caller's outputs like their inputs
//! 4. Run the two-pass CPU kernel
//!
//! # Design Highlights
//! - **All-or-nothing**: a failing request leaves every output exactly as it was
//! - **No hidden allocation**: outputs are resized, reusing their buffers
//!
//! # Example
//! ```rust
//! use spatial_bn::backend::Execution;
//! use spatial_bn::layout::{Layout, SavedStats};
//! use spatial_bn::ops::dispatch::spatial_bn_gradient;
//! use spatial_bn::tensors::Tensor;
//!
//! let x = Tensor::new(vec![2, 1, 1, 1], vec![1.0, 3.0]);
//! let dy = Tensor::new(vec![2, 1, 1, 1], vec![1.0, 1.0]);
//! let (mut dx, mut ds, mut db) = (Tensor::default(), Tensor::default(), Tensor::default());
//! spatial_bn_gradient(
//!     &x, &dy, &[2.0], SavedStats::new(&[2.0], &[1.0]),
//!     Layout::ChannelMajor, Execution::Sequential,
//!     &mut dx, &mut ds, &mut db,
//! ).unwrap();
//! assert_eq!(db.data, vec![2.0]);
//! ```

use crate::backend::Execution;
use crate::error::{BnError, Result};
use crate::layout::{check_inputs, Layout, SavedStats};
use crate::tensors::Ten32;

use super::cpu;

/// Validates and runs the spatial batch-norm backward pass into caller-owned outputs.
///
/// On success `input_grad` has the activation's shape and the two
/// per-channel outputs have shape `[C]`; all three are fully overwritten.
///
/// # Errors
/// - [`BnError::ShapeMismatch`] for a non-4D activation, a differently shaped
///   output gradient, or a per-channel vector whose length is not `C`
/// - [`BnError::InvalidStatistics`] for a non-positive saved inverse std
///
/// Outputs are untouched when an error is returned.
#[allow(clippy::too_many_arguments)]
pub fn spatial_bn_gradient(
    activation: &Ten32,
    output_grad: &Ten32,
    scale: &[f32],
    stats: SavedStats<'_>,
    layout: Layout,
    execution: Execution,
    input_grad: &mut Ten32,
    scale_grad: &mut Ten32,
    bias_grad: &mut Ten32,
) -> Result<()> {
    let dims = check_inputs(&activation.shape, &output_grad.shape, scale, stats, layout)?;

    for (tensor, t) in [("activation", activation), ("output_grad", output_grad)] {
        if t.data.len() != dims.numel() {
            return Err(BnError::shape(
                tensor,
                format!("{} elements", dims.numel()),
                format!("{} elements", t.data.len()),
            ));
        }
    }

    let parallel = execution.is_parallel_for(dims.numel());
    log::debug!(
        "spatial_bn_gradient: {layout} n={} c={} h={} w={} {execution:?} parallel={parallel}",
        dims.n,
        dims.c,
        dims.h,
        dims.w,
    );

    input_grad.resize_like(activation);
    scale_grad.resize(&[dims.c]);
    bias_grad.resize(&[dims.c]);

    cpu::spatial_bn_grad(
        &activation.data,
        &output_grad.data,
        scale,
        stats,
        layout,
        dims,
        parallel,
        &mut input_grad.data,
        &mut scale_grad.data,
        &mut bias_grad.data,
    );

    Ok(())
}
