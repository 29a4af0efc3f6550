//! Spatial batch-normalization gradients.
//!
//! # Backward Pass
//!
//! The forward transform, per channel `c`, is
//!
//! ```text
//! y = scale[c] * (x - mean[c]) * inv_std[c] + bias[c]
//! ```
//!
//! where `mean`/`inv_std` were computed from the batch itself. Given `dY`,
//! this module returns:
//!
//! - `dBias[c]  = Σ dY`
//! - `dScale[c] = Σ (x - mean[c]) * inv_std[c] * dY`
//! - `dX = scale[c] * inv_std[c] / M * (M * dY - dBias[c] - xhat * dScale[c])`,
//!   with `xhat = (x - mean[c]) * inv_std[c]`
//!
//! with the sums running over the `M = N * H * W` values of the channel.
//!
//! ## Usage Guidelines
//!
//! - The statistics must be the ones the forward pass actually used; this
//!   module does not decide between batch and running statistics.
//! - Shape problems are reported as [`BnError`](crate::error::BnError), never panics.
//! - Use [`spatial_bn_gradient_into`] to reuse output buffers across steps.

use crate::backend::{get_execution, Execution};
use crate::error::Result;
use crate::layout::{Layout, SavedStats};
use crate::ops::dispatch;
use crate::tensors::Ten32;

/// The three gradients of a spatial batch-norm layer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BnGradients {
    /// `dL/dX`, same shape and layout as the activation.
    pub input_grad: Ten32,
    /// `dL/dscale`, shape `[C]`.
    pub scale_grad: Ten32,
    /// `dL/dbias`, shape `[C]`.
    pub bias_grad: Ten32,
}

/// Computes all three gradients using the global execution mode.
///
/// # Example
/// ```rust
/// use spatial_bn::backprop::spatial_bn_gradient;
/// use spatial_bn::layout::{Layout, SavedStats};
/// use spatial_bn::tensors::Tensor;
///
/// let x = Tensor::new(vec![2, 1, 1, 1], vec![1.0, 3.0]);
/// let dy = Tensor::new(vec![2, 1, 1, 1], vec![1.0, 1.0]);
/// let stats = SavedStats::new(&[2.0], &[1.0]);
/// let g = spatial_bn_gradient(&x, &dy, &[2.0], stats, Layout::ChannelMajor)?;
/// assert_eq!(g.bias_grad.data, vec![2.0]);
/// assert_eq!(g.scale_grad.data, vec![0.0]);
/// assert_eq!(g.input_grad.data, vec![0.0, 0.0]);
/// # Ok::<(), spatial_bn::error::BnError>(())
/// ```
///
/// # Errors
/// See [`dispatch::spatial_bn_gradient`].
pub fn spatial_bn_gradient(
    activation: &Ten32,
    output_grad: &Ten32,
    scale: &[f32],
    stats: SavedStats<'_>,
    layout: Layout,
) -> Result<BnGradients> {
    spatial_bn_gradient_with(activation, output_grad, scale, stats, layout, get_execution())
}

/// Computes all three gradients with an explicit execution mode.
///
/// # Errors
/// See [`dispatch::spatial_bn_gradient`].
pub fn spatial_bn_gradient_with(
    activation: &Ten32,
    output_grad: &Ten32,
    scale: &[f32],
    stats: SavedStats<'_>,
    layout: Layout,
    execution: Execution,
) -> Result<BnGradients> {
    let mut out = BnGradients::default();
    dispatch::spatial_bn_gradient(
        activation,
        output_grad,
        scale,
        stats,
        layout,
        execution,
        &mut out.input_grad,
        &mut out.scale_grad,
        &mut out.bias_grad,
    )?;
    Ok(out)
}

/// Computes all three gradients into caller-owned tensors.
///
/// The outputs are resized like their inputs and fully overwritten. If the
/// call fails they keep their previous shape and contents.
///
/// # Errors
/// See [`dispatch::spatial_bn_gradient`].
#[allow(clippy::too_many_arguments)]
pub fn spatial_bn_gradient_into(
    activation: &Ten32,
    output_grad: &Ten32,
    scale: &[f32],
    stats: SavedStats<'_>,
    layout: Layout,
    input_grad: &mut Ten32,
    scale_grad: &mut Ten32,
    bias_grad: &mut Ten32,
) -> Result<()> {
    dispatch::spatial_bn_gradient(
        activation,
        output_grad,
        scale,
        stats,
        layout,
        get_execution(),
        input_grad,
        scale_grad,
        bias_grad,
    )
}
