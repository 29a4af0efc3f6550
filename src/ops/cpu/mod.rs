//! Parallel CPU backend for the spatial batch-norm backward pass.
//!
//! # CPU Backend
//!
//! The gradient is computed in two stages that must not be fused:
//!
//! 1. [`reduce`] — per channel, `Σ dY` and `Σ (X - mean) * invStd * dY`.
//!    These are the bias and scale gradients.
//! 2. [`propagate`] — every `dX` element, which needs the *complete* sums of
//!    its channel over the whole batch and spatial extent.
//!
//! Both stages are generic over a [`ChannelView`], so the arithmetic below is
//! shared by the channel-major and channel-minor layouts.
//!
//! ## Features
//!
//! - Parallel execution using [`rayon`](https://docs.rs/rayon)
//! - Per-partition private accumulators merged by a tree reduction; no locks
//! - Pure sequential path with a fixed summation order for reproducibility

use crate::layout::{ChannelMajorView, ChannelMinorView, ChannelView, Dims, Layout, SavedStats};

mod propagate;
mod reduce;

pub(crate) use self::propagate::propagate;
pub(crate) use self::reduce::reduce;

/// Minimum number of elements handed to one rayon task.
const MIN_TASK_ELEMS: usize = 4096;

/// Per-channel sufficient statistics produced by the reduction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct ChannelSums {
    /// `Σ dY`, i.e. the bias gradient.
    pub dy: f32,
    /// `Σ (X - mean) * invStd * dY`, i.e. the scale gradient.
    pub dy_xhat: f32,
}

impl ChannelSums {
    #[inline]
    fn accumulate(&mut self, x: f32, dy: f32, mean: f32, inv_std: f32) {
        self.dy += dy;
        self.dy_xhat += (x - mean) * inv_std * dy;
    }

    #[inline]
    fn merge(&mut self, other: &Self) {
        self.dy += other.dy;
        self.dy_xhat += other.dy_xhat;
    }
}

/// Everything the propagation pass needs about one channel, folded once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ChannelCoeffs {
    mean: f32,
    inv_std: f32,
    /// `scale * invStd / (N * H * W)`
    gain: f32,
    /// `N * H * W`
    count: f32,
    bias_grad: f32,
    scale_grad: f32,
}

impl ChannelCoeffs {
    fn new(scale: f32, mean: f32, inv_std: f32, sums: ChannelSums, reduce_len: usize) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let count = reduce_len as f32;
        let gain = if reduce_len == 0 { 0.0 } else { scale * inv_std / count };
        Self {
            mean,
            inv_std,
            gain,
            count,
            bias_grad: sums.dy,
            scale_grad: sums.dy_xhat,
        }
    }

    /// `gain * (dY * M - Σ dY - (X - mean) * invStd * Σ (xhat * dY))`
    #[inline]
    fn input_grad(&self, x: f32, dy: f32) -> f32 {
        self.gain
            * (dy * self.count - self.bias_grad - (x - self.mean) * self.inv_std * self.scale_grad)
    }
}

/// How many whole blocks one parallel task processes.
fn blocks_per_task(block_len: usize, blocks: usize) -> usize {
    let by_size = MIN_TASK_ELEMS.div_ceil(block_len.max(1));
    let by_threads = blocks.div_ceil(rayon::current_num_threads() * 4);
    by_size.max(by_threads).max(1)
}

/// Runs both passes for an already validated problem.
///
/// Outputs must already have their final lengths: `dx` matches `x`,
/// `scale_grad`/`bias_grad` have `dims.c` entries. Every output element is
/// overwritten.
#[allow(clippy::too_many_arguments)]
pub(crate) fn spatial_bn_grad(
    x: &[f32],
    dy: &[f32],
    scale: &[f32],
    stats: SavedStats<'_>,
    layout: Layout,
    dims: Dims,
    parallel: bool,
    dx: &mut [f32],
    scale_grad: &mut [f32],
    bias_grad: &mut [f32],
) {
    if dims.numel() == 0 {
        // no elements: sums stay zero and there is no block to walk
        scale_grad.fill(0.0);
        bias_grad.fill(0.0);
        dx.fill(0.0);
        return;
    }

    let io = Buffers { x, dy, dx, scale_grad, bias_grad };
    match layout {
        Layout::ChannelMajor => run(
            ChannelMajorView { channels: dims.c, plane: dims.spatial() },
            io,
            scale,
            stats,
            dims,
            parallel,
        ),
        Layout::ChannelMinor => {
            run(ChannelMinorView { channels: dims.c }, io, scale, stats, dims, parallel)
        }
    }
}

struct Buffers<'a> {
    x: &'a [f32],
    dy: &'a [f32],
    dx: &'a mut [f32],
    scale_grad: &'a mut [f32],
    bias_grad: &'a mut [f32],
}

fn run<V: ChannelView>(
    view: V,
    io: Buffers<'_>,
    scale: &[f32],
    stats: SavedStats<'_>,
    dims: Dims,
    parallel: bool,
) {
    let Buffers { x, dy, dx, scale_grad, bias_grad } = io;

    let sums = reduce(view, dims.c, x, dy, stats, parallel);
    log::trace!("reduction pass done for {} channels", sums.len());

    for ((s, ds), db) in sums.iter().zip(scale_grad.iter_mut()).zip(bias_grad.iter_mut()) {
        *db = s.dy;
        *ds = s.dy_xhat;
    }

    let coeffs: Vec<ChannelCoeffs> = sums
        .iter()
        .enumerate()
        .map(|(c, &s)| {
            ChannelCoeffs::new(scale[c], stats.mean[c], stats.inv_std[c], s, dims.reduce_len())
        })
        .collect();

    propagate(view, x, dy, &coeffs, dx, parallel);
    log::trace!("propagation pass done for {} elements", x.len());
}
