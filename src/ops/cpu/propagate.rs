use rayon::prelude::*;

use super::{blocks_per_task, ChannelCoeffs};
use crate::layout::ChannelView;

/// Writes every element of `dx` from the folded per-channel coefficients.
///
/// `coeffs` must hold the fully reduced sums of every channel; each `dx`
/// element is assigned exactly once, so its previous contents never matter.
pub(crate) fn propagate<V: ChannelView>(
    view: V,
    x: &[f32],
    dy: &[f32],
    coeffs: &[ChannelCoeffs],
    dx: &mut [f32],
    parallel: bool,
) {
    if !parallel {
        propagate_blocks(view, 0, x, dy, coeffs, dx);
        return;
    }

    let block_len = view.block_len();
    let per_task = blocks_per_task(block_len, x.len() / block_len);
    let chunk = per_task * block_len;

    dx.par_chunks_mut(chunk)
        .zip(x.par_chunks(chunk))
        .zip(dy.par_chunks(chunk))
        .enumerate()
        .for_each(|(task, ((dxs, xs), dys))| {
            propagate_blocks(view, task * per_task, xs, dys, coeffs, dxs);
        });
}

fn propagate_blocks<V: ChannelView>(
    view: V,
    first: usize,
    x: &[f32],
    dy: &[f32],
    coeffs: &[ChannelCoeffs],
    dx: &mut [f32],
) {
    let block_len = view.block_len();
    let blocks = dx
        .chunks_exact_mut(block_len)
        .zip(x.chunks_exact(block_len))
        .zip(dy.chunks_exact(block_len));

    for (b, ((dxs, xs), dys)) in blocks.enumerate() {
        let block = first + b;
        for (i, ((g, &x), &dy)) in dxs.iter_mut().zip(xs).zip(dys).enumerate() {
            *g = coeffs[view.channel_of(block, i)].input_grad(x, dy);
        }
    }
}
