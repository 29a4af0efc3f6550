use rayon::prelude::*;

use super::{blocks_per_task, ChannelSums};
use crate::layout::{ChannelView, SavedStats};

/// Computes the per-channel bias and scale gradient sums.
///
/// # Summation order
///
/// Sequentially, elements are added one by one into a single accumulator per
/// channel in ascending memory order. In parallel, the buffer is cut into
/// contiguous runs of whole blocks, each run is summed in that same order
/// into its own `Vec<ChannelSums>`, and the partial vectors are merged by
/// rayon's tree reduction. The merge tree can differ between runs, so the
/// parallel result may differ from the sequential one in the last bits.
pub(crate) fn reduce<V: ChannelView>(
    view: V,
    channels: usize,
    x: &[f32],
    dy: &[f32],
    stats: SavedStats<'_>,
    parallel: bool,
) -> Vec<ChannelSums> {
    if !parallel {
        let mut acc = vec![ChannelSums::default(); channels];
        reduce_blocks(view, 0, x, dy, stats, &mut acc);
        return acc;
    }

    let block_len = view.block_len();
    let per_task = blocks_per_task(block_len, x.len() / block_len);
    let chunk = per_task * block_len;

    x.par_chunks(chunk)
        .zip(dy.par_chunks(chunk))
        .enumerate()
        .fold(
            || vec![ChannelSums::default(); channels],
            |mut acc, (task, (xs, dys))| {
                reduce_blocks(view, task * per_task, xs, dys, stats, &mut acc);
                acc
            },
        )
        .reduce(
            || vec![ChannelSums::default(); channels],
            |mut left, right| {
                left.iter_mut().zip(&right).for_each(|(l, r)| l.merge(r));
                left
            },
        )
}

/// Accumulates consecutive blocks, the first of which has index `first`.
fn reduce_blocks<V: ChannelView>(
    view: V,
    first: usize,
    x: &[f32],
    dy: &[f32],
    stats: SavedStats<'_>,
    acc: &mut [ChannelSums],
) {
    let block_len = view.block_len();
    for (b, (xs, dys)) in x.chunks_exact(block_len).zip(dy.chunks_exact(block_len)).enumerate() {
        let block = first + b;
        for (i, (&x, &dy)) in xs.iter().zip(dys).enumerate() {
            let c = view.channel_of(block, i);
            acc[c].accumulate(x, dy, stats.mean[c], stats.inv_std[c]);
        }
    }
}
