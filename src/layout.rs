//! Physical layouts of a 4D activation tensor.
//!
//! A layout decides which axis varies fastest in memory:
//!
//! - [`Layout::ChannelMajor`] (`NCHW`): each `(n, c)` pair owns a contiguous
//!   plane of `H * W` values.
//! - [`Layout::ChannelMinor`] (`NHWC`): each `(n, h, w)` position owns a
//!   contiguous run of `C` values, one per channel.
//!
//! Both are described to the kernels as a sequence of equally sized *blocks*
//! plus a rule mapping `(block, offset)` to a channel. That rule is the
//! [`ChannelView`] trait; nothing else in the kernels knows about layouts.

use core::fmt;
use core::str::FromStr;

use briny::prelude::*;

use crate::error::{BnError, Result};

/// Storage order of a 4D tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Layout {
    /// `N, C, H, W`: channel varies slower than the spatial position.
    ChannelMajor = 0,
    /// `N, H, W, C`: channel varies fastest.
    ChannelMinor = 1,
}

impl Layout {
    /// Conventional short name (`"NCHW"` / `"NHWC"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ChannelMajor => "NCHW",
            Self::ChannelMinor => "NHWC",
        }
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Layout {
    type Err = BnError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "nchw" | "channel-major" | "channel_major" => Ok(Self::ChannelMajor),
            "nhwc" | "channel-minor" | "channel_minor" => Ok(Self::ChannelMinor),
            _ => Err(BnError::UnsupportedLayout(s.to_string())),
        }
    }
}

impl TryFrom<u8> for Layout {
    type Error = BnError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::ChannelMajor),
            1 => Ok(Self::ChannelMinor),
            other => Err(BnError::UnsupportedLayout(format!("storage order tag {other}"))),
        }
    }
}

/// Logical dimensions of an activation tensor, independent of its layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dims {
    pub n: usize,
    pub c: usize,
    pub h: usize,
    pub w: usize,
}

impl Dims {
    /// Reads `(N, C, H, W)` out of a physical shape.
    ///
    /// # Errors
    /// [`BnError::ShapeMismatch`] if the shape is not rank 4 or its element
    /// count does not fit in `usize`.
    pub fn from_shape(shape: &[usize], layout: Layout) -> Result<Self> {
        let &[a, b, c, d] = shape else {
            let got = format!("rank {} {shape:?}", shape.len());
            return Err(BnError::shape("activation", "rank 4", got));
        };
        if shape.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim)).is_none() {
            let got = format!("{shape:?} overflows usize");
            return Err(BnError::shape("activation", "an addressable element count", got));
        }
        Ok(match layout {
            Layout::ChannelMajor => Self { n: a, c: b, h: c, w: d },
            Layout::ChannelMinor => Self { n: a, h: b, w: c, c: d },
        })
    }

    /// `H * W`.
    pub fn spatial(&self) -> usize {
        self.h * self.w
    }

    /// Number of values sharing one channel: `N * H * W`.
    pub fn reduce_len(&self) -> usize {
        self.n * self.spatial()
    }

    /// Total element count.
    pub fn numel(&self) -> usize {
        self.reduce_len() * self.c
    }
}

/// Saved forward-pass statistics, one value per channel.
#[derive(Debug, Clone, Copy)]
pub struct SavedStats<'a> {
    pub mean: &'a [f32],
    pub inv_std: &'a [f32],
}

impl<'a> SavedStats<'a> {
    pub fn new(mean: &'a [f32], inv_std: &'a [f32]) -> Self {
        Self { mean, inv_std }
    }
}

/// One saved inverse standard deviation.
///
/// Only strictly positive values describe a real distribution; zero,
/// negatives and NaN are rejected.
#[derive(Debug, Clone, Copy)]
struct InvStd(f32);

impl Validate for InvStd {
    fn validate(&self) -> core::result::Result<(), ValidationError> {
        if self.0.is_nan() || self.0 <= 0.0 {
            return Err(ValidationError);
        }
        Ok(())
    }
}

/// Checks every input against `layout` and returns the logical dimensions.
///
/// Nothing is written anywhere; a caller may rely on its outputs being
/// untouched when this fails.
pub(crate) fn check_inputs(
    x_shape: &[usize],
    dy_shape: &[usize],
    scale: &[f32],
    stats: SavedStats<'_>,
    layout: Layout,
) -> Result<Dims> {
    let dims = Dims::from_shape(x_shape, layout)?;

    if dy_shape != x_shape {
        let (expected, got) = (format!("{x_shape:?}"), format!("{dy_shape:?}"));
        return Err(BnError::shape("output_grad", expected, got));
    }

    let per_channel = [
        ("scale", scale.len()),
        ("saved_mean", stats.mean.len()),
        ("saved_inv_std", stats.inv_std.len()),
    ];
    for (tensor, len) in per_channel {
        if len != dims.c {
            let expected = format!("length {}", dims.c);
            return Err(BnError::shape(tensor, expected, format!("length {len}")));
        }
    }

    for (channel, &value) in stats.inv_std.iter().enumerate() {
        InvStd(value)
            .validate()
            .map_err(|_| BnError::InvalidStatistics { channel, value })?;
    }

    Ok(dims)
}

/// How a layout splits a flat buffer into blocks and assigns channels.
///
/// Kernels are generic over this trait so the gradient formula exists once.
pub(crate) trait ChannelView: Copy + Send + Sync {
    /// Length of one contiguous block.
    fn block_len(&self) -> usize;

    /// Channel of the element at `offset` inside block number `block`.
    fn channel_of(&self, block: usize, offset: usize) -> usize;
}

/// `NCHW`: blocks are `H * W` planes, one channel per block.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ChannelMajorView {
    pub channels: usize,
    pub plane: usize,
}

impl ChannelView for ChannelMajorView {
    #[inline]
    fn block_len(&self) -> usize {
        self.plane
    }

    #[inline]
    fn channel_of(&self, block: usize, _offset: usize) -> usize {
        block % self.channels
    }
}

/// `NHWC`: blocks are `C`-long runs, one element per channel.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ChannelMinorView {
    pub channels: usize,
}

impl ChannelView for ChannelMinorView {
    #[inline]
    fn block_len(&self) -> usize {
        self.channels
    }

    #[inline]
    fn channel_of(&self, _block: usize, offset: usize) -> usize {
        offset
    }
}
