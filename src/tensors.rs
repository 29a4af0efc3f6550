//! Core tensor data structures.
//!
//! # Tensor Storage
//!
//! A [`Tensor`] is a shape plus a flat buffer. How the flat buffer maps onto
//! the logical `(N, C, H, W)` axes is *not* a property of the tensor; it is
//! decided by the [`Layout`](crate::layout::Layout) a caller passes alongside
//! it. The same `[2, 3, 4, 5]` buffer therefore means batch 2 / channels 3 in
//! channel-major order and batch 2 / channels 5 in channel-minor order.
//!
//! ## Design Highlights
//! - Shape is stored as a `Vec<usize>` and checked against the data length on construction
//! - Outputs are caller-owned and resized in place, never reallocated behind the caller's back
//! - The `tensor!` macro supports ergonomic tensor creation from nested arrays
//!
//! ## Example
//!
//! ```rust
//! use spatial_bn::tensors::Tensor;
//! let t = Tensor::new(vec![1, 2, 1, 3], vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]);
//! assert_eq!(t.ndim(), 4);
//! ```

/// Represents an N-dimensional tensor with a shape and flat data.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor<T> {
    pub shape: Vec<usize>,
    pub data: Vec<T>,
}

/// Single precision tensor, the element type every kernel in this crate works in.
pub type Ten32 = Tensor<f32>;

impl<T> Tensor<T> {
    /// Creates a new tensor with the given shape and flat data.
    ///
    /// # Panics
    /// Panics if the number of elements in `data` does not match the shape product.
    pub fn new(shape: impl Into<Vec<usize>>, data: Vec<T>) -> Self {
        let shape = shape.into();
        assert_eq!(
            shape.iter().product::<usize>(),
            data.len(),
            "shape {:?} is incompatible with {} data elements",
            shape,
            data.len()
        );
        Self { shape, data }
    }

    /// Number of axes.
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` when the tensor holds no elements.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<T: Copy + Default> Tensor<T> {
    /// A tensor of the given shape filled with `T::default()`.
    pub fn zeros(shape: impl Into<Vec<usize>>) -> Self {
        let shape = shape.into();
        let len = shape.iter().product();
        Self {
            shape,
            data: vec![T::default(); len],
        }
    }

    /// Reshapes `self` to `shape` and resets every element to `T::default()`.
    ///
    /// The existing allocation is reused when it is large enough.
    pub fn resize(&mut self, shape: &[usize]) {
        let len = shape.iter().product();
        self.shape.clear();
        self.shape.extend_from_slice(shape);
        self.data.clear();
        self.data.resize(len, T::default());
    }

    /// Resizes `self` to the shape of `other`, zeroing the contents.
    pub fn resize_like<U>(&mut self, other: &Tensor<U>) {
        self.resize(&other.shape);
    }
}

impl<T> Default for Tensor<T> {
    fn default() -> Self {
        Self {
            shape: vec![0],
            data: Vec::new(),
        }
    }
}

/// Defines a tensor from nested literal arrays.
///
/// Supports arbitrary dimensionality as long as sublists are uniform in shape.
///
/// # Example
/// ```
/// use spatial_bn::tensor;
/// let t = tensor!([[[[1.0f32, -2.0], [3.0, 4.0]]]]);
/// assert_eq!(t.shape, vec![1, 1, 2, 2]);
/// ```
#[macro_export]
macro_rules! tensor {
    ([ $( [ $($inner:tt)* ] ),+ $(,)? ]) => {{
        let children = vec![ $( $crate::tensor!([ $($inner)* ]) ),+ ];
        let first_shape = children[0].shape.clone();
        assert!(children.iter().all(|c| c.shape == first_shape),
            "ragged tensor literal (rows have mismatched shapes)");
        let mut shape = vec![children.len()];
        shape.extend_from_slice(&first_shape);
        let mut data = Vec::with_capacity(children.len() * children[0].data.len());
        for c in children { data.extend(c.data); }
        $crate::tensors::Tensor::new(shape, data)
    }};

    ([ $( $x:expr ),+ $(,)? ]) => {{
        let data = vec![ $( $x ),+ ];
        $crate::tensors::Tensor::new(vec![data.len()], data)
    }};
}
