//! Core tensor data structures and operations.
//!
//! # Core Tensor Utilities
//!
//! This module defines the arrays that flow through the Kepler primitive.
//!
//! It supports:
//! - Construction of N-dimensional tensors with shape and row-major data layout
//! - Element-wise arithmetic (`+`, `-`, `*`, `/`, unary `-`) on same-shape tensors
//! - Movement: broadcasting, reshaping, moving an axis, slicing along an axis
//! - A dtype-erased [`Array`] so that mixed-dtype inputs can be detected at runtime
//! - Compile-time tensor literals through the [`tensor!`](crate::tensor) macro
//!
//! ## Design Highlights
//! - Tensors are strongly typed: `Tensor<T>` for any element type (`f32` or `f64` for the primitive)
//! - Shape is stored as a `Vec<usize>` and enforced at runtime
//! - Every movement op materializes a fresh row-major buffer; there are no views
//!
//! ## Example
//!
//! ```rust
//! use kepler_op::tensors::Tensor;
//! let t = Tensor::new(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
//! assert_eq!(t.shape, vec![2, 3]);
//! ```

use core::ops::{Add, Div, Mul, Neg, Sub};

use crate::abstract_eval::ShapedArray;
use crate::dtype::{DType, Float};
use crate::error::KeplerError;
use crate::shape::{broadcast_shapes, row_major_strides};

/// Represents an N-dimensional tensor with a shape and flat row-major data.
///
/// - All elements must be the same type (`T`).
/// - `shape` defines the structure, e.g., `[2, 3]` for a 2×3 matrix.
/// - `data` holds the flattened content in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor<T> {
    /// Dimension sizes, outermost first.
    pub shape: Vec<usize>,
    /// Flattened row-major elements.
    pub data: Vec<T>,
}

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

    /// Fallible counterpart of [`Tensor::new`].
    ///
    /// # Errors
    /// [`KeplerError::InvalidArgument`] if the element count does not match the shape.
    pub fn try_new(shape: impl Into<Vec<usize>>, data: Vec<T>) -> Result<Self, KeplerError> {
        let shape = shape.into();
        if shape.iter().product::<usize>() != data.len() {
            return Err(KeplerError::InvalidArgument(format!(
                "shape {shape:?} is incompatible with {} data elements",
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    /// Number of dimensions.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Number of elements.
    #[must_use]
    pub fn numel(&self) -> usize {
        self.data.len()
    }
}

impl<T: Copy> Tensor<T> {
    /// A tensor of `shape` with every element set to `value`.
    pub fn full(shape: impl Into<Vec<usize>>, value: T) -> Self {
        let shape = shape.into();
        let n = shape.iter().product();
        Self {
            shape,
            data: vec![value; n],
        }
    }

    /// A rank-0 tensor.
    pub fn scalar(value: T) -> Self {
        Self {
            shape: Vec::new(),
            data: vec![value],
        }
    }

    /// Applies `f` to every element.
    #[must_use]
    pub fn map<U>(&self, f: impl Fn(T) -> U) -> Tensor<U> {
        Tensor {
            shape: self.shape.clone(),
            data: self.data.iter().map(|&x| f(x)).collect(),
        }
    }

    /// Combines two same-shape tensors element by element.
    ///
    /// # Panics
    /// Panics if shapes do not match.
    #[must_use]
    pub fn zip_map<U: Copy, V>(&self, other: &Tensor<U>, f: impl Fn(T, U) -> V) -> Tensor<V> {
        assert_eq!(self.shape, other.shape, "shape mismatch");
        Tensor {
            shape: self.shape.clone(),
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(&a, &b)| f(a, b))
                .collect(),
        }
    }

    /// Broadcasts this tensor to `shape`.
    ///
    /// # Errors
    /// [`KeplerError::ShapeError`] if the shapes are not broadcast-compatible or
    /// broadcasting would not produce exactly `shape`.
    pub fn broadcast_to(&self, shape: &[usize]) -> Result<Self, KeplerError> {
        if self.shape == shape {
            return Ok(self.clone());
        }
        let target = broadcast_shapes(&self.shape, shape)?;
        if target != shape {
            return Err(KeplerError::ShapeError {
                lhs: self.shape.clone(),
                rhs: shape.to_vec(),
            });
        }

        let src_strides = row_major_strides(&self.shape);
        let offset = shape.len() - self.shape.len();
        let strides: Vec<usize> = (0..shape.len())
            .map(|i| {
                if i < offset || self.shape[i - offset] == 1 {
                    0
                } else {
                    src_strides[i - offset]
                }
            })
            .collect();

        Ok(self.gather(0, shape, &strides))
    }

    /// Reinterprets the data under a new shape with the same element count.
    ///
    /// # Errors
    /// [`KeplerError::InvalidArgument`] if the element counts differ.
    pub fn reshape(&self, shape: impl Into<Vec<usize>>) -> Result<Self, KeplerError> {
        Self::try_new(shape, self.data.clone())
    }

    /// Moves axis `source` to position `destination`, keeping the order of the others.
    ///
    /// # Errors
    /// [`KeplerError::InvalidArgument`] if either axis is out of range.
    pub fn moveaxis(&self, source: usize, destination: usize) -> Result<Self, KeplerError> {
        let rank = self.rank();
        if source >= rank || destination >= rank {
            return Err(KeplerError::InvalidArgument(format!(
                "cannot move axis {source} to {destination} in a rank-{rank} tensor"
            )));
        }
        if source == destination {
            return Ok(self.clone());
        }

        let mut perm: Vec<usize> = (0..rank).filter(|&a| a != source).collect();
        perm.insert(destination, source);

        let src_strides = row_major_strides(&self.shape);
        let shape: Vec<usize> = perm.iter().map(|&a| self.shape[a]).collect();
        let strides: Vec<usize> = perm.iter().map(|&a| src_strides[a]).collect();

        Ok(self.gather(0, &shape, &strides))
    }

    /// Selects index `index` along `axis`, dropping that axis.
    ///
    /// # Errors
    /// [`KeplerError::InvalidArgument`] if the axis or index is out of range.
    pub fn index_axis(&self, axis: usize, index: usize) -> Result<Self, KeplerError> {
        if axis >= self.rank() || index >= self.shape[axis] {
            return Err(KeplerError::InvalidArgument(format!(
                "index {index} along axis {axis} is out of range for shape {:?}",
                self.shape
            )));
        }

        let src_strides = row_major_strides(&self.shape);
        let mut shape = self.shape.clone();
        let mut strides = src_strides.clone();
        shape.remove(axis);
        strides.remove(axis);

        Ok(self.gather(index * src_strides[axis], &shape, &strides))
    }

    /// Materializes a strided walk over `self.data` into a fresh row-major tensor.
    fn gather(&self, base: usize, shape: &[usize], strides: &[usize]) -> Self {
        let n: usize = shape.iter().product();
        let mut data = Vec::with_capacity(n);
        let mut index = vec![0usize; shape.len()];
        let mut offset = base;

        for _ in 0..n {
            data.push(self.data[offset]);
            // odometer increment, innermost dimension first
            for d in (0..shape.len()).rev() {
                index[d] += 1;
                offset += strides[d];
                if index[d] < shape[d] {
                    break;
                }
                offset -= strides[d] * shape[d];
                index[d] = 0;
            }
        }

        Self {
            shape: shape.to_vec(),
            data,
        }
    }
}

impl<T: Float> Tensor<T> {
    /// A tensor of zeros.
    pub fn zeros(shape: impl Into<Vec<usize>>) -> Self {
        Self::full(shape, T::ZERO)
    }

    /// A tensor of ones.
    pub fn ones(shape: impl Into<Vec<usize>>) -> Self {
        Self::full(shape, T::ONE)
    }

    /// Zeros shaped like `self`.
    #[must_use]
    pub fn zeros_like(&self) -> Self {
        Self::zeros(self.shape.clone())
    }

    /// Ones shaped like `self`.
    #[must_use]
    pub fn ones_like(&self) -> Self {
        Self::ones(self.shape.clone())
    }

    /// Converts every element to another float type.
    #[must_use]
    pub fn cast<U: Float>(&self) -> Tensor<U> {
        self.map(|x| U::from_f64(x.into_f64()))
    }

    /// Shape/dtype descriptor of this tensor.
    #[must_use]
    pub fn aval(&self) -> ShapedArray {
        ShapedArray::new(self.shape.clone(), T::DTYPE)
    }
}

macro_rules! impl_elementwise {
    ($trait:ident, $method:ident, $op:tt) => {
        impl<T: Float> $trait for &Tensor<T> {
            type Output = Tensor<T>;

            /// # Panics
            /// Panics if shapes do not match.
            fn $method(self, rhs: Self) -> Tensor<T> {
                self.zip_map(rhs, |a, b| a $op b)
            }
        }
    };
}

impl_elementwise!(Add, add, +);
impl_elementwise!(Sub, sub, -);
impl_elementwise!(Mul, mul, *);
impl_elementwise!(Div, div, /);

impl<T: Float> Neg for &Tensor<T> {
    type Output = Tensor<T>;

    fn neg(self) -> Tensor<T> {
        self.map(|x| -x)
    }
}

/// A tensor whose element type is only known at runtime.
///
/// The public entry points take `Array`s so that a float32/float64 mix can be
/// passed in and rejected with a typed error instead of failing to compile.
#[derive(Debug, Clone, PartialEq)]
pub enum Array {
    /// float32 elements.
    F32(Tensor<f32>),
    /// float64 elements.
    F64(Tensor<f64>),
}

impl Array {
    /// Element dtype.
    #[must_use]
    pub const fn dtype(&self) -> DType {
        match self {
            Self::F32(_) => DType::F32,
            Self::F64(_) => DType::F64,
        }
    }

    /// Dimension sizes.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        match self {
            Self::F32(t) => &t.shape,
            Self::F64(t) => &t.shape,
        }
    }

    /// Shape/dtype descriptor.
    #[must_use]
    pub fn aval(&self) -> ShapedArray {
        ShapedArray::new(self.shape().to_vec(), self.dtype())
    }

    /// Borrows the float32 tensor, if that is what this holds.
    #[must_use]
    pub const fn as_f32(&self) -> Option<&Tensor<f32>> {
        match self {
            Self::F32(t) => Some(t),
            Self::F64(_) => None,
        }
    }

    /// Borrows the float64 tensor, if that is what this holds.
    #[must_use]
    pub const fn as_f64(&self) -> Option<&Tensor<f64>> {
        match self {
            Self::F64(t) => Some(t),
            Self::F32(_) => None,
        }
    }

    /// Casts to the canonical dtype under the given x64 switch.
    #[must_use]
    pub fn canonicalize(self, enable_x64: bool) -> Self {
        match self {
            Self::F64(t) if !enable_x64 => Self::F32(t.cast()),
            other => other,
        }
    }

    /// Zeros with the same shape and dtype.
    #[must_use]
    pub fn zeros_like(&self) -> Self {
        match self {
            Self::F32(t) => Self::F32(t.zeros_like()),
            Self::F64(t) => Self::F64(t.zeros_like()),
        }
    }

    /// Broadcasts to `shape`, keeping the dtype.
    ///
    /// # Errors
    /// [`KeplerError::ShapeError`] if the shapes are not broadcast-compatible.
    pub fn broadcast_to(&self, shape: &[usize]) -> Result<Self, KeplerError> {
        Ok(match self {
            Self::F32(t) => Self::F32(t.broadcast_to(shape)?),
            Self::F64(t) => Self::F64(t.broadcast_to(shape)?),
        })
    }

    /// See [`Tensor::reshape`].
    ///
    /// # Errors
    /// [`KeplerError::InvalidArgument`] if the element counts differ.
    pub fn reshape(&self, shape: impl Into<Vec<usize>>) -> Result<Self, KeplerError> {
        Ok(match self {
            Self::F32(t) => Self::F32(t.reshape(shape)?),
            Self::F64(t) => Self::F64(t.reshape(shape)?),
        })
    }

    /// See [`Tensor::moveaxis`].
    ///
    /// # Errors
    /// [`KeplerError::InvalidArgument`] if either axis is out of range.
    pub fn moveaxis(&self, source: usize, destination: usize) -> Result<Self, KeplerError> {
        Ok(match self {
            Self::F32(t) => Self::F32(t.moveaxis(source, destination)?),
            Self::F64(t) => Self::F64(t.moveaxis(source, destination)?),
        })
    }

    /// See [`Tensor::index_axis`].
    ///
    /// # Errors
    /// [`KeplerError::InvalidArgument`] if the axis or index is out of range.
    pub fn index_axis(&self, axis: usize, index: usize) -> Result<Self, KeplerError> {
        Ok(match self {
            Self::F32(t) => Self::F32(t.index_axis(axis, index)?),
            Self::F64(t) => Self::F64(t.index_axis(axis, index)?),
        })
    }
}

impl From<Tensor<f32>> for Array {
    fn from(t: Tensor<f32>) -> Self {
        Self::F32(t)
    }
}

impl From<Tensor<f64>> for Array {
    fn from(t: Tensor<f64>) -> Self {
        Self::F64(t)
    }
}

/// Defines a tensor from nested literal arrays.
///
/// Supports arbitrary dimensionality as long as sublists are uniform in shape.
///
/// # Example
/// ```
/// use kepler_op::tensor;
/// let t = tensor!([[1.0, 2.0], [3.0, 4.0]]);
/// assert_eq!(t.shape, vec![2, 2]);
/// ```
#[macro_export]
macro_rules! tensor {
    ($lit:literal) => {
        $crate::tensors::Tensor::new(Vec::<usize>::new(), vec![$lit])
    };

    ([ $( $inner:tt ),+ $(,)? ]) => {{
        let children = vec![ $( $crate::tensor!($inner) ),+ ];
        let first_shape = &children[0].shape;
        assert!(children.iter().all(|c| c.shape == *first_shape),
            "ragged tensor literal (rows have mismatched shapes)");
        let mut shape = vec![children.len()];
        shape.extend_from_slice(first_shape);
        let mut data = Vec::with_capacity(children.len() * children[0].data.len());
        for c in children { data.extend(c.data); }
        $crate::tensors::Tensor::new(shape, data)
    }};
}
