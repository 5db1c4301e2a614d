use std::collections::HashMap;

use ndarray::{Array, Array2, ArrayD, ArrayViewD, Dimension, Ix2};

use crate::{ProtoErr, Result};

/// Named tensors, used both for the inputs fed to a graph and for the outputs it returns.
pub type Feed = HashMap<String, Tensor>;

/// A dense tensor value flowing in or out of a graph.
#[derive(Debug, Clone, PartialEq)]
pub enum Tensor {
    F32(ArrayD<f32>),
    U8(ArrayD<u8>),
}

impl Tensor {
    /// Returns the shape of the tensor.
    pub fn shape(&self) -> &[usize] {
        match self {
            Self::F32(a) => a.shape(),
            Self::U8(a) => a.shape(),
        }
    }

    /// Returns the name of the element type, for diagnostics.
    pub fn dtype(&self) -> &'static str {
        match self {
            Self::F32(_) => "f32",
            Self::U8(_) => "u8",
        }
    }

    /// Returns a view of the elements if this is a float tensor.
    pub fn as_f32(&self) -> Option<ArrayViewD<'_, f32>> {
        match self {
            Self::F32(a) => Some(a.view()),
            Self::U8(_) => None,
        }
    }

    /// Returns a view of the elements if this is a byte tensor.
    pub fn as_u8(&self) -> Option<ArrayViewD<'_, u8>> {
        match self {
            Self::U8(a) => Some(a.view()),
            Self::F32(_) => None,
        }
    }

    /// Converts the tensor into a float matrix of `width` columns.
    ///
    /// # Arguments
    /// * `what` - The name of the tensor, used in errors.
    /// * `width` - The expected amount of columns.
    ///
    /// # Returns
    /// The matrix or a shape mismatch if the tensor is not a `(batch, width)` float tensor.
    pub fn to_matrix(&self, what: &'static str, width: usize) -> Result<Array2<f32>> {
        let Self::F32(a) = self else {
            return Err(ProtoErr::ShapeMismatch {
                what,
                got: 0,
                expected: width,
            });
        };

        let matrix = a
            .view()
            .into_dimensionality::<Ix2>()
            .map_err(|_| ProtoErr::ShapeMismatch {
                what,
                got: a.ndim(),
                expected: 2,
            })?;

        if matrix.ncols() != width {
            return Err(ProtoErr::ShapeMismatch {
                what,
                got: matrix.ncols(),
                expected: width,
            });
        }

        Ok(matrix.to_owned())
    }
}

impl<D: Dimension> From<Array<f32, D>> for Tensor {
    fn from(value: Array<f32, D>) -> Self {
        Self::F32(value.into_dyn())
    }
}

impl<D: Dimension> From<Array<u8, D>> for Tensor {
    fn from(value: Array<u8, D>) -> Self {
        Self::U8(value.into_dyn())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array3, array};

    use super::*;

    #[test]
    fn to_matrix_checks_rank_and_width() {
        let t = Tensor::from(array![[1.0f32, 2.0, 3.0, 4.0]]);
        assert_eq!(t.to_matrix("input", 4).unwrap().dim(), (1, 4));

        assert!(matches!(
            t.to_matrix("input", 3),
            Err(ProtoErr::ShapeMismatch { got: 4, expected: 3, .. })
        ));

        let t = Tensor::from(array![1.0f32, 2.0]);
        assert!(matches!(
            t.to_matrix("input", 2),
            Err(ProtoErr::ShapeMismatch { got: 1, expected: 2, .. })
        ));
    }

    #[test]
    fn byte_tensors_are_not_matrices() {
        let t = Tensor::from(Array3::<u8>::zeros((2, 2, 3)));
        assert_eq!(t.dtype(), "u8");
        assert_eq!(t.shape(), [2, 2, 3]);
        assert!(t.as_f32().is_none());
        assert!(t.to_matrix("input", 3).is_err());
    }
}
