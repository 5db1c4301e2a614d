use ndarray::{Array2, ArrayView2, ArrayViewMut2, Axis, Zip};
use serde::{Deserialize, Serialize};

/// Activation applied to the weighted sums of a dense layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActFn {
    Relu,
    /// Row-wise softmax, every row becomes a probability distribution.
    Softmax,
}

impl ActFn {
    /// Applies the activation to a batch of weighted sums.
    pub fn forward(&self, z: ArrayView2<f32>) -> Array2<f32> {
        match self {
            Self::Relu => z.mapv(|z| z.max(0.)),
            Self::Softmax => {
                let mut a = z.to_owned();
                for mut row in a.axis_iter_mut(Axis(0)) {
                    let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
                    row.mapv_inplace(|v| (v - max).exp());
                    let sum = row.sum();
                    row.mapv_inplace(|v| v / sum);
                }
                a
            }
        }
    }

    /// Turns the derivative with respect to the activations into the derivative with respect to
    /// the weighted sums, in place.
    ///
    /// # Arguments
    /// * `z` - The weighted sums of the forward pass.
    /// * `a` - The activations of the forward pass.
    /// * `d` - The incoming derivative, overwritten with the result.
    pub fn backward(&self, z: ArrayView2<f32>, a: ArrayView2<f32>, mut d: ArrayViewMut2<f32>) {
        match self {
            Self::Relu => {
                d.zip_mut_with(&z, |d, &z| {
                    if z <= 0. {
                        *d = 0.;
                    }
                });
            }
            Self::Softmax => {
                // Jacobian of softmax: da_i/dz_j = a_i (δ_ij - a_j).
                for (mut d_row, a_row) in d.axis_iter_mut(Axis(0)).zip(a.axis_iter(Axis(0))) {
                    let dot: f32 = Zip::from(&d_row).and(&a_row).fold(0., |acc, &d, &a| acc + d * a);
                    Zip::from(&mut d_row).and(&a_row).for_each(|d, &a| *d = a * (*d - dot));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn relu_clamps_negatives() {
        let a = ActFn::Relu.forward(array![[-1.0, 0.0, 2.5]].view());
        assert_eq!(a, array![[0.0, 0.0, 2.5]]);
    }

    #[test]
    fn softmax_rows_sum_to_one() {
        let a = ActFn::Softmax.forward(array![[1.0, 2.0, 3.0], [1000.0, 1000.0, 1000.0]].view());

        for row in a.axis_iter(Axis(0)) {
            assert!((row.sum() - 1.0).abs() < 1e-6);
        }
        assert!(a[[0, 2]] > a[[0, 1]] && a[[0, 1]] > a[[0, 0]]);
        assert!((a[[1, 0]] - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn relu_backward_masks_inactive_units() {
        let z = array![[-1.0, 0.5]];
        let a = ActFn::Relu.forward(z.view());
        let mut d = array![[3.0, 4.0]];
        ActFn::Relu.backward(z.view(), a.view(), d.view_mut());
        assert_eq!(d, array![[0.0, 4.0]]);
    }

    #[test]
    fn softmax_backward_matches_finite_differences() {
        let z = array![[0.2f32, -0.4, 1.1]];
        let a = ActFn::Softmax.forward(z.view());
        // d loss / d a for loss = a_0 + 2 a_1 + 3 a_2.
        let weights = array![[1.0f32, 2.0, 3.0]];
        let mut d = weights.clone();
        ActFn::Softmax.backward(z.view(), a.view(), d.view_mut());

        let loss = |z: &Array2<f32>| (ActFn::Softmax.forward(z.view()) * &weights).sum();
        let eps = 1e-3;
        for j in 0..3 {
            let mut plus = z.clone();
            plus[[0, j]] += eps;
            let mut minus = z.clone();
            minus[[0, j]] -= eps;
            let numeric = (loss(&plus) - loss(&minus)) / (2. * eps);
            assert!((numeric - d[[0, j]]).abs() < 1e-2, "column {j}");
        }
    }
}
