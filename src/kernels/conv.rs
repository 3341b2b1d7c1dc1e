use std::fmt::Debug;
use std::ops::{Add, Mul};

use ndarray::{stack, Array1, Array3, Array4, ArrayView3, ArrayView4, Axis, ShapeError};
use num_traits::Zero;
use rayon::prelude::*;

/// Sliding-window cross-correlation of a single sample with every kernel,
/// plus the per-kernel bias:
///
/// `out[k][i][j] = sum over (c, s, t) of w[k][c][s][t] * x[c][i+s][j+t] + b[k]`
///
/// The kernel is not flipped. Shapes are the caller's responsibility; the
/// layer validates them before dispatching here.
pub(crate) fn convolve<A>(
    input: &ArrayView3<A>,
    weights: &Array4<A>,
    bias: &Array1<A>,
) -> Array3<A>
where
    A: Debug + Copy + Add<Output = A> + Mul<Output = A> + Zero,
{
    let (kn, ch, kh, kw) = weights.dim();
    let (_, h, w) = input.dim();
    let (hc, wc) = (h - kh + 1, w - kw + 1);
    let mut out = Array3::zeros((kn, hc, wc));
    for k in 0..kn {
        for i in 0..hc {
            for j in 0..wc {
                let mut acc = A::zero();
                for c in 0..ch {
                    for s in 0..kh {
                        for t in 0..kw {
                            acc = acc + weights[[k, c, s, t]] * input[[c, i + s, j + t]];
                        }
                    }
                }
                out[[k, i, j]] = acc + bias[k];
            }
        }
    }
    out
}

/// Accumulates the weight and bias gradients over the whole minibatch:
///
/// `gb[k] = sum over (n, i, j) of delta[n][k][i][j]`
/// `gw[k][c][s][t] = sum over (n, i, j) of delta[n][k][i][j] * x[n][c][i+s][j+t]`
///
/// `delta` is the local gradient (upstream gradient times activation
/// derivative) at convolution-output resolution. Samples are independent, so
/// per-sample partial sums run in parallel and are reduced afterwards.
pub(crate) fn grad_params<A>(
    inputs: &ArrayView4<A>,
    delta: &ArrayView4<A>,
) -> (Array4<A>, Array1<A>)
where
    A: Debug + Copy + Add<Output = A> + Mul<Output = A> + Zero + Send + Sync,
{
    let (n, ch, h, w) = inputs.dim();
    let (_, kn, hc, wc) = delta.dim();
    let (kh, kw) = (h - hc + 1, w - wc + 1);
    (0..n)
        .into_par_iter()
        .map(|smp| {
            let x = inputs.index_axis(Axis(0), smp);
            let d = delta.index_axis(Axis(0), smp);
            let mut gw = Array4::zeros((kn, ch, kh, kw));
            let mut gb = Array1::zeros(kn);
            for k in 0..kn {
                for i in 0..hc {
                    for j in 0..wc {
                        let dv = d[[k, i, j]];
                        gb[k] = gb[k] + dv;
                        for c in 0..ch {
                            for s in 0..kh {
                                for t in 0..kw {
                                    gw[[k, c, s, t]] =
                                        gw[[k, c, s, t]] + dv * x[[c, i + s, j + t]];
                                }
                            }
                        }
                    }
                }
            }
            (gw, gb)
        })
        .reduce(
            || (Array4::zeros((kn, ch, kh, kw)), Array1::zeros(kn)),
            |(wa, ba), (wb, bb)| (wa + wb, ba + bb),
        )
}

/// Gradient propagated to the layer input, the full correlation of the local
/// gradient with the weights:
///
/// `dx[n][c][i][j] = sum over (k, s, t) of
///     delta[n][k][i-(kh-1)-s][j-(kw-1)-t] * w[k][c][s][t]`
///
/// Terms whose shifted index falls outside the convolved map contribute
/// nothing; there is no wraparound and no padding. The reversed-index
/// arithmetic is load-bearing and must not be "fixed" into a plain
/// convolution.
pub(crate) fn grad_input<A>(
    delta: &ArrayView4<A>,
    weights: &Array4<A>,
    image_size: (usize, usize),
) -> Result<Array4<A>, ShapeError>
where
    A: Debug + Copy + Add<Output = A> + Mul<Output = A> + Zero + Send + Sync,
{
    let (n, _, hc, wc) = delta.dim();
    let (kn, ch, kh, kw) = weights.dim();
    let (h, w) = image_size;
    let samples: Vec<Array3<A>> = (0..n)
        .into_par_iter()
        .map(|smp| {
            let d = delta.index_axis(Axis(0), smp);
            let mut dx = Array3::zeros((ch, h, w));
            for c in 0..ch {
                for i in 0..h {
                    for j in 0..w {
                        let mut acc = A::zero();
                        for k in 0..kn {
                            for s in 0..kh {
                                for t in 0..kw {
                                    let di = i as isize - (kh as isize - 1) - s as isize;
                                    let dj = j as isize - (kw as isize - 1) - t as isize;
                                    if di >= 0
                                        && dj >= 0
                                        && (di as usize) < hc
                                        && (dj as usize) < wc
                                    {
                                        acc = acc
                                            + d[[k, di as usize, dj as usize]]
                                                * weights[[k, c, s, t]];
                                    }
                                }
                            }
                        }
                        dx[[c, i, j]] = acc;
                    }
                }
            }
            dx
        })
        .collect();
    stack(
        Axis(0),
        samples
            .iter()
            .map(|a| a.view())
            .collect::<Vec<ArrayView3<A>>>()
            .as_slice(),
    )
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn test_convolve_matches_hand_computed_cross_correlation() {
        let input = array![[
            [1.0, 2.0, 3.0],
            [4.0, 5.0, 6.0],
            [7.0, 8.0, 9.0]
        ]];
        // diagonal-sum kernel: out = x[i][j] + x[i+1][j+1] + bias
        let weights = array![[[1.0, 0.0], [0.0, 1.0]]].insert_axis(Axis(0));
        let bias = array![0.5];
        let out = convolve(&input.view(), &weights, &bias);
        assert_eq!(out, array![[[6.5, 8.5], [12.5, 14.5]]]);
    }

    #[test]
    fn test_convolve_sums_over_channels() {
        let input = array![
            [[1.0, 2.0], [3.0, 4.0]],
            [[5.0, 6.0], [7.0, 8.0]]
        ];
        let weights = array![[[1.0]], [[2.0]]].insert_axis(Axis(0));
        let bias = array![0.0];
        let out = convolve(&input.view(), &weights, &bias);
        assert_eq!(out, array![[[11.0, 14.0], [17.0, 20.0]]]);
    }

    #[test]
    fn test_grad_params_accumulates_over_batch_and_positions() {
        let inputs = array![
            [[1.0, 2.0], [3.0, 4.0]],
            [[5.0, 6.0], [7.0, 8.0]]
        ]
        .insert_axis(Axis(1));
        let delta = Array4::from_elem((2, 1, 2, 2), 1.0);
        let (gw, gb) = grad_params(&inputs.view(), &delta.view());
        assert_eq!(gw, Array4::from_elem((1, 1, 1, 1), 36.0));
        assert_eq!(gb, array![8.0]);
    }

    #[test]
    fn test_grad_params_weighs_inputs_by_local_gradient() {
        let inputs = array![[[1.0, 2.0], [3.0, 4.0]]].insert_axis(Axis(0));
        let delta = array![[[2.0, 0.0], [0.0, 1.0]]].insert_axis(Axis(0));
        let (gw, gb) = grad_params(&inputs.view(), &delta.view());
        // 2x2 input, 1x1 kernel: gw = 2 * x00 + 1 * x11
        assert_eq!(gw, Array4::from_elem((1, 1, 1, 1), 6.0));
        assert_eq!(gb, array![3.0]);
    }

    #[test]
    fn test_grad_input_scales_by_unit_kernel() {
        let delta = array![[[1.0, 2.0], [3.0, 4.0]]].insert_axis(Axis(0));
        let weights = Array4::from_elem((1, 1, 1, 1), 3.0);
        let dx = grad_input(&delta.view(), &weights, (2, 2)).unwrap();
        assert_eq!(dx, array![[[3.0, 6.0], [9.0, 12.0]]].insert_axis(Axis(0)));
    }

    #[test]
    fn test_grad_input_applies_reversed_index_correlation() {
        // 2x2 image, 2x2 kernel: convolved map is a single cell. The only
        // surviving term is s = i - 1, t = j - 1, so the upstream value
        // lands at (1, 1) scaled by w[0][0].
        let delta = Array4::from_elem((1, 1, 1, 1), 2.0);
        let weights = array![[[1.0, 2.0], [3.0, 4.0]]].insert_axis(Axis(0));
        let dx = grad_input(&delta.view(), &weights, (2, 2)).unwrap();
        assert_eq!(dx, array![[[0.0, 0.0], [0.0, 2.0]]].insert_axis(Axis(0)));
    }

    #[test]
    fn test_grad_input_sums_over_kernels() {
        let delta = array![
            [[1.0, 1.0], [1.0, 1.0]],
            [[2.0, 2.0], [2.0, 2.0]]
        ]
        .insert_axis(Axis(0));
        let weights = array![[[1.0]], [[10.0]]].insert_axis(Axis(1));
        let dx = grad_input(&delta.view(), &weights, (2, 2)).unwrap();
        assert_eq!(dx, array![[[21.0, 21.0], [21.0, 21.0]]].insert_axis(Axis(0)));
    }
}
