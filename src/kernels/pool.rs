use std::convert::TryFrom;
use std::fmt::Debug;

use failure::format_err;
use ndarray::{stack, Array3, Array4, ArrayView3, ArrayView4, Axis, ShapeError};
use num_traits::Zero;
use rayon::prelude::*;

use crate::common::types::{CError, CResult};

pub(crate) type Pool2 = (usize, usize);

/// How `upsample` routes an upstream gradient when several positions inside
/// a pooling window share the maximum value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TieBreak {
    /// Route only to the first-encountered maximum recorded during the
    /// forward pass (row-major scan order).
    FirstMax,
    /// Route the same upstream value to every tied position. This duplicates
    /// gradient mass on ties and exists only for compatibility with systems
    /// that resolve ties by value equality.
    AllMax,
}

impl TieBreak {
    const FIRST_MAX_STR: &'static str = "first_max";
    const ALL_MAX_STR: &'static str = "all_max";
}

impl TryFrom<&str> for TieBreak {
    type Error = CError;

    fn try_from(value: &str) -> CResult<TieBreak> {
        match value {
            Self::FIRST_MAX_STR => Ok(TieBreak::FirstMax),
            Self::ALL_MAX_STR => Ok(TieBreak::AllMax),
            s => Err(format_err!("Unknown tie-break value: `{}`", s)),
        }
    }
}

/// Non-overlapping max-pool of a single sample: windows of `pool` size with
/// stride equal to the window, no padding. Each window is scanned row-major;
/// the maximum starts from the first element and is replaced only on a
/// strict `>`, so ties keep the first-encountered value. The second result
/// records, per pooled cell, the flat in-window offset `s * pw + t` of that
/// maximum.
///
/// The caller guarantees the pool evenly divides the input (checked when the
/// layer configuration is validated).
pub(crate) fn downsample<A>(x: &ArrayView3<A>, pool: Pool2) -> (Array3<A>, Array3<usize>)
where
    A: Debug + Copy + PartialOrd + Zero,
{
    let (kn, hc, wc) = x.dim();
    let (ph, pw) = pool;
    let (hp, wp) = (hc / ph, wc / pw);
    let mut y = Array3::zeros((kn, hp, wp));
    let mut switches = Array3::zeros((kn, hp, wp));
    for k in 0..kn {
        for i in 0..hp {
            for j in 0..wp {
                let mut best = x[[k, ph * i, pw * j]];
                let mut switch = 0usize;
                for s in 0..ph {
                    for t in 0..pw {
                        let v = x[[k, ph * i + s, pw * j + t]];
                        if v > best {
                            best = v;
                            switch = s * pw + t;
                        }
                    }
                }
                y[[k, i, j]] = best;
                switches[[k, i, j]] = switch;
            }
        }
    }
    (y, switches)
}

/// Routes the upstream gradient back through the pooling step for a whole
/// minibatch. Every position that is not a selected maximum stays exactly
/// zero. Samples are independent and processed in parallel.
pub(crate) fn upsample<A>(
    acts: &ArrayView4<A>,
    pooled: &ArrayView4<A>,
    switches: &ArrayView4<usize>,
    grad: &ArrayView4<A>,
    pool: Pool2,
    tie_break: TieBreak,
) -> Result<Array4<A>, ShapeError>
where
    A: Debug + Copy + PartialEq + Zero + Send + Sync,
{
    let (n, kn, hp, wp) = grad.dim();
    let (ph, pw) = pool;
    let (hc, wc) = (hp * ph, wp * pw);
    let samples: Vec<Array3<A>> = (0..n)
        .into_par_iter()
        .map(|smp| {
            let act = acts.index_axis(Axis(0), smp);
            let y = pooled.index_axis(Axis(0), smp);
            let sw = switches.index_axis(Axis(0), smp);
            let g = grad.index_axis(Axis(0), smp);
            let mut dx = Array3::zeros((kn, hc, wc));
            for k in 0..kn {
                for i in 0..hp {
                    for j in 0..wp {
                        let gv = g[[k, i, j]];
                        match tie_break {
                            TieBreak::FirstMax => {
                                let offset = sw[[k, i, j]];
                                dx[[k, ph * i + offset / pw, pw * j + offset % pw]] = gv;
                            }
                            TieBreak::AllMax => {
                                for s in 0..ph {
                                    for t in 0..pw {
                                        if act[[k, ph * i + s, pw * j + t]] == y[[k, i, j]] {
                                            dx[[k, ph * i + s, pw * j + t]] = gv;
                                        }
                                    }
                                }
                            }
                        }
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
