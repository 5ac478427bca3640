//! Exhaustive integer-offset search.
//!
//! The reference patch is slid over every allowed offset inside the
//! candidate and scored with the normalised cross-correlation
//! `sum(a b) / sqrt(sum(a^2) sum(b^2))`, restricted to voxels finite in both
//! (and selected by the optional mask).

use rayon::prelude::*;
use voxcorr_core::{Mask, Volume};

use crate::config::PixelSearchConfig;
use crate::error::{RegistrationError, Result};

/// Best offset of a discrete search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelSearchResult {
    /// Position of the reference origin inside the candidate (ZYX), NaN when no offset fits.
    pub displacement: [f64; 3],
    /// Correlation score at that offset, 0 when no offset fits.
    pub score: f64,
}

impl PixelSearchResult {
    fn not_found() -> Self {
        Self {
            displacement: [f64::NAN; 3],
            score: 0.0,
        }
    }

    /// True when an offset was evaluated.
    pub fn is_found(&self) -> bool {
        self.displacement.iter().all(|d| d.is_finite())
    }
}

/// Search `candidate` for the offset that best matches `reference`.
///
/// A candidate smaller than the reference on any axis is not an error: the
/// result carries a NaN displacement and a zero score.
pub fn pixel_search(
    reference: &Volume,
    candidate: &Volume,
    config: &PixelSearchConfig,
    mask: Option<&Mask>,
) -> Result<PixelSearchResult> {
    if let Some(mask) = mask {
        if mask.shape() != reference.shape() {
            return Err(RegistrationError::ShapeMismatch {
                expected: reference.shape().to_vec(),
                actual: mask.shape().to_vec(),
            });
        }
    }
    let (r, c) = (reference.shape(), candidate.shape());
    if (0..3).any(|axis| c[axis] < r[axis]) {
        tracing::debug!("candidate {:?} smaller than reference {:?}", c, r);
        return Ok(PixelSearchResult::not_found());
    }

    let mut ranges = [(0i64, 0i64); 3];
    for axis in 0..3 {
        let [lo, hi] = config.search_range[axis];
        if lo > hi {
            return Err(RegistrationError::invalid_configuration(format!(
                "search range {:?} on axis {} is empty",
                config.search_range[axis], axis
            )));
        }
        let limit = (c[axis] - r[axis]) as i64;
        ranges[axis] = (lo.max(0), hi.min(limit));
        if ranges[axis].0 > ranges[axis].1 {
            return Ok(PixelSearchResult::not_found());
        }
    }

    let offsets: Vec<[usize; 3]> = (ranges[0].0..=ranges[0].1)
        .flat_map(|z| {
            (ranges[1].0..=ranges[1].1).flat_map(move |y| {
                (ranges[2].0..=ranges[2].1).map(move |x| [z as usize, y as usize, x as usize])
            })
        })
        .collect();

    let best = offsets
        .par_iter()
        .enumerate()
        .map(|(order, &offset)| (order, offset, score_at(reference, candidate, mask, offset)))
        .reduce_with(|a, b| {
            if b.2 > a.2 || (b.2 == a.2 && b.0 < a.0) {
                b
            } else {
                a
            }
        });

    Ok(match best {
        Some((_, offset, score)) => PixelSearchResult {
            displacement: [offset[0] as f64, offset[1] as f64, offset[2] as f64],
            score,
        },
        None => PixelSearchResult::not_found(),
    })
}

fn score_at(
    reference: &Volume,
    candidate: &Volume,
    mask: Option<&Mask>,
    offset: [usize; 3],
) -> f64 {
    let [nz, ny, nx] = reference.shape();
    let (mut ab, mut aa, mut bb) = (0.0f64, 0.0f64, 0.0f64);
    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                if mask.is_some_and(|m| !m.get(z, y, x)) {
                    continue;
                }
                let a = reference.get(z, y, x);
                let b = candidate.get(z + offset[0], y + offset[1], x + offset[2]);
                if a.is_finite() && b.is_finite() {
                    let (a, b) = (a as f64, b as f64);
                    ab += a * b;
                    aa += a * a;
                    bb += b * b;
                }
            }
        }
    }
    let denominator = (aa * bb).sqrt();
    if denominator > 0.0 {
        ab / denominator
    } else {
        0.0
    }
}
