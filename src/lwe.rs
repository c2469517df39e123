//! LWE parameters and public-matrix expansion for the outer PIR scheme.
//!
//! The LWE modulus is the full machine word of the element type, so the
//! scaling factor for database plaintexts is exactly 2^bits / p and all
//! arithmetic wraps.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use super::matrix::{Elem, Matrix};
use super::serialize::Seed;

pub const LWE_NOISE_WIDTH: f64 = 6.4;

#[derive(Clone, Debug)]
pub struct LweParams {
    /// Secret dimension.
    pub n: usize,
    /// Database plaintext modulus; must be a power of two so that the
    /// scaling factor divides the word modulus exactly.
    pub p: u64,
    pub noise_width: f64,
}

impl LweParams {
    pub fn fixed_p(n: usize, p: u64) -> Self {
        assert!(p.is_power_of_two());
        Self {
            n,
            p,
            noise_width: LWE_NOISE_WIDTH,
        }
    }

    /// Scaling factor 2^bits / p for element type T.
    pub fn delta<T: Elem>(&self) -> u64 {
        ((1u128 << T::BITS) / self.p as u128) as u64
    }
}

/// Rounded Box-Muller sample from a centered Gaussian of the given width.
pub(crate) fn sample_gaussian<R: Rng>(rng: &mut R, width: f64) -> i64 {
    let u1: f64 = 1.0 - rng.gen::<f64>(); // (0, 1], keeps ln finite
    let u2: f64 = rng.gen();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    (z * width).round() as i64
}

/// Expand the public matrix A from a single PRG seed.
pub fn expand_matrix_a<T: Elem>(seed: &Seed, rows: usize, cols: usize) -> Matrix<T> {
    let mut rng = ChaCha20Rng::from_seed(*seed);
    Matrix::random(&mut rng, rows, cols, 0)
}

/// Expand A from per-shard seeds; `offsets[i]` is the first row filled from
/// `seeds[i]`, and each shard extends to the next offset (or the end).
pub fn expand_matrix_a_distributed<T: Elem>(
    seeds: &[Seed],
    offsets: &[u64],
    rows: usize,
    cols: usize,
) -> Matrix<T> {
    assert_eq!(seeds.len(), offsets.len());
    assert!(!seeds.is_empty());
    assert_eq!(offsets[0], 0, "first shard must start at row 0");

    let mut out = Matrix::zeros(rows, cols);
    for (i, seed) in seeds.iter().enumerate() {
        let start = offsets[i] as usize;
        let stop = if i + 1 < offsets.len() {
            offsets[i + 1] as usize
        } else {
            rows
        };
        assert!(start <= stop && stop <= rows, "shard offsets out of order");

        let mut rng = ChaCha20Rng::from_seed(*seed);
        let band = Matrix::<T>::random(&mut rng, stop - start, cols, 0);
        for r in start..stop {
            for c in 0..cols {
                out.set(r, c, band.get(r - start, c));
            }
        }
    }
    out
}
