//! Decomposition of the PIR hint into RLWE plaintexts, homomorphic
//! application against the encrypted secret, and client-side recovery.
//!
//! The hint is split two ways: each wide entry into 4-bit digits (only the
//! top `NUM_LIMBS_*` digits are kept; lower digits sit entirely below the
//! outer decoder's bit window), and the rows into chunks of N that fill the
//! slots of one plaintext. The server computes, per digit and per row-chunk,
//! the NTT-domain inner product of the digit plaintexts with the encrypted
//! secret coordinates.

use std::time::Instant;

use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::limb::{digit, weight, BITS_PER_LIMB, NUM_LIMBS_32, NUM_LIMBS_64};
use super::matrix::{Elem, Matrix};
use super::params::Context;
use super::rlwe::{inner_product, Ciphertext, Key, Plaintext};
use super::secret::from_modulo_p;
use super::serialize::SerializeError;

/// Worker shards per digit in the applier.
pub const PARALLELISM: usize = 64;

pub type KeyBlob = Vec<u8>;
pub type CipherBlob = Vec<u8>;

/// One squished ciphertext per LWE-secret coordinate.
pub type HintQuery = Vec<CipherBlob>;

/// Per-digit bundles of serialized ciphertexts, digit-major then
/// row-chunk-major. `matrix_rows` lets the client trim the final chunk.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HintAnswer {
    pub matrix_rows: usize,
    pub hint_cts: Vec<Vec<CipherBlob>>,
}

pub(crate) fn num_limbs(bits: usize) -> usize {
    match bits {
        32 => NUM_LIMBS_32,
        64 => NUM_LIMBS_64,
        _ => panic!("unsupported hint element width: {}", bits),
    }
}

/// The decomposed hint: for each retained digit, one NTT plaintext per
/// (row-chunk, column) pair. Built once per server, immutable afterwards.
pub struct HintDecomp<'a> {
    hint_rows: usize,
    rows: usize,
    cols: usize,
    pts: Vec<Vec<Plaintext<'a>>>,
}

impl<'a> HintDecomp<'a> {
    pub fn new<T: Elem>(ctx: &'a Context, hint: &Matrix<T>) -> Self {
        let n = ctx.n();
        let rows = (hint.rows() + n - 1) / n;
        let cols = hint.cols();
        let max_limbs = T::BITS / BITS_PER_LIMB;
        let limbs = num_limbs(T::BITS);

        let start = Instant::now();
        let pts = (0..limbs)
            .map(|b| Self::plaintexts_for_digit(ctx, hint, max_limbs - b - 1))
            .collect();
        debug!(
            "decomposed {}x{} hint into {} digits in {:?}",
            hint.rows(),
            cols,
            limbs,
            start.elapsed()
        );

        Self {
            hint_rows: hint.rows(),
            rows,
            cols,
            pts,
        }
    }

    fn plaintexts_for_digit<T: Elem>(
        ctx: &'a Context,
        hint: &Matrix<T>,
        index: usize,
    ) -> Vec<Plaintext<'a>> {
        let n = ctx.n();
        let rows = (hint.rows() + n - 1) / n;
        let cols = hint.cols();

        let mut out = Vec::with_capacity(rows * cols);
        let mut vals = vec![0u64; n];
        for r in 0..rows {
            for c in 0..cols {
                for (i, v) in vals.iter_mut().enumerate() {
                    let row = r * n + i;
                    *v = if row < hint.rows() {
                        digit(hint.get(row, c).to_u64(), index)
                    } else {
                        0
                    };
                }
                let mut pt = Plaintext::from_vals(ctx, &vals);
                pt.to_ntt();
                out.push(pt);
            }
        }
        out
    }

    /// Number of row-chunks.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// LWE secret dimension this decomposition expects.
    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn hint_rows(&self) -> usize {
        self.hint_rows
    }

    pub fn limbs(&self) -> usize {
        self.pts.len()
    }
}

// Read-only view handed to the worker pool. The spiral buffers behind the
// plaintexts and ciphertexts hold raw pointers but are never written during
// application.
struct ApplyView<'a, 'b> {
    enc_sk: &'b [Ciphertext<'a>],
    pts: &'b [Plaintext<'a>],
    cols: usize,
}

unsafe impl Sync for ApplyView<'_, '_> {}

/// Homomorphically compute H*s digit-wise. `enc_sk` holds one squished
/// ciphertext per hint column.
pub fn apply_hint<'a>(
    ctx: &'a Context,
    d: &HintDecomp<'a>,
    enc_sk: &[CipherBlob],
) -> Result<Vec<Vec<CipherBlob>>, SerializeError> {
    assert_eq!(
        enc_sk.len(),
        d.cols,
        "wrong number of encrypted secret values"
    );

    let mut cts = Vec::with_capacity(enc_sk.len());
    for blob in enc_sk {
        let mut ct = Ciphertext::load_squished(ctx, blob)?;
        ct.to_ntt();
        cts.push(ct);
    }

    let mut out = Vec::with_capacity(d.limbs());
    for b in 0..d.limbs() {
        out.push(apply_hint_once(d, &cts, b));
    }
    Ok(out)
}

fn apply_hint_once<'a>(
    d: &HintDecomp<'a>,
    enc_sk: &[Ciphertext<'a>],
    b: usize,
) -> Vec<CipherBlob> {
    let rows = d.rows;
    let view = ApplyView {
        enc_sk,
        pts: &d.pts[b],
        cols: d.cols,
    };

    let rows_per_shard = (rows + PARALLELISM - 1) / PARALLELISM;
    let mut out: Vec<CipherBlob> = vec![Vec::new(); rows];

    let start = Instant::now();
    out.par_chunks_mut(rows_per_shard)
        .enumerate()
        .for_each(|(shard, slots)| {
            let base = shard * rows_per_shard;
            for (off, slot) in slots.iter_mut().enumerate() {
                let i = base + off;
                let ct = inner_product(view.enc_sk, &view.pts[i * view.cols..(i + 1) * view.cols]);
                *slot = ct.store();
            }
        });
    debug!("applied digit {} in {:?}", b, start.elapsed());

    out
}

/// Client side: decrypt the per-digit bundles and recombine with positional
/// weights into the integer column vector H*s.
pub fn recover_hint_product<T: Elem>(
    ctx: &Context,
    outer_secret: &KeyBlob,
    ans: &HintAnswer,
) -> Result<Matrix<T>, SerializeError> {
    let key = Key::load(ctx, outer_secret)?;
    let max_limbs = T::BITS / BITS_PER_LIMB;
    assert_eq!(ans.hint_cts.len(), num_limbs(T::BITS));

    let mut out = Matrix::<T>::zeros(ans.matrix_rows, 1);
    for (b, cts) in ans.hint_cts.iter().enumerate() {
        let mut part = recover_once::<T>(ctx, &key, ans.matrix_rows, cts)?;
        part.mul_const(T::from_u64(weight(max_limbs - b - 1)));
        out.add(&part);
    }
    Ok(out)
}

fn recover_once<'a, T: Elem>(
    ctx: &'a Context,
    key: &Key<'a>,
    matrix_rows: usize,
    cts: &[CipherBlob],
) -> Result<Matrix<T>, SerializeError> {
    let n = ctx.n();
    let p = ctx.p();
    let mut out = Matrix::zeros(matrix_rows, 1);
    let mut vals = vec![0u64; n];

    for (i, blob) in cts.iter().enumerate() {
        let mut ct = Ciphertext::load(ctx, blob)?;
        if ct.is_ntt() {
            ct.from_ntt();
        }
        key.decrypt(&ct).dump(&mut vals);
        for (j, &v) in vals.iter().enumerate() {
            let row = i * n + j;
            if row >= matrix_rows {
                break;
            }
            out.set(row, 0, from_modulo_p(p, v));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::secret::encrypt_secret;
    use crate::server::Server;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha20Rng;

    // Reference computation with the same limb truncation the protocol uses.
    fn truncated_product<T: Elem>(hint: &Matrix<T>, s: &Matrix<T>) -> Matrix<T> {
        let max_limbs = T::BITS / BITS_PER_LIMB;
        let limbs = num_limbs(T::BITS);
        let mut out = Matrix::<T>::zeros(hint.rows(), 1);
        for r in 0..hint.rows() {
            let mut acc = T::default();
            for b in 0..limbs {
                let k = max_limbs - b - 1;
                let mut part = 0u64;
                for c in 0..hint.cols() {
                    part += digit(hint.get(r, c).to_u64(), k) * s.get(c, 0).to_u64();
                }
                acc = acc.wrapping_add(T::from_u64(part).wrapping_mul(T::from_u64(weight(k))));
            }
            out.set(r, 0, acc);
        }
        out
    }

    fn run_hint_protocol<T: Elem>(hint_rows: usize, cols: usize) {
        let ctx = Context::new();
        let mut rng = ChaCha20Rng::seed_from_u64(17);

        let hint = Matrix::<T>::random(&mut rng, hint_rows, cols, 0);
        let mut s = Matrix::<T>::zeros(cols, 1);
        for i in 0..cols {
            s.set(i, 0, T::from_u64(rng.gen_range(0..3u64)));
        }

        let (key_blob, enc_sk) = encrypt_secret(&ctx, &s);
        let server = Server::new_hint_only(&ctx, &hint);
        let ans = server.hint_answer(&enc_sk).unwrap();
        assert_eq!(ans.matrix_rows, hint_rows);

        let got = recover_hint_product::<T>(&ctx, &key_blob, &ans).unwrap();
        assert_eq!(got, truncated_product(&hint, &s));
    }

    #[test]
    fn test_hint_protocol_64() {
        // three row-chunks, last one partial
        run_hint_protocol::<u64>(2 * 2048 + 37, 32);
    }

    #[test]
    fn test_hint_protocol_32() {
        run_hint_protocol::<u32>(300, 48);
    }

    #[test]
    fn test_apply_idempotent() {
        let ctx = Context::new();
        let mut rng = ChaCha20Rng::seed_from_u64(23);

        let hint = Matrix::<u64>::random(&mut rng, 500, 16, 0);
        let mut s = Matrix::<u64>::zeros(16, 1);
        for i in 0..16 {
            s.set(i, 0, rng.gen_range(0..3u64));
        }

        let (_key_blob, enc_sk) = encrypt_secret(&ctx, &s);
        let server = Server::new_hint_only(&ctx, &hint);
        let once = server.hint_answer(&enc_sk).unwrap();
        let twice = server.hint_answer(&enc_sk).unwrap();
        assert_eq!(once.matrix_rows, twice.matrix_rows);
        assert_eq!(once.hint_cts, twice.hint_cts);
    }
}
