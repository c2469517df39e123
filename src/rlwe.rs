//! BFV-style symmetric RLWE over the spiral-rs lattice kernel.
//!
//! Ciphertexts are the 2x1 Regev layout (row 0 holds -a, row 1 holds
//! a*s + e + delta*m), so decryption is the single matrix product
//! [s | 1] * ct. Plaintexts and ciphertexts carry an explicit form tag
//! (coefficient or NTT); binary operations require matching tags.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use spiral_rs::discrete_gaussian::DiscreteGaussian;
use spiral_rs::params::Params;
use spiral_rs::poly::*;

use super::params::Context;

pub(crate) fn add_raw_into(res: &mut PolyMatrixRaw, a: &PolyMatrixRaw) {
    assert!(res.rows == a.rows && res.cols == a.cols);
    let modulus = res.params.modulus;
    let res_slc = res.data.as_mut_slice();
    let a_slc = a.data.as_slice();
    for (x, y) in res_slc.iter_mut().zip(a_slc.iter()) {
        *x = (*x + *y) % modulus;
    }
}

pub(crate) fn add_ntt_into(res: &mut PolyMatrixNTT, a: &PolyMatrixNTT) {
    assert!(res.rows == a.rows && res.cols == a.cols);
    let params = res.params;
    for i in 0..res.rows {
        for j in 0..res.cols {
            let res_poly = res.get_poly_mut(i, j);
            let a_poly = a.get_poly(i, j);
            for c in 0..params.crt_count {
                let modulus = params.moduli[c];
                for z in 0..params.poly_len {
                    let idx = c * params.poly_len + z;
                    res_poly[idx] = (res_poly[idx] + a_poly[idx]) % modulus;
                }
            }
        }
    }
}

fn clone_raw<'a>(a: &PolyMatrixRaw<'a>) -> PolyMatrixRaw<'a> {
    let mut out = PolyMatrixRaw::zero(a.params, a.rows, a.cols);
    out.copy_into(a, 0, 0);
    out
}

fn clone_ntt<'a>(a: &PolyMatrixNTT<'a>) -> PolyMatrixNTT<'a> {
    let mut out = PolyMatrixNTT::zero(a.params, a.rows, a.cols);
    out.copy_into(a, 0, 0);
    out
}

/// A degree-N polynomial with coefficients in `[0, p)`, in coefficient or
/// NTT evaluation form.
pub enum Plaintext<'a> {
    Coeff(PolyMatrixRaw<'a>),
    Ntt(PolyMatrixNTT<'a>),
}

impl<'a> Plaintext<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Plaintext::Coeff(PolyMatrixRaw::zero(ctx.params(), 1, 1))
    }

    /// Write all N coefficients; values must already be reduced mod p.
    pub fn set(&mut self, ctx: &'a Context, vals: &[u64]) {
        assert_eq!(vals.len(), ctx.n());
        let mut raw = PolyMatrixRaw::zero(ctx.params(), 1, 1);
        for (i, &v) in vals.iter().enumerate() {
            assert!(v < ctx.p(), "plaintext coefficient out of range");
            raw.data[i] = v;
        }
        *self = Plaintext::Coeff(raw);
    }

    pub fn from_vals(ctx: &'a Context, vals: &[u64]) -> Self {
        let mut pt = Self::new(ctx);
        pt.set(ctx, vals);
        pt
    }

    /// Copy the coefficients out; requires coefficient form.
    pub fn dump(&self, vals: &mut [u64]) {
        let raw = self.as_raw();
        let n = raw.params.poly_len;
        assert!(vals.len() >= n);
        vals[..n].copy_from_slice(&raw.data.as_slice()[..n]);
        for v in vals[n..].iter_mut() {
            *v = 0;
        }
    }

    pub fn is_ntt(&self) -> bool {
        matches!(self, Plaintext::Ntt(_))
    }

    pub fn to_ntt(&mut self) {
        let converted = match &*self {
            Plaintext::Coeff(raw) => Plaintext::Ntt(raw.ntt()),
            Plaintext::Ntt(_) => panic!("plaintext is already in NTT form"),
        };
        *self = converted;
    }

    pub fn from_ntt(&mut self) {
        let converted = match &*self {
            Plaintext::Ntt(ntt) => Plaintext::Coeff(ntt.raw()),
            Plaintext::Coeff(_) => panic!("plaintext is already in coefficient form"),
        };
        *self = converted;
    }

    pub(crate) fn as_raw(&self) -> &PolyMatrixRaw<'a> {
        match self {
            Plaintext::Coeff(raw) => raw,
            Plaintext::Ntt(_) => panic!("plaintext is in NTT form"),
        }
    }

    pub(crate) fn as_ntt(&self) -> &PolyMatrixNTT<'a> {
        match self {
            Plaintext::Ntt(ntt) => ntt,
            Plaintext::Coeff(_) => panic!("plaintext is in coefficient form"),
        }
    }
}

impl Clone for Plaintext<'_> {
    fn clone(&self) -> Self {
        match self {
            Plaintext::Coeff(raw) => Plaintext::Coeff(clone_raw(raw)),
            Plaintext::Ntt(ntt) => Plaintext::Ntt(clone_ntt(ntt)),
        }
    }
}

/// A BFV ciphertext: the pair (c0, c1) as a 2x1 polynomial matrix. Both
/// polynomials always share the same form tag.
pub enum Ciphertext<'a> {
    Coeff(PolyMatrixRaw<'a>),
    Ntt(PolyMatrixNTT<'a>),
}

impl<'a> Ciphertext<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Ciphertext::Coeff(PolyMatrixRaw::zero(ctx.params(), 2, 1))
    }

    pub fn is_ntt(&self) -> bool {
        matches!(self, Ciphertext::Ntt(_))
    }

    pub fn to_ntt(&mut self) {
        let converted = match &*self {
            Ciphertext::Coeff(raw) => Ciphertext::Ntt(raw.ntt()),
            Ciphertext::Ntt(_) => panic!("ciphertext is already in NTT form"),
        };
        *self = converted;
    }

    pub fn from_ntt(&mut self) {
        let converted = match &*self {
            Ciphertext::Ntt(ntt) => Ciphertext::Coeff(ntt.raw()),
            Ciphertext::Coeff(_) => panic!("ciphertext is already in coefficient form"),
        };
        *self = converted;
    }

    /// Component-wise addition; both operands must share a form tag.
    pub fn add(&mut self, other: &Ciphertext<'a>) {
        match (self, other) {
            (Ciphertext::Coeff(a), Ciphertext::Coeff(b)) => add_raw_into(a, b),
            (Ciphertext::Ntt(a), Ciphertext::Ntt(b)) => add_ntt_into(a, b),
            _ => panic!("ciphertext form mismatch in add"),
        }
    }

    /// Plaintext-ciphertext multiplication. In NTT form this is slotwise;
    /// in coefficient form the product round-trips through the NTT. The
    /// operand forms must match.
    pub fn mul_plain(&mut self, pt: &Plaintext<'a>) {
        let product = match (&*self, pt) {
            (Ciphertext::Ntt(ct), Plaintext::Ntt(p)) => {
                Ciphertext::Ntt(scalar_multiply_alloc(p, ct))
            }
            (Ciphertext::Coeff(ct), Plaintext::Coeff(p)) => {
                Ciphertext::Coeff(scalar_multiply_alloc(&p.ntt(), &ct.ntt()).raw())
            }
            _ => panic!("ciphertext/plaintext form mismatch in mul_plain"),
        };
        *self = product;
    }

    pub(crate) fn as_ntt(&self) -> &PolyMatrixNTT<'a> {
        match self {
            Ciphertext::Ntt(ntt) => ntt,
            Ciphertext::Coeff(_) => panic!("ciphertext is in coefficient form"),
        }
    }
}

impl Clone for Ciphertext<'_> {
    fn clone(&self) -> Self {
        match self {
            Ciphertext::Coeff(raw) => Ciphertext::Coeff(clone_raw(raw)),
            Ciphertext::Ntt(ntt) => Ciphertext::Ntt(clone_ntt(ntt)),
        }
    }
}

/// Fused multiply-accumulate: sum of cts[i] * pts[i], all operands in NTT
/// form. A single running accumulator avoids one ciphertext allocation per
/// term; the result is left in NTT form.
pub fn inner_product<'a>(cts: &[Ciphertext<'a>], pts: &[Plaintext<'a>]) -> Ciphertext<'a> {
    assert_eq!(cts.len(), pts.len(), "inner product length mismatch");
    assert!(!cts.is_empty());

    let mut acc = scalar_multiply_alloc(pts[0].as_ntt(), cts[0].as_ntt());
    for (ct, pt) in cts.iter().zip(pts.iter()).skip(1) {
        let term = scalar_multiply_alloc(pt.as_ntt(), ct.as_ntt());
        add_ntt_into(&mut acc, &term);
    }
    Ciphertext::Ntt(acc)
}

/// Symmetric RLWE secret key: a ternary ring element, used for both
/// encryption and decryption.
pub struct Key<'a> {
    params: &'a Params,
    pub(crate) sk: PolyMatrixRaw<'a>,
    sk_ntt: PolyMatrixNTT<'a>,
    sk_full_ntt: PolyMatrixNTT<'a>,
    dg: DiscreteGaussian,
}

impl<'a> Key<'a> {
    /// Sample a fresh ternary secret.
    pub fn new(ctx: &'a Context) -> Self {
        let params = ctx.params();
        let mut rng = ChaCha20Rng::from_entropy();
        let mut sk = PolyMatrixRaw::zero(params, 1, 1);
        for i in 0..params.poly_len {
            sk.data[i] = match rng.gen_range(0..3u32) {
                0 => 0,
                1 => 1,
                _ => params.modulus - 1,
            };
        }
        Self::from_sk(ctx, sk)
    }

    pub(crate) fn from_sk(ctx: &'a Context, sk: PolyMatrixRaw<'a>) -> Self {
        let params = ctx.params();
        let sk_ntt = sk.ntt();
        // decryption row [s | 1]
        let mut sk_full = PolyMatrixRaw::zero(params, 1, 2);
        sk_full.copy_into(&sk, 0, 0);
        sk_full.copy_into(&PolyMatrixRaw::identity(params, 1, 1), 0, 1);
        let sk_full_ntt = sk_full.ntt();
        Self {
            params,
            sk,
            sk_ntt,
            sk_full_ntt,
            dg: DiscreteGaussian::init(params.noise_width),
        }
    }

    /// ct = (-a, a*s + e + delta*m), coefficient form. The public polynomial
    /// a is drawn from `rng_pub` so that seeded callers can reproduce it.
    pub(crate) fn encrypt_with_rngs(
        &self,
        pt: &Plaintext<'a>,
        rng: &mut ChaCha20Rng,
        rng_pub: &mut ChaCha20Rng,
    ) -> PolyMatrixRaw<'a> {
        let params = self.params;
        let pt_raw = pt.as_raw();

        let a = PolyMatrixRaw::random_rng(params, 1, 1, rng_pub);
        let e = PolyMatrixRaw::noise(params, 1, 1, &self.dg, rng);

        let delta = params.modulus / params.pt_modulus;
        let mut scaled = PolyMatrixRaw::zero(params, 1, 1);
        for i in 0..params.poly_len {
            let m = pt_raw.data[i];
            debug_assert!(m < params.pt_modulus);
            scaled.data[i] = ((m as u128 * delta as u128) % params.modulus as u128) as u64;
        }

        let b_p = &self.sk_ntt * &a.ntt();
        let b = &(&e.ntt() + &b_p) + &scaled.ntt();

        let mut ct = PolyMatrixRaw::zero(params, 2, 1);
        ct.copy_into(&-&a, 0, 0);
        ct.copy_into(&b.raw(), 1, 0);
        ct
    }

    /// Standard BFV symmetric encryption; output form tag is coefficient.
    pub fn encrypt(&self, pt: &Plaintext<'a>) -> Ciphertext<'a> {
        let mut rng = ChaCha20Rng::from_entropy();
        let mut rng_pub = ChaCha20Rng::from_entropy();
        Ciphertext::Coeff(self.encrypt_with_rngs(pt, &mut rng, &mut rng_pub))
    }

    pub fn encrypt_slice(&self, ctx: &'a Context, vals: &[u64]) -> Ciphertext<'a> {
        self.encrypt(&Plaintext::from_vals(ctx, vals))
    }

    /// BFV decryption; requires coefficient form, returns a coefficient-form
    /// plaintext with values reduced to `[0, p)`.
    pub fn decrypt(&self, ct: &Ciphertext<'a>) -> Plaintext<'a> {
        let ct_raw = match ct {
            Ciphertext::Coeff(raw) => raw,
            Ciphertext::Ntt(_) => panic!("decrypt requires coefficient form"),
        };
        let dec = &self.sk_full_ntt * &ct_raw.ntt();
        let dec_raw = dec.raw();

        let params = self.params;
        let q = params.modulus as u128;
        let p = params.pt_modulus as u128;
        let mut out = PolyMatrixRaw::zero(params, 1, 1);
        for i in 0..params.poly_len {
            let v = dec_raw.data[i] as u128;
            out.data[i] = (((v * p + q / 2) / q) % p) as u64;
        }
        Plaintext::Coeff(out)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::params::Context;
    use rand::SeedableRng;

    fn ramp(ctx: &Context) -> Vec<u64> {
        (0..ctx.n() as u64).map(|i| i % ctx.p()).collect()
    }

    #[test]
    fn test_encrypt_decrypt() {
        let ctx = Context::new();
        let key = Key::new(&ctx);
        let vals = ramp(&ctx);

        let ct = key.encrypt_slice(&ctx, &vals);
        let pt = key.decrypt(&ct);

        let mut got = vec![0u64; ctx.n()];
        pt.dump(&mut got);
        assert_eq!(got, vals);
    }

    #[test]
    fn test_encrypt_decrypt_ntt_roundtrip() {
        let ctx = Context::new();
        let key = Key::new(&ctx);
        let vals = ramp(&ctx);

        let mut ct = key.encrypt_slice(&ctx, &vals);
        ct.to_ntt();
        ct.from_ntt();
        let pt = key.decrypt(&ct);

        let mut got = vec![0u64; ctx.n()];
        pt.dump(&mut got);
        assert_eq!(got, vals);
    }

    #[test]
    fn test_plaintext_ntt_roundtrip() {
        let ctx = Context::new();
        let vals = ramp(&ctx);
        let mut pt = Plaintext::from_vals(&ctx, &vals);
        pt.to_ntt();
        pt.from_ntt();
        let mut got = vec![0u64; ctx.n()];
        pt.dump(&mut got);
        assert_eq!(got, vals);
    }

    #[test]
    fn test_homomorphic_add() {
        let ctx = Context::new();
        let key = Key::new(&ctx);
        let a = ramp(&ctx);
        let b: Vec<u64> = (0..ctx.n() as u64).map(|i| (7 * i + 3) % ctx.p()).collect();

        let mut ct = key.encrypt_slice(&ctx, &a);
        let ct_b = key.encrypt_slice(&ctx, &b);
        ct.add(&ct_b);

        let mut got = vec![0u64; ctx.n()];
        key.decrypt(&ct).dump(&mut got);
        for i in 0..ctx.n() {
            assert_eq!(got[i], (a[i] + b[i]) % ctx.p());
        }
    }

    #[test]
    fn test_mul_plain_coeff() {
        let ctx = Context::new();
        let key = Key::new(&ctx);

        // ct encrypts the constant 7
        let mut vals = vec![0u64; ctx.n()];
        vals[0] = 7;
        let mut ct = key.encrypt_slice(&ctx, &vals);

        let pt = Plaintext::from_vals(&ctx, &ramp(&ctx));
        ct.mul_plain(&pt);

        let mut got = vec![0u64; ctx.n()];
        key.decrypt(&ct).dump(&mut got);
        for i in 0..ctx.n() as u64 {
            assert_eq!(got[i as usize], (i * 7) % ctx.p());
        }
    }

    #[test]
    fn test_mul_plain_ntt() {
        let ctx = Context::new();
        let key = Key::new(&ctx);

        let mut vals = vec![0u64; ctx.n()];
        vals[0] = 2;
        let mut ct = key.encrypt_slice(&ctx, &vals);
        ct.to_ntt();

        let pvals: Vec<u64> = (0..ctx.n() as u64).map(|i| i % 3).collect();
        let mut pt = Plaintext::from_vals(&ctx, &pvals);
        pt.to_ntt();

        ct.mul_plain(&pt);
        ct.from_ntt();

        let mut got = vec![0u64; ctx.n()];
        key.decrypt(&ct).dump(&mut got);
        for i in 0..ctx.n() as u64 {
            assert_eq!(got[i as usize], ((i % 3) * 2) % ctx.p());
        }
    }

    #[test]
    fn test_inner_product_matches_explicit() {
        let ctx = Context::new();
        let key = Key::new(&ctx);
        let mut rng = rand_chacha::ChaCha20Rng::seed_from_u64(99);

        let l = 1527;
        let mut cts = Vec::with_capacity(l);
        let mut pts = Vec::with_capacity(l);
        let mut expected = vec![0u64; ctx.n()];

        let mut c = vec![0u64; ctx.n()];
        c[0] = 10;
        for _ in 0..l {
            let p: Vec<u64> = (0..ctx.n()).map(|_| rng.gen_range(0..2u64)).collect();
            for j in 0..ctx.n() {
                expected[j] = (expected[j] + 10 * p[j]) % ctx.p();
            }
            cts.push(key.encrypt_slice(&ctx, &c));
            pts.push(Plaintext::from_vals(&ctx, &p));
        }

        // explicit mul_plain + add, in coefficient form
        let mut acc = cts[0].clone();
        acc.mul_plain(&pts[0]);
        for (ct, pt) in cts.iter().zip(pts.iter()).skip(1) {
            let mut term = ct.clone();
            term.mul_plain(pt);
            acc.add(&term);
        }
        let mut explicit = vec![0u64; ctx.n()];
        key.decrypt(&acc).dump(&mut explicit);

        // fused, in NTT form
        for ct in cts.iter_mut() {
            ct.to_ntt();
        }
        for pt in pts.iter_mut() {
            pt.to_ntt();
        }
        let mut fused_ct = inner_product(&cts, &pts);
        fused_ct.from_ntt();
        let mut fused = vec![0u64; ctx.n()];
        key.decrypt(&fused_ct).dump(&mut fused);

        assert_eq!(explicit, expected);
        assert_eq!(fused, expected);
    }
}
