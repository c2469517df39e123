//! Wire formats for RLWE blobs.
//!
//! Three blob kinds cross the client/server boundary: full ciphertexts,
//! "squished" ciphertexts, and secret keys. Every blob starts with a header
//! that fingerprints the ring (degree, CRT moduli, plaintext modulus);
//! loading under a context with a different fingerprint is refused. The
//! squished form stores only the b-half of the ciphertext plus the 32-byte
//! seed that regenerates the pseudorandom a-half, so it is only valid
//! against the identical context that produced it.

use rand::{rngs::OsRng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use thiserror::Error;

use spiral_rs::params::Params;
use spiral_rs::poly::*;

use super::params::Context;
use super::rlwe::{Ciphertext, Key, Plaintext};

pub type Seed = [u8; 32];

pub fn generate_secure_random_seed() -> Seed {
    let mut seed = [0u8; 32];
    OsRng.fill_bytes(&mut seed);
    seed
}

const TAG_CIPHERTEXT: u8 = 0x43;
const TAG_SQUISHED: u8 = 0x53;
const TAG_KEY: u8 = 0x4b;

const FORM_COEFF: u8 = 0;
const FORM_NTT: u8 = 1;

#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("blob truncated: expected {expected} more bytes, got {got}")]
    Truncated { expected: usize, got: usize },

    #[error("unexpected blob tag {0:#04x}")]
    BadTag(u8),

    #[error("unknown ciphertext form tag {0:#04x}")]
    BadForm(u8),

    #[error("blob was produced under different ring parameters")]
    ContextMismatch,

    #[error("coefficient out of range for the ring modulus")]
    CoeffRange,

    #[error("secret key coefficient is not ternary")]
    KeyRange,
}

fn take(data: &[u8], n: usize) -> Result<(&[u8], &[u8]), SerializeError> {
    if data.len() < n {
        return Err(SerializeError::Truncated {
            expected: n,
            got: data.len(),
        });
    }
    Ok(data.split_at(n))
}

fn write_header(out: &mut Vec<u8>, tag: u8, params: &Params) {
    out.push(tag);
    out.extend_from_slice(&(params.poly_len as u32).to_le_bytes());
    out.push(params.crt_count as u8);
    for c in 0..params.crt_count {
        out.extend_from_slice(&params.moduli[c].to_le_bytes());
    }
    out.extend_from_slice(&params.pt_modulus.to_le_bytes());
}

fn read_header<'b>(
    data: &'b [u8],
    tag: u8,
    params: &Params,
) -> Result<&'b [u8], SerializeError> {
    let (first, _) = take(data, 1)?;
    if first[0] != tag {
        return Err(SerializeError::BadTag(first[0]));
    }
    let mut expected = Vec::new();
    write_header(&mut expected, tag, params);
    let (head, rest) = take(data, expected.len())?;
    if head != expected.as_slice() {
        return Err(SerializeError::ContextMismatch);
    }
    Ok(rest)
}

/// Bytes needed to hold one coefficient mod q.
fn modulus_bytes(params: &Params) -> usize {
    let bits = 64 - params.modulus.leading_zeros() as usize;
    (bits + 7) / 8
}

fn write_poly_coeff(out: &mut Vec<u8>, poly: &[u64], modulus: u64) {
    for &v in poly {
        out.extend_from_slice(&(v % modulus).to_le_bytes());
    }
}

fn read_poly_coeff(data: &[u8], params: &Params, poly: &mut [u64]) -> Result<(), SerializeError> {
    for (i, chunk) in data.chunks_exact(8).enumerate() {
        let v = u64::from_le_bytes(chunk.try_into().unwrap());
        if v >= params.modulus {
            return Err(SerializeError::CoeffRange);
        }
        poly[i] = v;
    }
    Ok(())
}

impl<'a> Ciphertext<'a> {
    /// Serialize in the current form; round-trip exact under `load`.
    pub fn store(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Ciphertext::Coeff(raw) => {
                write_header(&mut out, TAG_CIPHERTEXT, raw.params);
                out.push(FORM_COEFF);
                for row in 0..2 {
                    write_poly_coeff(&mut out, raw.get_poly(row, 0), raw.params.modulus);
                }
            }
            Ciphertext::Ntt(ntt) => {
                let params = ntt.params;
                write_header(&mut out, TAG_CIPHERTEXT, params);
                out.push(FORM_NTT);
                for row in 0..2 {
                    let poly = ntt.get_poly(row, 0);
                    for c in 0..params.crt_count {
                        for z in 0..params.poly_len {
                            let v = poly[c * params.poly_len + z] % params.moduli[c];
                            out.extend_from_slice(&(v as u32).to_le_bytes());
                        }
                    }
                }
            }
        }
        out
    }

    pub fn load(ctx: &'a Context, data: &[u8]) -> Result<Self, SerializeError> {
        let params = ctx.params();
        let rest = read_header(data, TAG_CIPHERTEXT, params)?;
        let (form, rest) = take(rest, 1)?;
        match form[0] {
            FORM_COEFF => {
                let mut raw = PolyMatrixRaw::zero(params, 2, 1);
                let (payload, _) = take(rest, 2 * params.poly_len * 8)?;
                for row in 0..2 {
                    let chunk = &payload[row * params.poly_len * 8..(row + 1) * params.poly_len * 8];
                    read_poly_coeff(chunk, params, raw.get_poly_mut(row, 0))?;
                }
                Ok(Ciphertext::Coeff(raw))
            }
            FORM_NTT => {
                let per_poly = params.crt_count * params.poly_len;
                let mut ntt = PolyMatrixNTT::zero(params, 2, 1);
                let (payload, _) = take(rest, 2 * per_poly * 4)?;
                for row in 0..2 {
                    let poly = ntt.get_poly_mut(row, 0);
                    let chunk = &payload[row * per_poly * 4..(row + 1) * per_poly * 4];
                    for (i, word) in chunk.chunks_exact(4).enumerate() {
                        let v = u32::from_le_bytes(word.try_into().unwrap()) as u64;
                        if v >= params.moduli[i / params.poly_len] {
                            return Err(SerializeError::CoeffRange);
                        }
                        poly[i] = v;
                    }
                }
                Ok(Ciphertext::Ntt(ntt))
            }
            other => Err(SerializeError::BadForm(other)),
        }
    }

    /// Load a squished ciphertext, regenerating the a-half from the stored
    /// seed. Requires the same context parameters as the writer.
    pub fn load_squished(ctx: &'a Context, data: &[u8]) -> Result<Self, SerializeError> {
        let params = ctx.params();
        let rest = read_header(data, TAG_SQUISHED, params)?;
        let (seed_bytes, rest) = take(rest, 32)?;
        let seed: Seed = seed_bytes.try_into().unwrap();

        let nb = modulus_bytes(params);
        let (payload, _) = take(rest, params.poly_len * nb)?;

        let mut rng_pub = ChaCha20Rng::from_seed(seed);
        let a = PolyMatrixRaw::random_rng(params, 1, 1, &mut rng_pub);

        let mut ct = PolyMatrixRaw::zero(params, 2, 1);
        ct.copy_into(&-&a, 0, 0);
        {
            let b = ct.get_poly_mut(1, 0);
            for (i, chunk) in payload.chunks_exact(nb).enumerate() {
                let mut word = [0u8; 8];
                word[..nb].copy_from_slice(chunk);
                let v = u64::from_le_bytes(word);
                if v >= params.modulus {
                    return Err(SerializeError::CoeffRange);
                }
                b[i] = v;
            }
        }
        Ok(Ciphertext::Coeff(ct))
    }
}

impl<'a> Key<'a> {
    pub fn store(&self) -> Vec<u8> {
        let params = self.sk.params;
        let q = params.modulus;
        let mut out = Vec::new();
        write_header(&mut out, TAG_KEY, params);
        for i in 0..params.poly_len {
            // centered trit + 1
            let v = self.sk.data[i];
            out.push(if v == q - 1 { 0 } else { (v + 1) as u8 });
        }
        out
    }

    pub fn load(ctx: &'a Context, data: &[u8]) -> Result<Self, SerializeError> {
        let params = ctx.params();
        let rest = read_header(data, TAG_KEY, params)?;
        let (payload, _) = take(rest, params.poly_len)?;
        let mut sk = PolyMatrixRaw::zero(params, 1, 1);
        for (i, &b) in payload.iter().enumerate() {
            sk.data[i] = match b {
                0 => params.modulus - 1,
                1 => 0,
                2 => 1,
                _ => return Err(SerializeError::KeyRange),
            };
        }
        Ok(Key::from_sk(ctx, sk))
    }

    /// Size-minimized encryption: the a-half is reproducible from the
    /// embedded seed, so only the b-half is stored.
    pub fn encrypt_squished(&self, pt: &Plaintext<'a>) -> Vec<u8> {
        let seed = generate_secure_random_seed();
        let mut rng = ChaCha20Rng::from_entropy();
        let mut rng_pub = ChaCha20Rng::from_seed(seed);
        let ct = self.encrypt_with_rngs(pt, &mut rng, &mut rng_pub);

        let params = ct.params;
        let nb = modulus_bytes(params);
        let mut out = Vec::new();
        write_header(&mut out, TAG_SQUISHED, params);
        out.extend_from_slice(&seed);
        for &v in ct.get_poly(1, 0) {
            out.extend_from_slice(&v.to_le_bytes()[..nb]);
        }
        out
    }

    pub fn encrypt_squished_slice(&self, ctx: &'a Context, vals: &[u64]) -> Vec<u8> {
        self.encrypt_squished(&Plaintext::from_vals(ctx, vals))
    }
}
