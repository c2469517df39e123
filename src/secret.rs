//! Ternary LWE-secret packaging: each coordinate of the secret is shipped in
//! its own squished RLWE ciphertext, slot 0 holding the value. One ciphertext
//! per coordinate keeps the server's inner product free of slot rotations;
//! the blob is sent once per session, so the size asymmetry is acceptable.

use super::matrix::{Elem, Matrix};
use super::params::Context;
use super::rlwe::Key;

/// Bounds on the entries of the inner secret. Ternary secrets, shifted to be
/// non-negative.
pub const SECRET_MIN: u64 = 0;
pub const SECRET_MAX: u64 = 2;

/// Re-interpret a value mod p in the symmetric residue system and cast it
/// into the wide word, wrapping. BFV plaintexts are signed around zero;
/// after the cast the outer matrix arithmetic continues mod 2^bits.
pub(crate) fn from_modulo_p<T: Elem>(p: u64, v: u64) -> T {
    assert!(v < p, "bad decrypted coefficient: {} >= {}", v, p);
    if v > p / 2 {
        T::from_i64(v as i64 - p as i64)
    } else {
        T::from_u64(v)
    }
}

/// Allocate a fresh outer key and encrypt every secret coordinate.
/// Returns the serialized key and one squished ciphertext per coordinate.
pub(crate) fn encrypt_secret<T: Elem>(
    ctx: &Context,
    inner_secret: &Matrix<T>,
) -> (Vec<u8>, Vec<Vec<u8>>) {
    assert_eq!(inner_secret.cols(), 1, "secret must be a column vector");
    assert!(
        ctx.p() > SECRET_MAX,
        "plaintext modulus too small to encode the secret"
    );

    let outer_secret = Key::new(ctx);

    let mut cts = Vec::with_capacity(inner_secret.rows());
    let mut vals = vec![0u64; ctx.n()];
    for i in 0..inner_secret.rows() {
        let v = inner_secret.get(i, 0).to_u64();
        assert!(
            (SECRET_MIN..=SECRET_MAX).contains(&v),
            "secret value {} at {} outside [{}, {}]",
            v,
            i,
            SECRET_MIN,
            SECRET_MAX
        );
        vals[0] = v;
        cts.push(outer_secret.encrypt_squished_slice(ctx, &vals));
    }

    (outer_secret.store(), cts)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::rlwe::{Ciphertext, Key};

    #[test]
    fn test_from_modulo_p() {
        let p = 163417u64;
        assert_eq!(from_modulo_p::<u64>(p, 0), 0);
        assert_eq!(from_modulo_p::<u64>(p, p / 2), p / 2);
        assert_eq!(from_modulo_p::<u64>(p, p - 1), u64::MAX); // -1
        assert_eq!(from_modulo_p::<u32>(p, p - 7), 0u32.wrapping_sub(7));
    }

    #[test]
    fn test_encrypt_secret_roundtrip() {
        let ctx = Context::new();
        let mut secret = Matrix::<u64>::zeros(5, 1);
        for i in 0..5 {
            secret.set(i, 0, (i as u64) % 3);
        }

        let (key_blob, cts) = encrypt_secret(&ctx, &secret);
        assert_eq!(cts.len(), 5);

        let key = Key::load(&ctx, &key_blob).unwrap();
        let mut vals = vec![0u64; ctx.n()];
        for (i, blob) in cts.iter().enumerate() {
            let ct = Ciphertext::load_squished(&ctx, blob).unwrap();
            key.decrypt(&ct).dump(&mut vals);
            assert_eq!(vals[0], (i as u64) % 3);
            assert!(vals[1..].iter().all(|&v| v == 0));
        }
    }
}
