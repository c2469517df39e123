//! RLWE ring parameters.
//!
//! The ring is fixed at build time: degree-2048 negacyclic ring over two
//! NTT-friendly CRT primes, with a prime plaintext modulus chosen so that
//! q1*q2 = 1 (mod p). The latter makes BFV plaintext multiplication exact up
//! to the noise term: the scaling factor q/p divides q - 1, so reduction of
//! the scaled message never introduces a wrap proportional to p.

use log::debug;
use serde_json::Value;

use spiral_rs::params::*;

pub static DEFAULT_MODULI: [u64; 2] = [268369921u64, 247730177u64];
const DEF_MOD_STR: &str = "[\"268369921\", \"247730177\"]";

/// Plaintext modulus. Prime, larger than 2^17, and the product of
/// `DEFAULT_MODULI` is congruent to 1 modulo it.
pub const PT_MODULUS: u64 = 163417;

pub const POLY_LEN: usize = 2048;
pub const NOISE_WIDTH: f64 = 6.4;

fn params_from_json(json_str: &str) -> Params {
    let v: Value = serde_json::from_str(json_str).unwrap();

    let n = v["n"].as_u64().unwrap() as usize;
    let db_dim_1 = v["nu_1"].as_u64().unwrap() as usize;
    let db_dim_2 = v["nu_2"].as_u64().unwrap() as usize;
    let instances = v["instances"].as_u64().unwrap_or(1) as usize;
    let p = v["p"].as_u64().unwrap();
    let q2_bits = v["q2_bits"].as_u64().unwrap();
    let t_gsw = v["t_gsw"].as_u64().unwrap() as usize;
    let t_conv = v["t_conv"].as_u64().unwrap() as usize;
    let t_exp_left = v["t_exp_left"].as_u64().unwrap() as usize;
    let t_exp_right = v["t_exp_right"].as_u64().unwrap() as usize;
    let do_expansion = v.get("direct_upload").is_none();
    let db_item_size = v["db_item_size"].as_u64().unwrap_or(0) as usize;

    let poly_len = v["poly_len"].as_u64().unwrap_or(2048) as usize;
    let moduli = v["moduli"]
        .as_array()
        .map(|x| {
            x.as_slice()
                .iter()
                .map(|y| {
                    y.as_u64()
                        .unwrap_or_else(|| y.as_str().unwrap().parse().unwrap())
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or(DEFAULT_MODULI.to_vec());
    let noise_width = v["noise_width"].as_f64().unwrap_or(NOISE_WIDTH);

    Params::init(
        poly_len,
        &moduli,
        noise_width,
        n,
        p,
        q2_bits,
        t_conv,
        t_exp_left,
        t_exp_right,
        t_gsw,
        do_expansion,
        db_dim_1,
        db_dim_2,
        instances,
        db_item_size,
    )
}

/// The single supported RLWE parameter set.
pub fn rlwe_params() -> Params {
    params_from_json(&format!(
        r#"
        {{
            "n": 1,
            "nu_1": 1,
            "nu_2": 1,
            "p": {},
            "q2_bits": 28,
            "t_gsw": 3,
            "t_conv": 4,
            "t_exp_left": 2,
            "t_exp_right": 2,
            "instances": 1,
            "db_item_size": 8,
            "direct_upload": true,
            "poly_len": {},
            "moduli": {},
            "noise_width": {}
        }}
        "#,
        PT_MODULUS, POLY_LEN, DEF_MOD_STR, NOISE_WIDTH
    ))
}

/// Process-wide RLWE context. Immutable once built; plaintexts, ciphertexts
/// and keys all borrow from exactly one context.
pub struct Context {
    params: Params,
}

impl Context {
    pub fn new() -> Self {
        let params = rlwe_params();
        assert_eq!(params.modulus % params.pt_modulus, 1);
        debug!(
            "rlwe context: n={}, log2(q)={:.1}, p={}",
            params.poly_len,
            (params.modulus as f64).log2(),
            params.pt_modulus
        );
        Self { params }
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Ring degree (slots per plaintext).
    pub fn n(&self) -> usize {
        self.params.poly_len
    }

    /// Plaintext modulus.
    pub fn p(&self) -> u64 {
        self.params.pt_modulus
    }

    /// Composed ciphertext modulus q.
    pub fn modulus(&self) -> u64 {
        self.params.modulus
    }

    /// BFV scaling factor floor(q / p).
    pub fn delta(&self) -> u64 {
        self.params.modulus / self.params.pt_modulus
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
