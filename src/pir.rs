//! SimplePIR-style outer scheme over word-modulus LWE.
//!
//! The database is an ell x m matrix of values mod p. A query is the vector
//! A*s + e with the scaled selector (or LHE message) added in; the answer is
//! D times the query. The client removes D*A*s (obtained through the hint
//! protocol) and rounds. Everything here is the collaborator surface the
//! hint-compression layer is wired against.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use super::lwe::{expand_matrix_a, expand_matrix_a_distributed, sample_gaussian, LweParams};
use super::matrix::{Elem, Matrix};
use super::serialize::Seed;

#[derive(Clone, Debug)]
pub struct DbInfo {
    /// Database rows (ell).
    pub rows: usize,
    /// Database columns; also the number of LWE samples per query.
    pub m: usize,
    pub params: LweParams,
}

impl DbInfo {
    pub fn p(&self) -> u64 {
        self.params.p
    }

    pub fn secret_dim(&self) -> usize {
        self.params.n
    }
}

#[derive(Clone, Debug)]
pub struct Database<T: Elem> {
    pub info: DbInfo,
    pub data: Matrix<T>,
}

impl<T: Elem> Database<T> {
    /// Random database of `num_items` values mod p, laid out near-square.
    pub fn random(rng: &mut ChaCha20Rng, num_items: usize, params: &LweParams) -> Self {
        assert!(num_items > 0);
        let log2 = num_items.next_power_of_two().trailing_zeros() as usize;
        let m = 1usize << ((log2 + 1) / 2);
        let rows = (num_items + m - 1) / m;
        let data = Matrix::random(rng, rows, m, params.p);
        Self {
            info: DbInfo {
                rows,
                m,
                params: params.clone(),
            },
            data,
        }
    }

    /// Value of the i-th item under the row-major layout.
    pub fn get_elem(&self, i: usize) -> u64 {
        self.data.get(i / self.info.m, i % self.info.m).to_u64()
    }
}

#[derive(Clone, Debug)]
pub struct PirQuery<T: Elem> {
    pub query: Matrix<T>,
}

#[derive(Clone, Debug)]
pub struct PirAnswer<T: Elem> {
    pub answer: Matrix<T>,
}

/// Query-independent precomputation: A*s + e.
pub struct PreprocessedQuery<T: Elem> {
    masked: Matrix<T>,
}

pub struct PreprocessedQueryLhe<T: Elem> {
    masked: Matrix<T>,
}

pub struct PirClient<T: Elem> {
    info: DbInfo,
    a: Matrix<T>,
}

impl<T: Elem> PirClient<T> {
    pub fn new(seed: &Seed, info: &DbInfo) -> Self {
        let a = expand_matrix_a(seed, info.m, info.params.n);
        Self {
            info: info.clone(),
            a,
        }
    }

    pub fn new_distributed(seeds: &[Seed], offsets: &[u64], info: &DbInfo) -> Self {
        let a = expand_matrix_a_distributed(seeds, offsets, info.m, info.params.n);
        Self {
            info: info.clone(),
            a,
        }
    }

    pub fn security_param(&self) -> usize {
        self.info.params.n
    }

    /// Fresh ternary secret in {0, 1, 2}, as a column vector.
    pub fn generate_secret(&self, rng: &mut ChaCha20Rng) -> Matrix<T> {
        let mut s = Matrix::zeros(self.info.params.n, 1);
        for i in 0..s.rows() {
            s.set(i, 0, T::from_u64(rng.gen_range(0..3u64)));
        }
        s
    }

    fn masked(&self, s: &Matrix<T>) -> Matrix<T> {
        assert_eq!(s.rows(), self.info.params.n);
        assert_eq!(s.cols(), 1);
        let mut q = Matrix::mul(&self.a, s);
        let mut rng = ChaCha20Rng::from_entropy();
        for i in 0..q.rows() {
            let e = T::from_i64(sample_gaussian(&mut rng, self.info.params.noise_width));
            q.set(i, 0, q.get(i, 0).wrapping_add(e));
        }
        q
    }

    pub fn preprocess_query_given_secret(&self, s: &Matrix<T>) -> PreprocessedQuery<T> {
        PreprocessedQuery {
            masked: self.masked(s),
        }
    }

    pub fn preprocess_query_lhe_given_secret(&self, s: &Matrix<T>) -> PreprocessedQueryLhe<T> {
        PreprocessedQueryLhe {
            masked: self.masked(s),
        }
    }

    /// Select the column idx mod m.
    pub fn query_preprocessed(&self, idx: usize, pre: &PreprocessedQuery<T>) -> PirQuery<T> {
        let delta = T::from_u64(self.info.params.delta::<T>());
        let mut query = pre.masked.clone();
        let col = idx % self.info.m;
        query.set(col, 0, query.get(col, 0).wrapping_add(delta));
        PirQuery { query }
    }

    /// Encode an arbitrary message vector of length m, entries mod p.
    pub fn query_lhe_preprocessed(
        &self,
        msg: &Matrix<T>,
        pre: &PreprocessedQueryLhe<T>,
    ) -> PirQuery<T> {
        assert_eq!(msg.rows(), self.info.m);
        assert_eq!(msg.cols(), 1);
        let delta = T::from_u64(self.info.params.delta::<T>());
        let mut query = pre.masked.clone();
        for i in 0..msg.rows() {
            assert!(msg.get(i, 0).to_u64() < self.info.p());
            let scaled = delta.wrapping_mul(msg.get(i, 0));
            query.set(i, 0, query.get(i, 0).wrapping_add(scaled));
        }
        PirQuery { query }
    }

    fn decode_one(&self, v: T) -> u64 {
        let delta = self.info.params.delta::<T>();
        let centered = v.wrapping_add(T::from_u64(delta / 2));
        (centered.to_u64() / delta) % self.info.p()
    }

    /// Decode every row of an answer from which H*s has been subtracted.
    pub fn decode_many(&self, ans: &Matrix<T>) -> Vec<u64> {
        assert_eq!(ans.cols(), 1);
        (0..ans.rows()).map(|i| self.decode_one(ans.get(i, 0))).collect()
    }

    pub fn decode_many_lhe(&self, ans: &Matrix<T>) -> Matrix<T> {
        assert_eq!(ans.cols(), 1);
        let mut out = Matrix::zeros(ans.rows(), 1);
        for i in 0..ans.rows() {
            out.set(i, 0, T::from_u64(self.decode_one(ans.get(i, 0))));
        }
        out
    }
}

pub struct PirServer<T: Elem> {
    db: Database<T>,
    hint: Matrix<T>,
}

impl<T: Elem> PirServer<T> {
    pub fn new_seeded(db: Database<T>, seed: &Seed) -> Self {
        let a = expand_matrix_a(seed, db.info.m, db.info.params.n);
        let hint = Matrix::mul(&db.data, &a);
        Self { db, hint }
    }

    /// Server counterpart of a sharded A: the same seeds and row offsets the
    /// distributed client stitches its A from.
    pub fn new_seeded_distributed(db: Database<T>, seeds: &[Seed], offsets: &[u64]) -> Self {
        let a = expand_matrix_a_distributed(seeds, offsets, db.info.m, db.info.params.n);
        let hint = Matrix::mul(&db.data, &a);
        Self { db, hint }
    }

    /// The wide hint matrix H = D*A consumed by the decomposition.
    pub fn hint(&self) -> &Matrix<T> {
        &self.hint
    }

    pub fn answer(&self, q: &PirQuery<T>) -> PirAnswer<T> {
        assert_eq!(q.query.rows(), self.db.info.m);
        PirAnswer {
            answer: Matrix::mul(&self.db.data, &q.query),
        }
    }
}
