//! Client side of the hint-compression protocol.
//!
//! A session advances linearly: construct, `hint_query` (or `copy_secret`),
//! `hint_recover`, preprocess, then any number of queries. The recovered
//! `interm = H*s` is subtracted from every outer answer before decoding.

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use super::hint::{recover_hint_product, HintAnswer, HintQuery, KeyBlob};
use super::matrix::{Elem, Matrix};
use super::params::Context;
use super::pir::{DbInfo, PirAnswer, PirClient, PirQuery, PreprocessedQuery, PreprocessedQueryLhe};
use super::secret::encrypt_secret;
use super::serialize::{Seed, SerializeError};

pub struct Client<'a, T: Elem> {
    ctx: &'a Context,
    pir_client: PirClient<T>,

    inner_secret: Option<Matrix<T>>,
    outer_secret: Option<KeyBlob>,

    interm: Option<Matrix<T>>,
    sk: Option<PreprocessedQuery<T>>,
    sk_lhe: Option<PreprocessedQueryLhe<T>>,
}

impl<'a, T: Elem> Client<'a, T> {
    pub fn new(ctx: &'a Context, matrix_a_seed: &Seed, info: &DbInfo) -> Self {
        Self {
            ctx,
            pir_client: PirClient::new(matrix_a_seed, info),
            inner_secret: None,
            outer_secret: None,
            interm: None,
            sk: None,
            sk_lhe: None,
        }
    }

    pub fn new_distributed(
        ctx: &'a Context,
        matrix_a_seeds: &[Seed],
        offsets: &[u64],
        info: &DbInfo,
    ) -> Self {
        Self {
            ctx,
            pir_client: PirClient::new_distributed(matrix_a_seeds, offsets, info),
            inner_secret: None,
            outer_secret: None,
            interm: None,
            sk: None,
            sk_lhe: None,
        }
    }

    /// Generate a fresh LWE secret and encrypt it coordinate-wise under a
    /// fresh outer RLWE key.
    pub fn hint_query(&mut self) -> HintQuery {
        let mut rng = ChaCha20Rng::from_entropy();
        let inner = self.pir_client.generate_secret(&mut rng);
        let (outer, enc_sk) = encrypt_secret(self.ctx, &inner);
        self.inner_secret = Some(inner);
        self.outer_secret = Some(outer);
        enc_sk
    }

    fn inner_secret(&self) -> &Matrix<T> {
        self.inner_secret
            .as_ref()
            .expect("no secret yet: call hint_query or copy_secret first")
    }

    pub fn preprocess_query(&mut self) {
        self.sk = Some(
            self.pir_client
                .preprocess_query_given_secret(self.inner_secret()),
        );
    }

    pub fn preprocess_query_lhe(&mut self) {
        self.sk_lhe = Some(
            self.pir_client
                .preprocess_query_lhe_given_secret(self.inner_secret()),
        );
    }

    /// Recover H*s from the server's per-digit answer.
    pub fn hint_recover(&mut self, ans: &HintAnswer) -> Result<(), SerializeError> {
        let outer = self
            .outer_secret
            .as_ref()
            .expect("no outer key yet: call hint_query or copy_secret first");
        self.interm = Some(recover_hint_product(self.ctx, outer, ans)?);
        Ok(())
    }

    pub fn query(&self, idx: usize) -> PirQuery<T> {
        self.pir_client
            .query_preprocessed(idx, self.sk.as_ref().expect("call preprocess_query first"))
    }

    pub fn query_lhe(&self, msg: &Matrix<T>) -> PirQuery<T> {
        self.pir_client.query_lhe_preprocessed(
            msg,
            self.sk_lhe.as_ref().expect("call preprocess_query_lhe first"),
        )
    }

    fn corrected(&self, ans: &PirAnswer<T>) -> Matrix<T> {
        let interm = self.interm.as_ref().expect("call hint_recover first");
        let mut out = ans.answer.clone();
        out.sub(interm);
        out
    }

    pub fn recover(&self, ans: &PirAnswer<T>) -> Vec<u64> {
        self.pir_client.decode_many(&self.corrected(ans))
    }

    pub fn recover_lhe(&self, ans: &PirAnswer<T>) -> Matrix<T> {
        self.pir_client.decode_many_lhe(&self.corrected(ans))
    }

    pub fn security_param(&self) -> usize {
        self.pir_client.security_param()
    }
}

impl<'a> Client<'a, u64> {
    pub fn copy_secret(&mut self, other: &Client<'_, u64>) {
        self.inner_secret = other.inner_secret.clone();
        self.outer_secret = other.outer_secret.clone();
    }
}

impl<'a> Client<'a, u32> {
    /// Adopt a 64-bit client's secret: narrow to 32 bits and drop the last
    /// (dim64 - dim32) coordinates. The caller truncates its encrypted
    /// secret blob by the same amount. Narrowing to a larger security
    /// parameter is invalid.
    pub fn copy_secret(&mut self, other: &Client<'_, u64>) {
        assert!(
            other.security_param() >= self.security_param(),
            "cannot narrow to a larger security parameter"
        );
        let to_drop = other.security_param() - self.security_param();

        let mut small = other
            .inner_secret
            .as_ref()
            .expect("source client has no secret")
            .make32();
        small.drop_last_rows(to_drop);
        self.inner_secret = Some(small);
        self.outer_secret = other.outer_secret.clone();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::lwe::LweParams;
    use crate::pir::Database;
    use crate::server::Server;
    use crate::serialize::generate_secure_random_seed;

    fn run_lhe<T: Elem>(db_size: usize) {
        let ctx = Context::new();
        let mut rng = ChaCha20Rng::from_entropy();
        let seed = generate_secure_random_seed();

        let params = LweParams::fixed_p(1 << 10, 512);
        let db = Database::<T>::random(&mut rng, db_size, &params);
        let server = Server::new(&ctx, db.clone(), &seed);

        let mut client = Client::<T>::new(&ctx, &seed, &db.info);

        // token-generation phase
        let hq = client.hint_query();
        let hans = server.hint_answer(&hq).unwrap();
        client.hint_recover(&hans).unwrap();
        client.preprocess_query_lhe();

        // query phase
        let msg = Matrix::<T>::random(&mut rng, db.info.m, 1, db.info.p());
        let q = client.query_lhe(&msg);
        let ans = server.answer(&q);
        let got = client.recover_lhe(&ans);

        let mut expected = Matrix::mul(&db.data, &msg);
        expected.mod_const(T::from_u64(db.info.p()));
        assert_eq!(got, expected);
    }

    #[test]
    fn test_lhe_small_64() {
        run_lhe::<u64>(1 << 10);
    }

    #[test]
    fn test_lhe_small_32() {
        run_lhe::<u32>(1 << 10);
    }

    #[test]
    fn test_lhe_distributed() {
        let ctx = Context::new();
        let mut rng = ChaCha20Rng::from_entropy();
        let seeds = [generate_secure_random_seed(), generate_secure_random_seed()];

        let params = LweParams::fixed_p(1 << 10, 512);
        let db = Database::<u64>::random(&mut rng, 1 << 10, &params);
        // A split into two row bands, one per shard seed
        let offsets = [0u64, db.info.m as u64 / 2];
        let server = Server::new_distributed(&ctx, db.clone(), &seeds, &offsets);

        let mut client = Client::<u64>::new_distributed(&ctx, &seeds, &offsets, &db.info);

        let hq = client.hint_query();
        let hans = server.hint_answer(&hq).unwrap();
        client.hint_recover(&hans).unwrap();
        client.preprocess_query_lhe();

        let msg = Matrix::<u64>::random(&mut rng, db.info.m, 1, db.info.p());
        let q = client.query_lhe(&msg);
        let ans = server.answer(&q);
        let got = client.recover_lhe(&ans);

        let mut expected = Matrix::mul(&db.data, &msg);
        expected.mod_const(db.info.p());
        assert_eq!(got, expected);
    }

    fn run_pir<T: Elem>(db_size: usize) {
        let ctx = Context::new();
        let mut rng = ChaCha20Rng::from_entropy();
        let seed = generate_secure_random_seed();

        let params = LweParams::fixed_p(1 << 10, 512);
        let db = Database::<T>::random(&mut rng, db_size, &params);
        let server = Server::new(&ctx, db.clone(), &seed);

        let mut client = Client::<T>::new(&ctx, &seed, &db.info);

        let hq = client.hint_query();
        let hans = server.hint_answer(&hq).unwrap();
        client.hint_recover(&hans).unwrap();
        client.preprocess_query();

        let idx = 7usize;
        let q = client.query(idx);
        let ans = server.answer(&q);
        let msg = client.recover(&ans);

        for row in 0..msg.len() {
            assert_eq!(msg[row], db.get_elem(row * db.info.m + idx % db.info.m));
        }
    }

    #[test]
    fn test_pir_small_64() {
        run_pir::<u64>(1 << 10);
    }

    #[test]
    fn test_pir_small_32() {
        run_pir::<u32>(1 << 10);
    }

    #[test]
    fn test_lhe_mixed_precision() {
        let ctx = Context::new();
        let mut rng = ChaCha20Rng::from_entropy();
        let seed = generate_secure_random_seed();

        let params64 = LweParams::fixed_p(1 << 10, 512);
        let params32 = LweParams::fixed_p(896, 512);
        let db64 = Database::<u64>::random(&mut rng, 1 << 10, &params64);
        let db32 = Database::<u32>::random(&mut rng, 1 << 10, &params32);

        let server = Server::new(&ctx, db32.clone(), &seed);

        let mut client64 = Client::<u64>::new(&ctx, &seed, &db64.info);
        let mut client32 = Client::<u32>::new(&ctx, &seed, &db32.info);

        // token-generation phase: the 64-bit client's secret, truncated
        let mut hq = client64.hint_query();
        client32.copy_secret(&client64);
        let to_drop = db64.info.secret_dim() - db32.info.secret_dim();
        hq.truncate(hq.len() - to_drop);

        let hans = server.hint_answer(&hq).unwrap();
        client32.hint_recover(&hans).unwrap();
        client32.preprocess_query_lhe();

        // query phase
        let msg = Matrix::<u32>::random(&mut rng, db32.info.m, 1, db32.info.p());
        let q = client32.query_lhe(&msg);
        let ans = server.answer(&q);
        let got = client32.recover_lhe(&ans);

        let mut expected = Matrix::mul(&db32.data, &msg);
        expected.mod_const(db32.info.p() as u32);
        assert_eq!(got, expected);
    }
}
