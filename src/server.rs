//! Server side of the hint-compression protocol. The hint is decomposed
//! exactly once at construction; `hint_answer` is read-only and can be
//! served concurrently with itself.

use super::hint::{apply_hint, HintAnswer, HintDecomp, HintQuery};
use super::matrix::{Elem, Matrix};
use super::params::Context;
use super::pir::{Database, PirAnswer, PirQuery, PirServer};
use super::serialize::{Seed, SerializeError};

pub struct Server<'a, T: Elem> {
    ctx: &'a Context,
    pir_server: Option<PirServer<T>>,
    hint: HintDecomp<'a>,
}

impl<'a, T: Elem> Server<'a, T> {
    pub fn new(ctx: &'a Context, db: Database<T>, seed: &Seed) -> Self {
        let pir_server = PirServer::new_seeded(db, seed);
        let hint = HintDecomp::new(ctx, pir_server.hint());
        Self {
            ctx,
            pir_server: Some(pir_server),
            hint,
        }
    }

    /// Like `new`, but with the public matrix A assembled from per-shard
    /// seeds and row offsets.
    pub fn new_distributed(
        ctx: &'a Context,
        db: Database<T>,
        seeds: &[Seed],
        offsets: &[u64],
    ) -> Self {
        let pir_server = PirServer::new_seeded_distributed(db, seeds, offsets);
        let hint = HintDecomp::new(ctx, pir_server.hint());
        Self {
            ctx,
            pir_server: Some(pir_server),
            hint,
        }
    }

    /// A server that only applies a hint; it cannot answer outer-PIR
    /// queries.
    pub fn new_hint_only(ctx: &'a Context, hint: &Matrix<T>) -> Self {
        Self {
            ctx,
            pir_server: None,
            hint: HintDecomp::new(ctx, hint),
        }
    }

    pub fn hint_answer(&self, q: &HintQuery) -> Result<HintAnswer, SerializeError> {
        Ok(HintAnswer {
            matrix_rows: self.hint.hint_rows(),
            hint_cts: apply_hint(self.ctx, &self.hint, q)?,
        })
    }

    pub fn answer(&self, q: &PirQuery<T>) -> PirAnswer<T> {
        self.pir_server
            .as_ref()
            .expect("hint-only server cannot answer outer queries")
            .answer(q)
    }
}
