use std::time::Instant;

use clap::Parser;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use hintpir::client::Client;
use hintpir::lwe::LweParams;
use hintpir::matrix::Matrix;
use hintpir::params::Context;
use hintpir::pir::Database;
use hintpir::serialize::generate_secure_random_seed;
use hintpir::server::Server;

/// Run the hint-compression token phase and one LHE query against a random
/// database, printing sizes and timings.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Number of items in the database
    num_items: usize,
    /// LWE secret dimension (optional, default 1024)
    secret_dim: Option<usize>,
    /// Database plaintext modulus (optional, default 512, must be a power of two)
    db_modulus: Option<u64>,
    /// Verbose mode (optional)
    /// if set, the program will print debug logs to stderr.
    #[clap(long, short, action)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    let secret_dim = args.secret_dim.unwrap_or(1 << 10);
    let db_modulus = args.db_modulus.unwrap_or(512);

    println!(
        "Running the hint-compression round on a database of {} items (p = {}, secret dimension {}).",
        args.num_items, db_modulus, secret_dim
    );

    let ctx = Context::new();
    let mut rng = ChaCha20Rng::from_entropy();
    let seed = generate_secure_random_seed();

    let params = LweParams::fixed_p(secret_dim, db_modulus);
    let db = Database::<u64>::random(&mut rng, args.num_items, &params);

    let start = Instant::now();
    let server = Server::new(&ctx, db.clone(), &seed);
    println!("server setup (hint decomposition): {:?}", start.elapsed());

    let mut client = Client::<u64>::new(&ctx, &seed, &db.info);

    let start = Instant::now();
    let hq = client.hint_query();
    let hq_bytes: usize = hq.iter().map(|ct| ct.len()).sum();
    println!(
        "hint query: {:?} ({} ciphertexts, {} bytes)",
        start.elapsed(),
        hq.len(),
        hq_bytes
    );

    let start = Instant::now();
    let hans = server.hint_answer(&hq).expect("malformed hint query");
    let hans_bytes: usize = hans
        .hint_cts
        .iter()
        .flat_map(|cts| cts.iter().map(|ct| ct.len()))
        .sum();
    println!(
        "hint answer: {:?} ({} digits, {} bytes)",
        start.elapsed(),
        hans.hint_cts.len(),
        hans_bytes
    );

    let start = Instant::now();
    client.hint_recover(&hans).expect("malformed hint answer");
    client.preprocess_query_lhe();
    println!("hint recovery + preprocessing: {:?}", start.elapsed());

    let msg = Matrix::<u64>::random(&mut rng, db.info.m, 1, db.info.p());
    let start = Instant::now();
    let q = client.query_lhe(&msg);
    let ans = server.answer(&q);
    let got = client.recover_lhe(&ans);
    println!("LHE query round trip: {:?}", start.elapsed());

    let mut expected = Matrix::mul(&db.data, &msg);
    expected.mod_const(db.info.p());
    assert_eq!(got, expected, "recovered D*m does not match");
    println!("recovered (D*m) mod p correctly for all {} rows.", got.rows());
}
