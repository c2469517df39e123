pub mod client;
pub mod hint;
pub mod limb;
pub mod lwe;
pub mod matrix;
pub mod params;
pub mod pir;
pub mod rlwe;
pub mod secret;
pub mod serialize;
pub mod server;
