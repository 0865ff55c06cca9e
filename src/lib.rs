pub mod canonical;
pub mod cli;
pub mod config;
pub mod db;
pub mod diff;
pub mod error;
pub mod imdb;
mod metrics;
pub mod rank;
pub mod score;
pub mod server;
pub mod utils;

pub use canonical::{CanonicalBuffer, Canonicalizer};
pub use config::Opts;
pub use error::CompareError;
pub use imdb::{IMDB, IMDBBuilder};
pub use rank::Ranker;
