pub mod hash;
pub mod merkle;

pub use hash::{sha256, vote_digest, Hash};
