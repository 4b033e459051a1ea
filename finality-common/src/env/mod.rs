pub mod block;
pub mod bp;
pub mod receipt;
pub mod vote;
