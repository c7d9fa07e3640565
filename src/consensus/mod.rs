// Proof-of-work and chain validation rules

pub mod pow;
pub mod validation;

pub use pow::{Miner, MiningResult};
pub use validation::{is_chain_valid, validate_chain, validate_link, ValidationError};
