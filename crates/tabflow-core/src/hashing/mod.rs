//! Hashing de nombres derivados.

pub mod hash;

pub use hash::{hash_list, hash_str};
