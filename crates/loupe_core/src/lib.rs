//! # Loupe Core
//!
//! GPU-independent building blocks shared by the Loupe crates:
//!
//! - [`hash`]: fixed-secret 64-bit content hash used for cache keys
//! - [`compress`]: self-describing block compression for cached blobs
//! - [`parallel`]: blocking index fan-out with a sequential fallback
//! - [`errors`]: the [`LoupeError`] taxonomy

pub mod compress;
pub mod errors;
pub mod hash;
pub mod parallel;

pub use errors::{LoupeError, Result};
pub use hash::{ContentHasher, hash_data};
pub use parallel::{DispatchStrategy, Dispatcher};
