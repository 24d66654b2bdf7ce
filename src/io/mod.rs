//! Reading fields out of API documents and writing them back to disk.
//!
//! - field extraction from raw API documents (`normalize`)
//! - raw document dumps to JSON (`export`)

pub mod export;
pub mod normalize;

pub use export::*;
pub use normalize::*;
