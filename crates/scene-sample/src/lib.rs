//! # Scene Sample
//!
//! Reference roles built on `actor-scene`'s public extension points only.
//!
//! - **[ping_pong]**: two roles composed into one actor
//! - **[soccer]**: an endless game of random passes inside a fully connected scene
//! - **[office]**: nested scenes sharing the same members
//!
//! The demo binary plays all three; run it with `RUST_LOG=info cargo run -p scene-sample`.

pub mod office;
pub mod ping_pong;
pub mod soccer;
