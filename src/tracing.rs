//! # Observability & Tracing
//!
//! The substrate logs through the `tracing` crate with structured fields; it never
//! installs a subscriber on its own. Binaries call [`setup_tracing`] once at startup.
//!
//! ## What Gets Traced
//!
//! - **Dispatch**: one `debug` event per delivery, with `actor`, `message` and `kind`
//! - **Scenes**: `info` on activation, `debug` on deactivation and construction
//! - **Failures**: `warn` when a handler or an event listener fails
//! - **Configuration**: `warn` when an environment override cannot be parsed
//!
//! ## Usage
//!
//! ```bash
//! # Scene activations only
//! RUST_LOG=info cargo run -p scene-sample
//!
//! # Every delivery
//! RUST_LOG=debug cargo run -p scene-sample
//!
//! # Just the substrate
//! RUST_LOG=actor_scene=debug cargo run -p scene-sample
//! ```
//!
//! With `RUST_LOG=debug` a soccer game reads like:
//!
//! ```text
//! INFO Enter scene scene=soccer_game_0190f1c2... depth=1
//! DEBUG Receive actor=soccer_player_0190f1c2... message=ball_pass_0190f1c3... kind="ball_pass"
//! DEBUG Receive actor=soccer_player_0190f1c4... message=ball_pass_0190f1c5... kind="ball_pass"
//! DEBUG Exit scene scene=soccer_game_0190f1c2... depth=0
//! ```

/// Installs a compact `fmt` subscriber filtered by `RUST_LOG`.
///
/// Panics if a global subscriber is already set; call it once, from `main`.
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false) // actor/message ids already say where an event came from
        .compact()
        .init();
}
