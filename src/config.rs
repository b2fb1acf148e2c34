//! Tunable limits.
//!
//! Log verbosity is controlled separately through `RUST_LOG` (see [`crate::tracing`]).

use once_cell::sync::Lazy;
use serde::Deserialize;
use tracing::warn;

/// Default step bound for [`crate::lineage::closest`].
pub const DEFAULT_MAX_SEARCH_HEIGHT: usize = 256;

/// Weight given to scene edges created without an explicit weight.
pub const DEFAULT_WEIGHT: f64 = 1.0;

const MAX_SEARCH_HEIGHT_VAR: &str = "ACTOR_SCENE_MAX_SEARCH_HEIGHT";
const DEFAULT_WEIGHT_VAR: &str = "ACTOR_SCENE_DEFAULT_WEIGHT";

static PROCESS_LIMITS: Lazy<Limits> = Lazy::new(Limits::from_env);

/// Limits applied by lineage searches and scene graphs.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_search_height: usize,
    pub default_weight: f64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_search_height: DEFAULT_MAX_SEARCH_HEIGHT,
            default_weight: DEFAULT_WEIGHT,
        }
    }
}

impl Limits {
    /// Process-wide limits, read from the environment on first use.
    pub fn current() -> Limits {
        *PROCESS_LIMITS
    }

    /// Defaults overridden by `ACTOR_SCENE_MAX_SEARCH_HEIGHT` / `ACTOR_SCENE_DEFAULT_WEIGHT`.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut limits = Self::default();
        if let Ok(raw) = std::env::var(MAX_SEARCH_HEIGHT_VAR) {
            match raw.parse() {
                Ok(height) => limits.max_search_height = height,
                Err(e) => warn!(var = MAX_SEARCH_HEIGHT_VAR, %raw, error = %e, "Ignoring override"),
            }
        }
        if let Ok(raw) = std::env::var(DEFAULT_WEIGHT_VAR) {
            match raw.parse() {
                Ok(weight) => limits.default_weight = weight,
                Err(e) => warn!(var = DEFAULT_WEIGHT_VAR, %raw, error = %e, "Ignoring override"),
            }
        }
        limits
    }
}
