//! Token-budgeted history for the whole world or a single actor.

pub mod actor;
pub mod clean;
pub mod decay;
pub mod world;

pub use actor::build_actor_memory;
pub use decay::{decay_step, is_round_kept, qualifies_for_actor};
pub use world::build_world_memory;

/// Estimated tokens kept free below the caller's limit.
pub const TOKEN_HEADROOM: usize = 4000;

/// Label used when image annotations are appended to memory lines.
pub const IMAGE_LABEL: &str = "Image";

/// Budget left for memory text once headroom is reserved.
pub fn memory_budget(token_limit: usize) -> usize {
    token_limit.saturating_sub(TOKEN_HEADROOM)
}
