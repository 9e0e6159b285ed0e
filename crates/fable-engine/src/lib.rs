//! Request pipeline: template → turns → layered context → model → result.

pub mod engine;
pub mod error;
pub mod request;

pub use engine::Engine;
pub use error::EngineError;
pub use request::GenerationRequest;
