//! Prompt assembly: template rendering, role-tag structuring, image inlining.

pub mod images;
pub mod structure;
pub mod template;

pub use images::{describe_and_append, describe_list, ImageContextBuilder};
pub use structure::{build_context_messages, parse_prompt_structure, structure_prompt};
pub use template::{render, GlobalVariables};
