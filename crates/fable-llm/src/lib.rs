pub mod converter;
pub mod factory;
pub mod mock;
pub mod native;
pub mod partial;
pub mod provider;
pub mod rest;
pub mod sse;
pub mod supervisor;

pub use factory::{build_client, LlmClient};
pub use mock::{MockClient, MockResponse};
pub use native::GeminiClient;
pub use partial::extract_partial_field;
pub use provider::{ChatClient, DeltaStream, GenerateOptions, Generation, StreamDelta};
pub use rest::OpenAiCompatClient;
pub use supervisor::{strip_code_fences, GenerateError, Supervisor};
