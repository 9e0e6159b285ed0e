pub mod config;
pub mod debug_log;
pub mod errors;
pub mod messages;
pub mod status;
pub mod tokens;
pub mod world;

pub use config::{AiConfig, ApiKey, ApiKeyMap, ProviderKind, ReasoningEffort};
pub use errors::GatewayError;
pub use messages::{Message, Part, Role};
pub use status::{RequestId, RequestStatus, StatusColor, StatusEvent, StatusSink};
pub use world::{Character, GameState, ImageRef, Location, LogEntry, RoundSnapshot};
