use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use fable_core::debug_log::{DebugLogEntry, DebugLogSink};
use fable_core::messages::{Message, Part};
use fable_core::status::StatusSink;
use fable_core::world::GameState;
use fable_llm::{extract_partial_field, ChatClient, GenerateOptions, Supervisor};
use fable_memory::{build_actor_memory, build_world_memory};
use fable_prompt::{build_context_messages, render, structure_prompt, GlobalVariables, ImageContextBuilder};
use fable_settings::AppSettings;

use crate::error::EngineError;
use crate::request::GenerationRequest;

/// Runs prompts against one chat client with the host's settings applied.
///
/// Holds no per-request state, so one engine serves concurrent requests.
pub struct Engine {
    client: Arc<dyn ChatClient>,
    supervisor: Supervisor,
    settings: AppSettings,
    globals: GlobalVariables,
    debug_log: Option<Arc<dyn DebugLogSink>>,
}

impl Engine {
    /// Status events of supervised calls go to `status`.
    pub fn new(client: Arc<dyn ChatClient>, settings: AppSettings, status: Arc<dyn StatusSink>) -> Self {
        let supervisor =
            Supervisor::new(status).with_retry_delay(Duration::from_millis(settings.retry.retry_delay_ms));
        let globals = GlobalVariables::from(settings.global_variables.clone());
        Self {
            client,
            supervisor,
            settings,
            globals,
            debug_log: None,
        }
    }

    pub fn with_debug_log(mut self, sink: Arc<dyn DebugLogSink>) -> Self {
        self.debug_log = Some(sink);
        self
    }

    pub fn with_supervisor(mut self, supervisor: Supervisor) -> Self {
        self.supervisor = supervisor;
        self
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn client(&self) -> &dyn ChatClient {
        self.client.as_ref()
    }

    /// Render, structure and layer a request into the outbound message list.
    pub fn prepare(&self, request: &GenerationRequest<'_>) -> Vec<Message> {
        let prompt = render(&request.template, &request.data, &self.globals);
        let turns = structure_prompt(&prompt, &request.images);
        build_context_messages(
            &self.settings.global_context,
            &self.settings.ai.context_config,
            request.character_context(),
            turns,
            &self.globals,
        )
    }

    /// Supervised JSON generation. `None` once every attempt has failed.
    #[instrument(skip_all, fields(character = request.label(), model = self.client.model()))]
    pub async fn generate_json<T, V>(&self, request: &GenerationRequest<'_>, validator: V) -> Option<T>
    where
        T: DeserializeOwned,
        V: Fn(&Value) -> bool,
    {
        let messages = self.prepare(request);
        let prompt = transcript(&messages);

        let client = self.client.as_ref();
        let debug_log = self.debug_log.as_deref();
        let label = request.label();
        let messages = messages.as_slice();
        let prompt = prompt.as_str();

        let call_api = move || async move {
            let result = client
                .generate(messages, &GenerateOptions::json())
                .await
                .map(|generation| generation.text);
            if let Some(sink) = debug_log {
                let response = match &result {
                    Ok(text) => text.clone(),
                    Err(err) => format!("error: {err}"),
                };
                sink.record(DebugLogEntry::new(label, prompt, response));
            }
            result
        };

        self.supervisor
            .robust_generate(call_api, validator, self.settings.retry.max_retries, None)
            .await
    }

    /// Stream a JSON response and report the growing value of `key` as it
    /// arrives. Returns the full raw text; cancellation ends early without
    /// an error.
    #[instrument(skip_all, fields(character = request.label(), field = key))]
    pub async fn stream_field<F>(
        &self,
        request: &GenerationRequest<'_>,
        key: &str,
        mut on_partial: F,
        cancel: CancellationToken,
    ) -> Result<String, EngineError>
    where
        F: FnMut(&str),
    {
        if request.template.trim().is_empty() {
            return Err(EngineError::EmptyPrompt);
        }
        let messages = self.prepare(request);
        let mut stream = self
            .client
            .generate_stream(&messages, &GenerateOptions::json(), cancel)
            .await?;

        let mut raw = String::new();
        let mut shown = String::new();
        while let Some(delta) = stream.next().await {
            let delta = match delta {
                Ok(delta) => delta,
                Err(err) => {
                    self.record(request.label(), &messages, format!("error: {err}\n{raw}"));
                    return Err(err.into());
                }
            };
            let Some(text) = delta.text else { continue };
            raw.push_str(&text);

            let value = extract_partial_field(&raw, key);
            if value != shown {
                on_partial(&value);
                shown = value;
            }
        }

        debug!(bytes = raw.len(), field_chars = shown.chars().count(), "stream finished");
        self.record(request.label(), &messages, raw.clone());
        Ok(raw)
    }

    /// What `actor_id` remembers, under the configured capacity and budget.
    pub fn actor_memory<'s>(
        &self,
        state: &'s GameState,
        actor_id: &str,
        images: Option<&mut ImageContextBuilder<'s>>,
    ) -> String {
        let memory = &self.settings.memory;
        build_actor_memory(
            &state.history,
            actor_id,
            state.actor_location(actor_id),
            memory.actor_capacity,
            memory.token_limit,
            &state.characters,
            &state.locations,
            images,
        )
    }

    /// Recent world history, under the configured round window and budget.
    pub fn world_memory<'s>(&self, state: &'s GameState, images: Option<&mut ImageContextBuilder<'s>>) -> String {
        let memory = &self.settings.memory;
        build_world_memory(
            &state.history,
            state.round,
            memory.world_rounds,
            memory.token_limit,
            images,
        )
    }

    fn record(&self, label: &str, messages: &[Message], response: String) {
        if let Some(sink) = &self.debug_log {
            sink.record(DebugLogEntry::new(label, transcript(messages), response));
        }
    }
}

/// Plain-text rendering of an outbound message list for the debug log.
fn transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|msg| {
            let body: String = msg
                .parts
                .iter()
                .map(|part| match part {
                    Part::Text { text } => text.as_str(),
                    Part::Inline { .. } => "[image]",
                })
                .collect();
            format!("[{}]\n{body}", msg.role.as_str())
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use fable_core::debug_log::MemoryDebugLog;
    use fable_core::errors::GatewayError;
    use fable_core::messages::Role;
    use fable_core::status::{RecordingStatusSink, StatusColor};
    use fable_core::world::{Character, ImageRef, LogEntry};
    use fable_llm::{MockClient, MockResponse};
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Action {
        action: String,
    }

    fn settings() -> AppSettings {
        let mut settings = AppSettings::default();
        settings.global_variables.insert("world".into(), "Aster".into());
        settings.global_context = vec![Message::system_text("You narrate {{world}}.")];
        settings.ai.context_config = vec![Message::model_text("Understood.")];
        settings.retry.max_retries = 3;
        settings.retry.retry_delay_ms = 0;
        settings
    }

    fn engine(client: Arc<MockClient>) -> (Engine, Arc<RecordingStatusSink>, MemoryDebugLog) {
        let status = Arc::new(RecordingStatusSink::new());
        let log = MemoryDebugLog::new();
        let engine = Engine::new(client, settings(), status.clone()).with_debug_log(Arc::new(log.clone()));
        (engine, status, log)
    }

    fn mira() -> Character {
        Character {
            id: "mira".into(),
            name: "Mira".into(),
            location_id: Some("tavern".into()),
            context_config: vec![Message::user_text("I am Mira of {{world}}.")],
        }
    }

    #[test]
    fn prepare_layers_context_and_resolves_images() {
        let client = Arc::new(MockClient::new(vec![]));
        let (engine, _, _) = engine(client);
        let character = mira();
        let portrait = ImageRef {
            id: "p1".into(),
            base64: "AAAA".into(),
            mime_type: "image/png".into(),
            description: None,
        };

        let mut request = GenerationRequest::new("<system>Round {{round}}</system><user>{{who}} looks: {{img}}</user>")
            .with_data(json!({"round": 4, "who": "{{world}}"}))
            .for_character(&character);
        let token = request.images_mut().register(&portrait);
        request.set("img", token);

        let messages = engine.prepare(&request);
        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::Model, Role::User, Role::System, Role::User]);
        assert_eq!(messages[0].text_content(), "You narrate Aster.");
        assert_eq!(messages[2].text_content(), "I am Mira of Aster.");
        assert_eq!(messages[3].text_content(), "Round 4");
        // Caller data is not rescanned during render, but globals apply to every outbound text part.
        assert_eq!(messages[4].text_content(), "Aster looks: ");
        assert!(messages[4].has_inline());
    }

    #[tokio::test]
    async fn generate_json_retries_until_valid() {
        let client = Arc::new(MockClient::new(vec![
            MockResponse::text("not json"),
            MockResponse::text(r#"{"other": 1}"#),
            MockResponse::text("```json\n{\"action\": \"wave\"}\n```"),
        ]));
        let (engine, status, log) = engine(client.clone());
        let request = GenerationRequest::new("What does Mira do?");

        let action: Option<Action> = engine
            .generate_json(&request, |v| v.get("action").is_some())
            .await;

        assert_eq!(action, Some(Action { action: "wave".into() }));
        assert_eq!(client.call_count(), 3);
        assert!(client.requests().iter().all(|(_, opts)| opts.json_mode));
        assert_eq!(
            status.colors(),
            vec![StatusColor::Blue, StatusColor::Yellow, StatusColor::Red, StatusColor::Green]
        );

        let entries = log.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].character_name, "narrator");
        assert_eq!(entries[0].response, "not json");
        assert!(entries[0].prompt.contains("[system]\nYou narrate Aster."));
        assert!(entries[0].prompt.ends_with("[user]\nWhat does Mira do?"));
    }

    #[tokio::test]
    async fn generate_json_gives_up_after_transport_errors() {
        let client = Arc::new(MockClient::new(vec![
            MockResponse::Error(GatewayError::Network("reset".into())),
            MockResponse::Error(GatewayError::Network("reset".into())),
            MockResponse::Error(GatewayError::Network("reset".into())),
        ]));
        let (engine, status, log) = engine(client.clone());
        let request = GenerationRequest::new("go");

        let action: Option<Action> = engine.generate_json(&request, |_| true).await;
        assert_eq!(action, None);
        assert_eq!(client.call_count(), 3);
        assert_eq!(status.colors().last(), Some(&StatusColor::Gray));
        assert!(log.entries().iter().all(|e| e.response.starts_with("error: ")));
    }

    #[tokio::test]
    async fn stream_field_reports_growing_value() {
        let client = Arc::new(MockClient::new(vec![MockResponse::chunks([
            r#"{"thought": "hm", "spe"#,
            r#"ech": "Hel"#,
            r#"lo\nthe"#,
            r#"re", "mood": "ok"}"#,
        ])]));
        let (engine, _, log) = engine(client);
        let character = mira();
        let request = GenerationRequest::new("Speak.").for_character(&character);

        let mut seen = Vec::new();
        let raw = engine
            .stream_field(&request, "speech", |v| seen.push(v.to_string()), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(seen, vec!["Hel", "Hello\nthe", "Hello\nthere"]);
        assert_eq!(raw, r#"{"thought": "hm", "speech": "Hello\nthere", "mood": "ok"}"#);

        let entries = log.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].character_name, "Mira");
        assert_eq!(entries[0].response, raw);
    }

    #[tokio::test]
    async fn stream_field_stops_quietly_on_cancel() {
        let client = Arc::new(MockClient::new(vec![MockResponse::chunks([
            r#"{"speech": "one"#,
            r#" two"#,
            r#" three"}"#,
        ])]));
        let (engine, _, _) = engine(client);
        let request = GenerationRequest::new("Speak.");
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        let mut seen = Vec::new();
        let raw = engine
            .stream_field(
                &request,
                "speech",
                |v| {
                    seen.push(v.to_string());
                    trigger.cancel();
                },
                cancel,
            )
            .await
            .unwrap();

        assert_eq!(seen, vec!["one"]);
        assert_eq!(raw, r#"{"speech": "one"#);
    }

    #[tokio::test]
    async fn stream_field_surfaces_gateway_errors() {
        let client = Arc::new(MockClient::new(vec![MockResponse::Error(GatewayError::MissingBody)]));
        let (engine, _, _) = engine(client);
        let request = GenerationRequest::new("Speak.");

        let err = engine
            .stream_field(&request, "speech", |_| {}, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Gateway(GatewayError::MissingBody)));

        let empty = GenerationRequest::new("  ");
        let err = engine
            .stream_field(&empty, "speech", |_| {}, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::EmptyPrompt));
    }

    #[test]
    fn memory_wrappers_use_configured_limits() {
        let client = Arc::new(MockClient::new(vec![]));
        let (engine, _, _) = engine(client);

        let mut state = GameState {
            round: 3,
            ..GameState::default()
        };
        let _ = state.characters.insert("mira".into(), mira());
        state.history = vec![
            LogEntry::new(1, "Mira enters.").at("tavern").by("mira"),
            LogEntry::new(2, "Tom sings.").at("tavern").by("tom"),
            LogEntry::new(3, "Far away, a storm.").at("harbor").by("sol"),
        ];

        let world = engine.world_memory(&state, None);
        assert_eq!(world.lines().count(), 3);

        let actor = engine.actor_memory(&state, "mira", None);
        assert!(actor.contains("[R1] Mira enters."));
        assert!(actor.contains("[R2] Tom sings."));
        assert!(!actor.contains("storm"));
    }
}
