//! Wire bodies for both protocol families and extraction of text from their
//! responses.

use serde::Serialize;
use serde_json::{json, Value};

use fable_core::config::AiConfig;
use fable_core::errors::GatewayError;
use fable_core::messages::{Message, Part, Role};

use crate::provider::GenerateOptions;
use crate::sse::StreamFormatError;

// ── OpenAI-compatible ───────────────────────────────────────────────

#[derive(Debug, Serialize, PartialEq)]
pub struct ChatMessage<'a> {
    pub role: &'static str,
    pub content: ChatContent<'a>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum ChatContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart<'a>>),
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ImageUrl {
    pub url: String,
    pub detail: &'static str,
}

impl ContentPart<'_> {
    fn is_blank_text(&self) -> bool {
        matches!(self, Self::Text { text } if text.trim().is_empty())
    }
}

fn chat_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::System => "system",
        Role::Model => "assistant",
    }
}

fn chat_content(parts: &[Part]) -> ChatContent<'_> {
    let mut entries: Vec<ContentPart<'_>> = parts
        .iter()
        .map(|part| match part {
            Part::Text { text } => ContentPart::Text { text },
            Part::Inline { inline_data } => ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: inline_data.data_url(),
                    detail: "auto",
                },
            },
        })
        .collect();

    // Mixed content must not carry blank text blocks, unless that is all there is.
    if entries.len() > 1 && entries.iter().any(|e| !e.is_blank_text()) {
        entries.retain(|e| !e.is_blank_text());
    }

    if let [ContentPart::Text { text }] = entries.as_slice() {
        return ChatContent::Text(*text);
    }
    ChatContent::Parts(entries)
}

pub fn to_chat_messages(messages: &[Message]) -> Vec<ChatMessage<'_>> {
    messages
        .iter()
        .map(|msg| ChatMessage {
            role: chat_role(msg.role),
            content: chat_content(&msg.parts),
        })
        .collect()
}

/// `POST {base}/chat/completions` body.
pub fn build_chat_body(
    config: &AiConfig,
    messages: &[Message],
    options: &GenerateOptions,
    stream: bool,
) -> Value {
    let mut body = json!({
        "model": config.model,
        "messages": to_chat_messages(messages),
        "temperature": f64::from(config.temperature),
    });

    if stream {
        body["stream"] = json!(true);
    }

    if let Some(effort) = config.wire_reasoning_effort() {
        body["reasoning_effort"] = json!(effort);
    }

    if options.json_mode && config.provider.supports_json_mode() {
        body["response_format"] = json!({"type": "json_object"});
    }

    body
}

/// `choices[0].message.content` of a buffered completion.
pub fn chat_completion_text(body: &Value) -> Result<String, GatewayError> {
    body.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| GatewayError::Decode("missing choices[0].message.content".into()))
}

/// `choices[0].delta.content` of one streamed chunk, if present.
pub fn chat_delta_text(data: &str) -> Result<Option<String>, StreamFormatError> {
    let chunk: Value = serde_json::from_str(data)?;
    Ok(chunk
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .map(str::to_string))
}

// ── Native multimodal ───────────────────────────────────────────────

fn native_role(role: Role) -> &'static str {
    match role {
        Role::Model => "model",
        Role::User | Role::System => "user",
    }
}

/// Inline payloads go out as bare base64, never as data URLs.
fn native_parts(parts: &[Part]) -> Vec<Part> {
    parts
        .iter()
        .map(|part| match part {
            Part::Text { .. } => part.clone(),
            Part::Inline { inline_data } => Part::inline(&inline_data.mime_type, inline_data.bare_data()),
        })
        .collect()
}

/// Body for `:generateContent` / `:streamGenerateContent`. System messages
/// are lifted into `systemInstruction`.
pub fn build_native_body(config: &AiConfig, messages: &[Message], options: &GenerateOptions) -> Value {
    let (system, turns): (Vec<&Message>, Vec<&Message>) =
        messages.iter().partition(|m| m.role == Role::System);

    let contents: Vec<Value> = turns
        .iter()
        .map(|m| json!({"role": native_role(m.role), "parts": native_parts(&m.parts)}))
        .collect();

    let mut body = json!({
        "contents": contents,
        "generationConfig": {"temperature": f64::from(config.temperature)},
    });

    if !system.is_empty() {
        let parts: Vec<Part> = system.iter().flat_map(|m| native_parts(&m.parts)).collect();
        body["systemInstruction"] = json!({"parts": parts});
    }

    if options.json_mode {
        body["generationConfig"]["responseMimeType"] = json!("application/json");
    }

    body
}

fn candidate_text(body: &Value) -> Option<String> {
    let parts = body.pointer("/candidates/0/content/parts")?.as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();
    Some(text)
}

/// Concatenated text parts of the first candidate.
pub fn native_response_text(body: &Value) -> Result<String, GatewayError> {
    candidate_text(body).ok_or_else(|| GatewayError::Decode("missing candidates[0].content.parts".into()))
}

/// Text of one streamed chunk; `None` for chunks without text parts.
pub fn native_delta_text(data: &str) -> Result<Option<String>, StreamFormatError> {
    let chunk: Value = serde_json::from_str(data)?;
    Ok(candidate_text(&chunk).filter(|t| !t.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fable_core::config::{ProviderKind, ReasoningEffort};

    fn config(provider: ProviderKind) -> AiConfig {
        AiConfig {
            provider,
            model: "m".into(),
            temperature: 0.5,
            ..AiConfig::default()
        }
    }

    #[test]
    fn roles_map_to_chat_roles() {
        let messages = vec![
            Message::system_text("s"),
            Message::user_text("u"),
            Message::model_text("a"),
        ];
        let body = build_chat_body(&config(ProviderKind::OpenAi), &messages, &GenerateOptions::default(), false);
        let roles: Vec<&str> = body["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["system", "user", "assistant"]);
        assert_eq!(body["messages"][0]["content"], "s");
        assert_eq!(body["temperature"], 0.5);
        assert!(body.get("stream").is_none());
    }

    #[test]
    fn mixed_content_drops_blank_text_and_keeps_images() {
        let msg = Message::new(
            Role::User,
            vec![Part::text("  "), Part::inline("image/png", "AAAA"), Part::text("look")],
        );
        let value = serde_json::to_value(to_chat_messages(&[msg])).unwrap();
        assert_eq!(
            value[0]["content"],
            json!([
                {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA", "detail": "auto"}},
                {"type": "text", "text": "look"}
            ])
        );
    }

    #[test]
    fn single_remaining_text_collapses_to_string() {
        let msg = Message::new(Role::System, vec![Part::text(""), Part::text("rules")]);
        let value = serde_json::to_value(to_chat_messages(&[msg])).unwrap();
        assert_eq!(value[0]["content"], "rules");
    }

    #[test]
    fn all_blank_content_is_kept() {
        let msg = Message::new(Role::User, vec![Part::text(""), Part::text(" ")]);
        let value = serde_json::to_value(to_chat_messages(&[msg])).unwrap();
        assert_eq!(value[0]["content"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn json_mode_respects_provider_support() {
        let messages = vec![Message::user_text("hi")];
        let opts = GenerateOptions::json();
        let body = build_chat_body(&config(ProviderKind::DeepSeek), &messages, &opts, true);
        assert_eq!(body["response_format"], json!({"type": "json_object"}));
        assert_eq!(body["stream"], true);

        let body = build_chat_body(&config(ProviderKind::Claude), &messages, &opts, false);
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn reasoning_effort_omits_minimal() {
        let messages = vec![Message::user_text("hi")];
        let mut cfg = config(ProviderKind::OpenAi);
        cfg.reasoning_effort = Some(ReasoningEffort::High);
        let body = build_chat_body(&cfg, &messages, &GenerateOptions::default(), false);
        assert_eq!(body["reasoning_effort"], "high");

        cfg.reasoning_effort = Some(ReasoningEffort::Minimal);
        let body = build_chat_body(&cfg, &messages, &GenerateOptions::default(), false);
        assert!(body.get("reasoning_effort").is_none());
    }

    #[test]
    fn native_body_lifts_system_and_strips_data_urls() {
        let messages = vec![
            Message::system_text("be terse"),
            Message::new(
                Role::User,
                vec![Part::text("see"), Part::inline("image/jpeg", "data:image/jpeg;base64,QUJD")],
            ),
            Message::model_text("ok"),
        ];
        let body = build_native_body(&config(ProviderKind::Gemini), &messages, &GenerateOptions::json());
        assert_eq!(body["systemInstruction"], json!({"parts": [{"text": "be terse"}]}));
        assert_eq!(body["contents"].as_array().unwrap().len(), 2);
        assert_eq!(
            body["contents"][0]["parts"][1],
            json!({"inlineData": {"mimeType": "image/jpeg", "data": "QUJD"}})
        );
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(body["generationConfig"]["temperature"], 0.5);
    }

    #[test]
    fn response_text_extraction() {
        let chat = json!({"choices": [{"message": {"content": "hello"}}]});
        assert_eq!(chat_completion_text(&chat).unwrap(), "hello");
        assert!(matches!(chat_completion_text(&json!({})), Err(GatewayError::Decode(_))));

        let native = json!({"candidates": [{"content": {"parts": [{"text": "a"}, {"text": "b"}]}}]});
        assert_eq!(native_response_text(&native).unwrap(), "ab");
    }

    #[test]
    fn stream_chunk_parsing() {
        assert_eq!(
            chat_delta_text(r#"{"choices":[{"delta":{"content":"Hi"}}]}"#).unwrap().as_deref(),
            Some("Hi")
        );
        assert_eq!(chat_delta_text(r#"{"choices":[{"delta":{}}]}"#).unwrap(), None);
        assert!(chat_delta_text("{broken").is_err());

        assert_eq!(
            native_delta_text(r#"{"candidates":[{"content":{"parts":[{"text":"yo"}]}}]}"#)
                .unwrap()
                .as_deref(),
            Some("yo")
        );
        assert_eq!(native_delta_text(r#"{"candidates":[{"finishReason":"STOP"}]}"#).unwrap(), None);
    }
}
