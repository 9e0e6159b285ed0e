use serde_json::{Map, Value};

use fable_core::world::Character;
use fable_prompt::ImageContextBuilder;

/// Inputs for one model call. Owns the image registry for that call, so
/// placeholders never collide with a concurrent request.
#[derive(Debug)]
pub struct GenerationRequest<'a> {
    /// Prompt template with `{{name}}` placeholders and role tags.
    pub template: String,
    /// Caller data substituted into the template before globals.
    pub data: Value,
    /// Whose turn this is; adds the character's context layer.
    pub character: Option<&'a Character>,
    pub images: ImageContextBuilder<'a>,
}

impl<'a> GenerationRequest<'a> {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            data: Value::Object(Map::new()),
            character: None,
            images: ImageContextBuilder::new(),
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn for_character(mut self, character: &'a Character) -> Self {
        self.character = Some(character);
        self
    }

    /// Set one top-level data field, turning `data` into an object if needed.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        if !self.data.is_object() {
            self.data = Value::Object(Map::new());
        }
        if let Value::Object(map) = &mut self.data {
            let _ = map.insert(key.into(), value.into());
        }
    }

    pub fn images_mut(&mut self) -> &mut ImageContextBuilder<'a> {
        &mut self.images
    }

    /// Name shown in debug log entries.
    pub fn label(&self) -> &str {
        self.character.map_or("narrator", |c| c.name.as_str())
    }

    pub fn character_context(&self) -> &[fable_core::messages::Message] {
        match self.character {
            Some(character) => &character.context_config,
            None => &[],
        }
    }
}
