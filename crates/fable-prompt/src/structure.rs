use std::sync::LazyLock;

use regex::Regex;

use fable_core::messages::{Message, Part, Role};

use crate::images::ImageContextBuilder;
use crate::template::GlobalVariables;

// Matched against an ASCII-lowercased copy so byte offsets line up with the original.
static OPEN_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(user|system|assistant|model)>").expect("tag pattern is valid"));

/// Split a tagged prompt into role-tagged turns.
///
/// `<user>`, `<system>`, `<assistant>` and `<model>` pairs are recognised
/// case-insensitively. Untagged text around them becomes implicit user turns.
/// A system turn that ends up carrying an image is sent as a user turn, since
/// several backends reject images in system messages.
pub fn parse_prompt_structure<F>(prompt: &str, interleave: F) -> Vec<Message>
where
    F: Fn(&str) -> Vec<Part>,
{
    let lower = prompt.to_ascii_lowercase();
    let mut turns = Vec::new();
    // `cursor` starts the pending untagged text; `search` is where the next tag scan begins.
    let mut cursor = 0;
    let mut search = 0;
    let mut found_tag = false;

    let push_implicit = |turns: &mut Vec<Message>, text: &str| {
        let text = text.trim();
        if !text.is_empty() {
            turns.push(Message::new(Role::User, interleave(text)));
        }
    };

    while let Some(caps) = OPEN_TAG.captures_at(&lower, search) {
        let (Some(open), Some(name)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        let closing = format!("</{}>", name.as_str());
        let Some(close_rel) = lower[open.end()..].find(&closing) else {
            // Unpaired tag: plain text.
            search = open.end();
            continue;
        };
        let close_start = open.end() + close_rel;

        push_implicit(&mut turns, &prompt[cursor..open.start()]);

        let inner = prompt[open.end()..close_start].trim();
        if !inner.is_empty() {
            let parts = interleave(inner);
            let mut role = Role::from_tag(name.as_str()).unwrap_or(Role::User);
            if role == Role::System && parts.iter().any(Part::is_inline) {
                role = Role::User;
            }
            turns.push(Message::new(role, parts));
        }

        found_tag = true;
        cursor = close_start + closing.len();
        search = cursor;
    }

    if !found_tag {
        return vec![Message::new(Role::User, interleave(prompt.trim()))];
    }
    push_implicit(&mut turns, &prompt[cursor..]);
    turns
}

/// [`parse_prompt_structure`] with images resolved through `images`.
pub fn structure_prompt(prompt: &str, images: &ImageContextBuilder<'_>) -> Vec<Message> {
    parse_prompt_structure(prompt, |text| images.interleave(text))
}

/// Merge the context layers and the prompt turns into one ordered list:
/// global, model-specific, character-specific, then `turns`. Every text part
/// passes through global-variable substitution.
pub fn build_context_messages(
    global: &[Message],
    model_specific: &[Message],
    character_specific: &[Message],
    turns: Vec<Message>,
    globals: &GlobalVariables,
) -> Vec<Message> {
    global
        .iter()
        .chain(model_specific)
        .chain(character_specific)
        .cloned()
        .chain(turns)
        .map(|msg| msg.map_text(|text| globals.apply(text)))
        .collect()
}
