use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use fable_core::messages::Part;
use fable_core::world::ImageRef;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[IMG:([^\[\]]+)\]\]").expect("placeholder pattern is valid"));

/// In-text marker for a registered image.
pub fn placeholder(id: &str) -> String {
    format!("[[IMG:{id}]]")
}

/// Annotated block for a list of images: description, placeholder, and an
/// `[ImageID: ..]` back-reference the model can cite in structured output.
/// Registers nothing; the placeholders only resolve once the images are
/// registered with a builder.
pub fn describe_list(images: &[ImageRef], label: &str) -> String {
    images
        .iter()
        .enumerate()
        .map(|(i, image)| {
            let heading = match image.description.as_deref().map(str::trim) {
                Some(desc) if !desc.is_empty() => format!("{label} {}: {desc}", i + 1),
                _ => format!("{label} {}", i + 1),
            };
            format!("{heading}\n{}\n[ImageID: {}]", placeholder(&image.id), image.id)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// [`describe_list`] appended to `text` on a new line.
pub fn describe_and_append(text: &str, images: &[ImageRef], label: &str) -> String {
    if images.is_empty() {
        return text.to_string();
    }
    let block = describe_list(images, label);
    if text.is_empty() {
        block
    } else {
        format!("{text}\n{block}")
    }
}

/// Maps image ids to payloads for the lifetime of one outbound request.
///
/// Never share a builder between concurrent requests: placeholders are only
/// unique within one instance.
#[derive(Debug, Default)]
pub struct ImageContextBuilder<'a> {
    images: HashMap<&'a str, &'a ImageRef>,
}

impl<'a> ImageContextBuilder<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&'a ImageRef> {
        self.images.get(id).copied()
    }

    /// Store `image` under its id and return its placeholder token.
    pub fn register(&mut self, image: &'a ImageRef) -> String {
        let _ = self.images.insert(image.id.as_str(), image);
        placeholder(&image.id)
    }

    pub fn register_all(&mut self, images: &'a [ImageRef]) {
        for image in images {
            let _ = self.register(image);
        }
    }

    /// Register `images` and return their annotated block; see [`describe_list`].
    pub fn register_list(&mut self, images: &'a [ImageRef], label: &str) -> String {
        self.register_all(images);
        describe_list(images, label)
    }

    /// `text` followed by the annotated block; unchanged when there are no images.
    pub fn register_and_append(&mut self, text: &str, images: &'a [ImageRef], label: &str) -> String {
        self.register_all(images);
        describe_and_append(text, images, label)
    }

    /// Split `text` at placeholders into text and inline parts. Placeholders
    /// for ids that were never registered produce no part.
    pub fn interleave(&self, text: &str) -> Vec<Part> {
        let mut parts = Vec::new();
        let mut last = 0;
        let mut matched = false;

        for caps in PLACEHOLDER.captures_iter(text) {
            matched = true;
            let Some(whole) = caps.get(0) else { continue };
            let before = &text[last..whole.start()];
            if !before.is_empty() {
                parts.push(Part::text(before));
            }
            let id = &caps[1];
            match self.images.get(id) {
                Some(image) => parts.push(Part::inline(&image.mime_type, &image.base64)),
                None => debug!(image_id = id, "placeholder references unregistered image"),
            }
            last = whole.end();
        }

        if !matched {
            return vec![Part::text(text)];
        }
        let rest = &text[last..];
        if !rest.is_empty() {
            parts.push(Part::text(rest));
        }
        parts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(id: &str, description: Option<&str>) -> ImageRef {
        ImageRef {
            id: id.into(),
            base64: format!("b64-{id}"),
            mime_type: "image/png".into(),
            description: description.map(Into::into),
        }
    }

    #[test]
    fn register_returns_placeholder() {
        let img = image("a1", None);
        let mut builder = ImageContextBuilder::new();
        assert_eq!(builder.register(&img), "[[IMG:a1]]");
        assert_eq!(builder.len(), 1);
        assert_eq!(builder.get("a1").unwrap().base64, "b64-a1");
    }

    #[test]
    fn register_list_annotates_each_image() {
        let imgs = vec![image("p1", Some("a portrait")), image("p2", None)];
        let mut builder = ImageContextBuilder::new();
        let text = builder.register_list(&imgs, "Image");
        assert_eq!(
            text,
            "Image 1: a portrait\n[[IMG:p1]]\n[ImageID: p1]\nImage 2\n[[IMG:p2]]\n[ImageID: p2]"
        );
        assert_eq!(builder.len(), 2);
    }

    #[test]
    fn register_and_append_keeps_text_without_images() {
        let mut builder = ImageContextBuilder::new();
        assert_eq!(builder.register_and_append("plain", &[], "Image"), "plain");

        let imgs = vec![image("x", None)];
        let appended = builder.register_and_append("scene", &imgs, "Photo");
        assert!(appended.starts_with("scene\nPhoto 1\n[[IMG:x]]"));
    }

    #[test]
    fn describing_registers_nothing() {
        let imgs = vec![image("d1", Some("a door"))];
        let text = describe_and_append("scene", &imgs, "Image");
        assert_eq!(text, "scene\nImage 1: a door\n[[IMG:d1]]\n[ImageID: d1]");

        let mut builder = ImageContextBuilder::new();
        assert!(builder.interleave(&text).iter().all(|p| !p.is_inline()));
        builder.register_all(&imgs);
        assert_eq!(builder.interleave(&text).iter().filter(|p| p.is_inline()).count(), 1);
    }

    #[test]
    fn interleave_splits_text_and_images() {
        let img = image("1", None);
        let mut builder = ImageContextBuilder::new();
        builder.register(&img);

        let parts = builder.interleave("before [[IMG:1]] after");
        assert_eq!(
            parts,
            vec![
                Part::text("before "),
                Part::inline("image/png", "b64-1"),
                Part::text(" after"),
            ]
        );
    }

    #[test]
    fn interleave_skips_unknown_ids() {
        let builder = ImageContextBuilder::new();
        let parts = builder.interleave("a[[IMG:ghost]]b");
        assert_eq!(parts, vec![Part::text("a"), Part::text("b")]);
    }

    #[test]
    fn interleave_without_placeholders_is_one_text_part() {
        let builder = ImageContextBuilder::new();
        assert_eq!(builder.interleave("just words"), vec![Part::text("just words")]);
    }

    #[test]
    fn adjacent_placeholders_emit_no_empty_text() {
        let a = image("a", None);
        let b = image("b", None);
        let mut builder = ImageContextBuilder::new();
        builder.register(&a);
        builder.register(&b);
        let parts = builder.interleave("[[IMG:a]][[IMG:b]]");
        assert_eq!(parts.len(), 2);
        assert!(parts.iter().all(Part::is_inline));
    }
}
