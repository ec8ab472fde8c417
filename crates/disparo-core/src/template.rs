//! Variable substitution and message block rendering

use disparo_storage::models::Contact;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Renders `{{key}}` placeholders against a contact
///
/// System keys are accepted in Portuguese and English (`nome`/`name`,
/// `telefone`/`phone`, ...). Any other key is looked up in the contact's
/// custom fields; unresolved placeholders render as the empty string.
pub struct TemplateRenderer {
    placeholder: Regex,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self {
            placeholder: Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("valid placeholder pattern"),
        }
    }

    /// Render a template with contact data
    pub fn render(&self, template: &str, contact: &Contact) -> String {
        self.placeholder
            .replace_all(template, |caps: &Captures| resolve(&caps[1], contact))
            .into_owned()
    }

    /// Placeholder keys in order of first appearance
    pub fn extract_variables(&self, template: &str) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        for caps in self.placeholder.captures_iter(template) {
            let key = caps[1].to_string();
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }

    /// Parse message content into blocks and render each one
    pub fn render_message(&self, content: &str, contact: &Contact) -> RenderedMessage {
        let (blocks, structured) = parse_blocks(content);
        let blocks: Vec<MessageBlock> = blocks.iter().map(|b| b.render(self, contact)).collect();

        let text = blocks
            .iter()
            .filter_map(MessageBlock::text)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        let media = blocks.iter().find(|b| b.media_url().is_some());

        RenderedMessage {
            text,
            kind: media.map(MessageBlock::kind).unwrap_or("text"),
            media_url: media.and_then(|b| b.media_url()).map(str::to_string),
            variables: self.extract_variables(content),
            blocks: if structured { blocks } else { Vec::new() },
        }
    }
}

fn resolve(key: &str, contact: &Contact) -> String {
    let optional = |value: &Option<String>| value.clone().unwrap_or_default();

    match key {
        "nome" | "name" => contact.name.clone(),
        "telefone" | "phone" => contact.phone.clone(),
        "telefone2" | "phone2" => optional(&contact.phone2),
        "telefone3" | "phone3" => optional(&contact.phone3),
        "email" => optional(&contact.email),
        "empresa" | "company" => optional(&contact.company),
        "cargo" | "position" => optional(&contact.position),
        "observacoes" | "notes" => optional(&contact.notes),
        "tags" => contact.tags_vec().join(", "),
        custom => contact.custom_field(custom).unwrap_or_default(),
    }
}

/// One typed block of a structured message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageBlock {
    Text {
        content: String,
        delay: Option<u32>,
        metadata: Option<Value>,
    },
    Image {
        url: String,
        caption: Option<String>,
        delay: Option<u32>,
        metadata: Option<Value>,
    },
    File {
        url: String,
        filename: Option<String>,
        delay: Option<u32>,
        metadata: Option<Value>,
    },
    Link {
        url: String,
        title: Option<String>,
        delay: Option<u32>,
        metadata: Option<Value>,
    },
    Audio {
        url: String,
        delay: Option<u32>,
        metadata: Option<Value>,
    },
}

impl MessageBlock {
    pub fn kind(&self) -> &'static str {
        match self {
            MessageBlock::Text { .. } => "text",
            MessageBlock::Image { .. } => "image",
            MessageBlock::File { .. } => "file",
            MessageBlock::Link { .. } => "link",
            MessageBlock::Audio { .. } => "audio",
        }
    }

    /// Text shown to the recipient, if the block carries any
    pub fn text(&self) -> Option<&str> {
        match self {
            MessageBlock::Text { content, .. } => Some(content),
            MessageBlock::Image { caption, .. } => caption.as_deref(),
            MessageBlock::Link { title, .. } => title.as_deref(),
            MessageBlock::File { .. } | MessageBlock::Audio { .. } => None,
        }
    }

    /// Media URL for attachment blocks; links are not media
    pub fn media_url(&self) -> Option<&str> {
        match self {
            MessageBlock::Image { url, .. }
            | MessageBlock::File { url, .. }
            | MessageBlock::Audio { url, .. } => Some(url),
            MessageBlock::Text { .. } | MessageBlock::Link { .. } => None,
        }
    }

    fn render(&self, renderer: &TemplateRenderer, contact: &Contact) -> MessageBlock {
        let r = |s: &str| renderer.render(s, contact);
        let ro = |s: &Option<String>| s.as_deref().map(|s| renderer.render(s, contact));

        match self {
            MessageBlock::Text { content, delay, metadata } => MessageBlock::Text {
                content: r(content),
                delay: *delay,
                metadata: metadata.clone(),
            },
            MessageBlock::Image { url, caption, delay, metadata } => MessageBlock::Image {
                url: r(url),
                caption: ro(caption),
                delay: *delay,
                metadata: metadata.clone(),
            },
            MessageBlock::File { url, filename, delay, metadata } => MessageBlock::File {
                url: r(url),
                filename: ro(filename),
                delay: *delay,
                metadata: metadata.clone(),
            },
            MessageBlock::Link { url, title, delay, metadata } => MessageBlock::Link {
                url: r(url),
                title: ro(title),
                delay: *delay,
                metadata: metadata.clone(),
            },
            MessageBlock::Audio { url, delay, metadata } => MessageBlock::Audio {
                url: r(url),
                delay: *delay,
                metadata: metadata.clone(),
            },
        }
    }
}

/// Content that is a non-empty JSON block list is structured; anything
/// else is a single plain text block.
fn parse_blocks(content: &str) -> (Vec<MessageBlock>, bool) {
    match serde_json::from_str::<Vec<MessageBlock>>(content) {
        Ok(blocks) if !blocks.is_empty() => (blocks, true),
        _ => (
            vec![MessageBlock::Text {
                content: content.to_string(),
                delay: None,
                metadata: None,
            }],
            false,
        ),
    }
}

/// A message rendered for one contact
#[derive(Debug, Clone)]
pub struct RenderedMessage {
    /// Text of all text-bearing blocks joined by newlines
    pub text: String,
    /// `text`, or the kind of the first media block
    pub kind: &'static str,
    pub media_url: Option<String>,
    /// Placeholder keys found in the raw content
    pub variables: Vec<String>,
    /// Rendered blocks; empty for plain text content
    pub blocks: Vec<MessageBlock>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use uuid::Uuid;

    fn ana() -> Contact {
        Contact {
            id: Uuid::new_v4(),
            name: "Ana".to_string(),
            phone: "5511999990000".to_string(),
            phone2: Some("5511988880000".to_string()),
            phone3: None,
            email: Some("ana@example.com".to_string()),
            company: Some("Acme".to_string()),
            position: None,
            notes: None,
            tags: json!(["vip", "sp"]),
            custom_fields: json!({"plano": "ouro", "Plano": "prata"}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_render_system_fields() {
        let renderer = TemplateRenderer::new();
        let contact = ana();

        assert_eq!(renderer.render("{{nome}}", &contact), "Ana");
        assert_eq!(
            renderer.render("Olá {{name}} da {{empresa}} ({{telefone2}}) [{{tags}}]", &contact),
            "Olá Ana da Acme (5511988880000) [vip, sp]"
        );
        assert_eq!(renderer.render("{{cargo}}|{{telefone3}}", &contact), "|");
    }

    #[test]
    fn test_render_custom_and_unknown() {
        let renderer = TemplateRenderer::new();
        let contact = ana();

        assert_eq!(renderer.render("{{plano}}/{{Plano}}", &contact), "ouro/prata");
        assert_eq!(renderer.render("{{xyz}}", &contact), "");
        assert_eq!(renderer.render("{{ nome }}!", &contact), "Ana!");
    }

    #[test]
    fn test_render_is_idempotent() {
        let renderer = TemplateRenderer::new();
        let contact = ana();

        let plain = "Sem variáveis aqui {nome} }}";
        assert_eq!(renderer.render(plain, &contact), plain);

        let once = renderer.render("Oi {{nome}}, plano {{plano}}", &contact);
        assert_eq!(renderer.render(&once, &contact), once);
    }

    #[test]
    fn test_extract_variables() {
        let renderer = TemplateRenderer::new();
        assert_eq!(
            renderer.extract_variables("{{nome}} {{plano}} {{nome}}"),
            vec!["nome", "plano"]
        );
    }

    #[test]
    fn test_render_plain_message() {
        let renderer = TemplateRenderer::new();
        let rendered = renderer.render_message("Oi {{nome}}", &ana());

        assert_eq!(rendered.text, "Oi Ana");
        assert_eq!(rendered.kind, "text");
        assert_eq!(rendered.media_url, None);
        assert!(rendered.blocks.is_empty());
    }

    #[test]
    fn test_render_structured_message() {
        let renderer = TemplateRenderer::new();
        let content = json!([
            {"type": "text", "content": "Oi {{nome}}"},
            {"type": "image", "url": "https://cdn.example.com/promo.png", "caption": "Para {{empresa}}", "delay": 3},
            {"type": "audio", "url": "https://cdn.example.com/a.ogg"}
        ])
        .to_string();

        let rendered = renderer.render_message(&content, &ana());

        assert_eq!(rendered.text, "Oi Ana\nPara Acme");
        assert_eq!(rendered.kind, "image");
        assert_eq!(rendered.media_url.as_deref(), Some("https://cdn.example.com/promo.png"));
        assert_eq!(rendered.blocks.len(), 3);
        assert_eq!(
            rendered.blocks[1],
            MessageBlock::Image {
                url: "https://cdn.example.com/promo.png".to_string(),
                caption: Some("Para Acme".to_string()),
                delay: Some(3),
                metadata: None,
            }
        );
    }

    #[test]
    fn test_json_that_is_not_blocks_is_text() {
        let renderer = TemplateRenderer::new();
        let rendered = renderer.render_message(r#"{"hello": "world"}"#, &ana());

        assert_eq!(rendered.text, r#"{"hello": "world"}"#);
        assert!(rendered.blocks.is_empty());
    }
}
