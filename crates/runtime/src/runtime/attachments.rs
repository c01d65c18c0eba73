//! The user's turn input as a provider message.

use std::path::Path;

use base64::Engine as _;

use pv_domain::error::Result;
use pv_domain::tool::{ContentPart, Message, MessageContent, Role};

use crate::collab::Storage;

/// Whether `file_key` has one of the configured image extensions.
pub fn is_image(file_key: &str, image_extensions: &[String]) -> bool {
    Path::new(file_key)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .is_some_and(|ext| image_extensions.iter().any(|allowed| *allowed == ext))
}

/// Build the user message for `text` and an optional attached file.
///
/// Images are inlined as a base64 data URL. Other files contribute no
/// model content. Returns `None` when there is nothing to send.
pub async fn user_message(
    storage: &dyn Storage,
    text: Option<&str>,
    file_key: Option<&str>,
    image_extensions: &[String],
) -> Result<Option<Message>> {
    let image = match file_key {
        Some(key) if is_image(key, image_extensions) => Some(image_part(storage, key).await?),
        Some(key) => {
            tracing::debug!(file_key = %key, "attachment is not an image, not sent to the model");
            None
        }
        None => None,
    };

    let text = text.filter(|t| !t.is_empty());
    let message = match (text, image) {
        (None, None) => None,
        (Some(t), None) => Some(Message::user(t)),
        (text, Some(image)) => {
            let mut parts = Vec::with_capacity(2);
            if let Some(t) = text {
                parts.push(ContentPart::Text { text: t.to_owned() });
            }
            parts.push(image);
            Some(Message {
                role: Role::User,
                content: MessageContent::Parts(parts),
            })
        }
    };
    Ok(message)
}

async fn image_part(storage: &dyn Storage, key: &str) -> Result<ContentPart> {
    let bytes = storage.fetch_bytes(key).await?;
    let media_type = mime_guess::from_path(key).first_or_octet_stream();
    let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
    Ok(ContentPart::Image {
        url: format!("data:{};base64,{encoded}", media_type.essence_str()),
        media_type: Some(media_type.essence_str().to_owned()),
    })
}
