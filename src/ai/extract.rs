//! Pulling encoded images out of structured provider responses.
//!
//! Inference backends disagree on where they put the image in a JSON reply.
//! Rather than poking at arbitrary values, the lookups are an ordered list of
//! [`ExtractionStrategy`]s that are tried one after another.

use crate::error::ProviderFailure;
use base64::Engine as _;
use serde_json::{Map, Value};

/// Leading characters of base64-encoded PNG, JPEG, WebP and GIF files.
const BASE64_SIGNATURES: &[&str] = &["iVBORw0KGgo", "/9j/", "UklGR", "R0lGOD"];

/// Keys that hold the payload when an image entry is itself an object.
const NESTED_KEYS: &[&str] = &["b64_json", "image", "base64", "data"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    /// Decode the value stored under a top-level key (or under that key in
    /// the first object of a top-level array).
    NamedField(&'static str),
    /// Walk every string in the document and decode the first one that
    /// starts with a known base64 image signature.
    SignatureScan,
}

pub const DEFAULT_STRATEGIES: &[ExtractionStrategy] = &[
    ExtractionStrategy::NamedField("image"),
    ExtractionStrategy::NamedField("generated_image"),
    ExtractionStrategy::NamedField("images"),
    ExtractionStrategy::NamedField("data"),
    ExtractionStrategy::NamedField("output"),
    ExtractionStrategy::SignatureScan,
];

impl ExtractionStrategy {
    pub fn apply(&self, document: &Value) -> Option<Vec<u8>> {
        match self {
            ExtractionStrategy::NamedField(field) => objects(document)
                .find_map(|object| object.get(*field))
                .and_then(decode_value),
            ExtractionStrategy::SignatureScan => scan(document),
        }
    }
}

/// Runs `strategies` in order and returns the first decoded image.
pub fn extract_image(
    document: &Value,
    strategies: &[ExtractionStrategy],
) -> Result<Vec<u8>, ProviderFailure> {
    for strategy in strategies {
        if let Some(bytes) = strategy.apply(document) {
            tracing::debug!("Extracted {} image bytes via {:?}", bytes.len(), strategy);
            return Ok(bytes);
        }
    }

    Err(ProviderFailure::MalformedResponse(
        "no encoded image found in structured response".to_string(),
    ))
}

/// Decodes a base64 image, accepting an optional `data:` URL prefix and
/// embedded line breaks.
pub fn decode_base64_image(encoded: &str) -> Result<Vec<u8>, ProviderFailure> {
    let payload: String = strip_data_url(encoded.trim())
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(&payload)
        .or_else(|_| base64::engine::general_purpose::STANDARD_NO_PAD.decode(&payload))
        .map_err(|e| {
            ProviderFailure::MalformedResponse(format!("failed to decode base64 image: {}", e))
        })?;

    if bytes.is_empty() {
        return Err(ProviderFailure::MalformedResponse(
            "decoded image is empty".to_string(),
        ));
    }

    Ok(bytes)
}

fn strip_data_url(value: &str) -> &str {
    if value.starts_with("data:") {
        value.split_once(',').map_or(value, |(_, payload)| payload)
    } else {
        value
    }
}

fn objects(document: &Value) -> Box<dyn Iterator<Item = &Map<String, Value>> + '_> {
    match document {
        Value::Object(object) => Box::new(std::iter::once(object)),
        Value::Array(items) => Box::new(items.iter().filter_map(Value::as_object)),
        _ => Box::new(std::iter::empty()),
    }
}

fn decode_value(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::String(encoded) => decode_base64_image(encoded).ok(),
        Value::Array(items) => items.iter().find_map(decode_value),
        Value::Object(object) => NESTED_KEYS
            .iter()
            .filter_map(|key| object.get(*key))
            .find_map(decode_value),
        _ => None,
    }
}

fn scan(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::String(text) if looks_like_encoded_image(text) => decode_base64_image(text).ok(),
        Value::Array(items) => items.iter().find_map(scan),
        Value::Object(object) => object.values().find_map(scan),
        _ => None,
    }
}

fn looks_like_encoded_image(text: &str) -> bool {
    let payload = strip_data_url(text.trim());
    BASE64_SIGNATURES.iter().any(|sig| payload.starts_with(sig))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PNG_BYTES: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x01];

    fn encoded_png() -> String {
        base64::engine::general_purpose::STANDARD.encode(PNG_BYTES)
    }

    #[test]
    fn test_named_field_string() {
        let doc = json!({ "image": encoded_png() });
        assert_eq!(extract_image(&doc, DEFAULT_STRATEGIES).unwrap(), PNG_BYTES);
    }

    #[test]
    fn test_named_field_list_of_objects() {
        let doc = json!({ "data": [{ "b64_json": encoded_png() }] });
        assert_eq!(extract_image(&doc, DEFAULT_STRATEGIES).unwrap(), PNG_BYTES);
    }

    #[test]
    fn test_top_level_array_of_objects() {
        let doc = json!([{ "generated_image": format!("data:image/png;base64,{}", encoded_png()) }]);
        assert_eq!(extract_image(&doc, DEFAULT_STRATEGIES).unwrap(), PNG_BYTES);
    }

    #[test]
    fn test_named_field_that_is_not_base64_falls_through() {
        let doc = json!({
            "image": "https://example.com/out.png",
            "meta": { "preview": encoded_png() }
        });
        assert_eq!(
            ExtractionStrategy::NamedField("image").apply(&doc),
            None
        );
        assert_eq!(extract_image(&doc, DEFAULT_STRATEGIES).unwrap(), PNG_BYTES);
    }

    #[test]
    fn test_signature_scan_finds_deeply_nested_image() {
        let doc = json!({
            "result": { "items": [ { "note": "done" }, { "blob": encoded_png() } ] }
        });
        assert_eq!(
            ExtractionStrategy::SignatureScan.apply(&doc).unwrap(),
            PNG_BYTES
        );
    }

    #[test]
    fn test_signature_scan_ignores_plain_text() {
        let doc = json!({ "error": "Model is currently loading", "estimated_time": 20.0 });
        let err = extract_image(&doc, DEFAULT_STRATEGIES).unwrap_err();
        assert!(matches!(err, ProviderFailure::MalformedResponse(_)));
    }

    #[test]
    fn test_strategy_order_is_respected() {
        let other = base64::engine::general_purpose::STANDARD.encode([0xFF, 0xD8, 0xFF, 0xE0]);
        let doc = json!({ "images": [other], "image": encoded_png() });
        assert_eq!(extract_image(&doc, DEFAULT_STRATEGIES).unwrap(), PNG_BYTES);
    }

    #[test]
    fn test_decode_strips_line_breaks() {
        let encoded = encoded_png();
        let (head, tail) = encoded.split_at(4);
        let wrapped = format!("{}\n{}", head, tail);
        assert_eq!(decode_base64_image(&wrapped).unwrap(), PNG_BYTES);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_base64_image("!!!invalid-base64!!!").is_err());
        assert!(decode_base64_image("").is_err());
    }
}
