//! The Response Assembler: turns a [`DocumentData`] read from the engine
//! into a framing-agnostic body plus `Content-Type`, with no further
//! transformation of its contents.

use vfr_engine::DocumentData;

/// Body of an assembled response.
#[derive(Clone, Debug, PartialEq)]
pub enum Body {
    /// Raw octets, decoded from `DocumentData::bytes`.
    Bytes(Vec<u8>),
    /// The document's opaque `content`, serialized as JSON text.
    Json(serde_json::Value),
}

/// A response ready to hand to whatever transport is serving the request.
#[derive(Clone, Debug, PartialEq)]
pub struct AssembledResponse {
    pub content_type: String,
    pub body: Body,
}

/// Assemble a response for `doc`, read at `path` (used only for the MIME
/// fallback when `doc` carries no `bytes` and no declared `content.mime`).
///
/// # Errors
///
/// Returns an error if `doc.bytes` is present but not valid base64; this
/// can only happen if the engine itself returned malformed data.
pub fn assemble(doc: &DocumentData, path: &str) -> Result<AssembledResponse, base64::DecodeError> {
    if let Some(bytes) = doc.decoded_bytes()? {
        let content_type = doc
            .mime()
            .map(str::to_owned)
            .unwrap_or_else(|| mime_for_path(path).to_owned());
        return Ok(AssembledResponse {
            content_type,
            body: Body::Bytes(bytes),
        });
    }

    Ok(AssembledResponse {
        content_type: "application/json".to_owned(),
        body: Body::Json(doc.content.clone()),
    })
}

/// Canonical extension → MIME type map (`spec.md` §4.2). Directory-looking
/// paths with no extension default to `text/html`.
#[must_use]
pub fn mime_for_path(path: &str) -> &'static str {
    let extension = path.rsplit('.').next().filter(|ext| *ext != path);
    match extension.map(str::to_ascii_lowercase).as_deref() {
        Some("html" | "htm") => "text/html",
        Some("css") => "text/css",
        Some("js" | "mjs") => "text/javascript",
        Some("ts") => "application/typescript",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("svg") => "image/svg+xml",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("mp3") => "audio/mpeg",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("ogg") => "audio/ogg",
        Some("wasm") => "application/wasm",
        Some("webmanifest" | "manifest") => "application/manifest+json",
        Some("pdf") => "application/pdf",
        Some("zip") => "application/zip",
        None => "text/html",
        Some(_) => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_document_uses_declared_mime() {
        let doc = DocumentData::with_bytes("image/png", b"\x89PNG");
        let resp = assemble(&doc, "/logo.png").unwrap();
        assert_eq!(resp.content_type, "image/png");
        assert_eq!(resp.body, Body::Bytes(b"\x89PNG".to_vec()));
    }

    #[test]
    fn bytes_document_falls_back_to_extension_when_mime_missing() {
        let doc = DocumentData {
            content: serde_json::json!({}),
            bytes: Some(base64::Engine::encode(
                &base64::engine::general_purpose::STANDARD,
                b"body { }",
            )),
        };
        let resp = assemble(&doc, "/style.css").unwrap();
        assert_eq!(resp.content_type, "text/css");
    }

    #[test]
    fn text_document_replies_as_json() {
        let doc = DocumentData::text(serde_json::json!({"mime": "text/plain", "title": "hi"}));
        let resp = assemble(&doc, "/note").unwrap();
        assert_eq!(resp.content_type, "application/json");
        assert_eq!(resp.body, Body::Json(doc.content));
    }

    #[test]
    fn mime_table_covers_common_web_types() {
        assert_eq!(mime_for_path("/a.html"), "text/html");
        assert_eq!(mime_for_path("/a.js"), "text/javascript");
        assert_eq!(mime_for_path("/a.wasm"), "application/wasm");
        assert_eq!(mime_for_path("/a.unknownext"), "application/octet-stream");
        assert_eq!(mime_for_path("/no-extension"), "text/html");
    }
}
