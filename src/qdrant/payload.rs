//! Helpers for constructing Qdrant payloads from chunk metadata.

use crate::index::ChunkPayload;
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

/// Build the payload object stored alongside each indexed chunk.
pub(crate) fn build_payload(chunk: &ChunkPayload, timestamp_rfc3339: &str) -> Value {
    let mut payload = Map::new();
    payload.insert("text".into(), Value::String(chunk.text.clone()));
    payload.insert("source".into(), Value::String(chunk.source.clone()));
    payload.insert("page".into(), Value::from(chunk.page));
    if let Some(start) = chunk.start_index {
        payload.insert("start_index".into(), Value::from(start));
    }
    payload.insert("chunk_hash".into(), Value::String(chunk.chunk_hash.clone()));
    payload.insert(
        "timestamp".into(),
        Value::String(timestamp_rfc3339.to_string()),
    );
    Value::Object(payload)
}

/// Decode a stored payload back into chunk metadata, ignoring bookkeeping fields.
pub(crate) fn parse_payload(payload: Map<String, Value>) -> Option<ChunkPayload> {
    serde_json::from_value(Value::Object(payload)).ok()
}

/// Current timestamp formatted for payload storage.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Construct an identifier Qdrant accepts as a point id.
pub(crate) fn generate_point_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk() -> ChunkPayload {
        ChunkPayload {
            text: "Everyone has the right to life.".into(),
            source: "data/pdfs/udhr.pdf".into(),
            page: 2,
            start_index: Some(140),
            chunk_hash: "abc123".into(),
        }
    }

    #[test]
    fn timestamp_is_rfc3339_like() {
        let ts = current_timestamp_rfc3339();
        assert!(ts.contains('T') && ts.ends_with('Z'));
    }

    #[test]
    fn point_ids_are_uuids() {
        let id = generate_point_id();
        assert!(Uuid::parse_str(&id).is_ok());
        assert_ne!(id, generate_point_id());
    }

    #[test]
    fn payload_carries_chunk_metadata() {
        let now = "2025-01-01T00:00:00Z";
        let payload = build_payload(&chunk(), now);
        assert_eq!(payload["text"], "Everyone has the right to life.");
        assert_eq!(payload["source"], "data/pdfs/udhr.pdf");
        assert_eq!(payload["page"], 2);
        assert_eq!(payload["start_index"], 140);
        assert_eq!(payload["chunk_hash"], "abc123");
        assert_eq!(payload["timestamp"], now);
    }

    #[test]
    fn stored_payload_round_trips_without_timestamp() {
        let Value::Object(map) = build_payload(&chunk(), "2025-01-01T00:00:00Z") else {
            panic!("payload is an object");
        };
        assert_eq!(parse_payload(map), Some(chunk()));

        let mut partial = Map::new();
        partial.insert("text".into(), Value::String("orphan".into()));
        assert_eq!(parse_payload(partial), None);
    }
}
