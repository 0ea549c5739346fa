//! Decoding of the CRM's hybrid response bodies.
//!
//! A 2xx body is either a plain JSON document or SSE framing (`event:` /
//! `data:` lines) around one JSON-RPC response. For `tools/call` the useful
//! payload sits in `result.content[0].text` as string-encoded JSON, which may
//! itself wrap another `content[0].text` layer. Unwrapping is bounded to
//! [`MAX_NESTED_LEVELS`] layers past the first.

use serde_json::Value;
use tracing::warn;

use crate::error::TransportError;
use crate::models::tool::ToolDefinition;

const SSE_EVENT_MARKER: &str = "event:";
const SSE_DATA_MARKER: &str = "data:";

/// String-encoded layers followed after `result.content[0].text`.
pub const MAX_NESTED_LEVELS: usize = 2;

/// Extracts the innermost tool payload from a `tools/call` response body.
///
/// Bodies without SSE framing are returned as parsed, untouched.
pub fn unwrap(raw: &str) -> Result<Value, TransportError> {
    if !is_sse(raw) {
        return decode_event(raw);
    }
    let event = decode_event(raw)?;
    if let Some(err) = rpc_error(&event) {
        return Err(err);
    }
    Ok(unwrap_content(event))
}

/// Extracts `result.tools` from a `tools/list` response body.
pub fn parse_tool_list(raw: &str) -> Result<Vec<ToolDefinition>, TransportError> {
    let event = decode_event(raw)?;
    if let Some(err) = rpc_error(&event) {
        return Err(err);
    }
    let Some(tools) = event.pointer("/result/tools").and_then(Value::as_array) else {
        warn!(target: "crm_bridge::protocol", "tools/list response has no result.tools array");
        return Err(TransportError::unparseable(raw));
    };

    let mut out = Vec::with_capacity(tools.len());
    for tool in tools {
        match serde_json::from_value::<ToolDefinition>(tool.clone()) {
            Ok(def) if !def.name.trim().is_empty() => out.push(def),
            Ok(_) => warn!(target: "crm_bridge::protocol", "skipping remote tool with empty name"),
            Err(e) => warn!(target: "crm_bridge::protocol", error = %e, "skipping malformed remote tool entry"),
        }
    }
    Ok(out)
}

fn is_sse(raw: &str) -> bool {
    let head = raw.trim_start();
    head.starts_with(SSE_EVENT_MARKER) || head.starts_with(SSE_DATA_MARKER)
}

/// The single JSON document carried by the body, SSE-framed or not.
fn decode_event(raw: &str) -> Result<Value, TransportError> {
    if !is_sse(raw) {
        return serde_json::from_str(raw).map_err(|_| protocol_failure(raw));
    }

    // First data line that parses wins; later lines are ignored.
    raw.lines()
        .filter_map(|line| line.strip_prefix(SSE_DATA_MARKER))
        .find_map(|data| serde_json::from_str::<Value>(data.trim()).ok())
        .ok_or_else(|| protocol_failure(raw))
}

fn protocol_failure(raw: &str) -> TransportError {
    warn!(
        target: "crm_bridge::protocol",
        body_len = raw.len(),
        "no decodable JSON in response envelope; remote protocol may have changed"
    );
    TransportError::unparseable(raw)
}

fn rpc_error(event: &Value) -> Option<TransportError> {
    if event.get("result").is_some() {
        return None;
    }
    let err = event.get("error")?;
    Some(TransportError::Rpc {
        code: err.get("code").and_then(Value::as_i64).unwrap_or_default(),
        message: err
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string(),
    })
}

fn first_content_text(value: &Value) -> Option<String> {
    value
        .get("content")?
        .as_array()?
        .first()?
        .get("text")?
        .as_str()
        .map(str::to_string)
}

fn unwrap_content(event: Value) -> Value {
    let result = match event.get("result") {
        Some(result) => result,
        None => return event,
    };
    let Some(mut text) = first_content_text(result) else {
        return result.clone();
    };

    // Last layer that parsed; returned whole when the text it wraps does not.
    let mut layer: Option<Value> = None;
    for _ in 0..MAX_NESTED_LEVELS {
        let Ok(inner) = serde_json::from_str::<Value>(&text) else {
            return layer.unwrap_or(Value::String(text));
        };
        match first_content_text(&inner) {
            Some(next) => {
                text = next;
                layer = Some(inner);
            }
            None => return inner,
        }
    }

    match serde_json::from_str(&text) {
        Ok(value) => value,
        Err(_) => layer.unwrap_or(Value::String(text)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sse(event: &Value) -> String {
        format!("event: message\ndata: {event}\n\n")
    }

    fn text_layer(payload: &Value) -> Value {
        json!({ "content": [{ "type": "text", "text": payload.to_string() }] })
    }

    fn rpc(result: Value) -> Value {
        json!({ "jsonrpc": "2.0", "id": 1, "result": result })
    }

    #[test]
    fn plain_json_passes_through() {
        let doc = json!({ "contacts": [{ "id": "c1" }], "total": 1 });
        assert_eq!(unwrap(&doc.to_string()).unwrap(), doc);

        let arr = json!([1, "two", null]);
        assert_eq!(unwrap(&arr.to_string()).unwrap(), arr);

        let rpc_shaped = rpc(text_layer(&json!({ "x": 1 })));
        assert_eq!(unwrap(&rpc_shaped.to_string()).unwrap(), rpc_shaped);
    }

    #[test]
    fn zero_string_layers_returns_result() {
        let payload = json!({ "ok": true });
        let body = sse(&rpc(payload.clone()));
        assert_eq!(unwrap(&body).unwrap(), payload);
    }

    #[test]
    fn one_string_layer_is_unwrapped() {
        let payload = json!({ "contact": { "id": "c1", "tags": ["vip"] } });
        let body = sse(&rpc(text_layer(&payload)));
        assert_eq!(unwrap(&body).unwrap(), payload);
    }

    #[test]
    fn two_string_layers_are_unwrapped() {
        let payload = json!({ "events": [{ "id": "e1" }], "traceId": "t" });
        let body = sse(&rpc(text_layer(&text_layer(&payload))));
        assert_eq!(unwrap(&body).unwrap(), payload);
    }

    #[test]
    fn three_string_layers_are_unwrapped() {
        let payload = json!({ "deep": 3 });
        let body = sse(&rpc(text_layer(&text_layer(&text_layer(&payload)))));
        assert_eq!(unwrap(&body).unwrap(), payload);
    }

    #[test]
    fn unwrapping_stops_past_the_depth_cap() {
        let payload = json!({ "deep": 4 });
        let four = text_layer(&text_layer(&text_layer(&text_layer(&payload))));
        let body = sse(&rpc(four));
        let out = unwrap(&body).unwrap();
        assert_eq!(out, text_layer(&payload));
    }

    #[test]
    fn non_json_text_falls_back_to_string() {
        let result = json!({ "content": [{ "type": "text", "text": "Contact updated" }] });
        let body = sse(&rpc(result));
        assert_eq!(unwrap(&body).unwrap(), json!("Contact updated"));
    }

    #[test]
    fn non_json_inner_text_keeps_the_enclosing_layer() {
        let inner = json!({ "content": [{ "type": "text", "text": "not { json" }] });
        let body = sse(&rpc(text_layer(&inner)));
        assert_eq!(unwrap(&body).unwrap(), inner);
    }

    #[test]
    fn sibling_fields_survive_a_plain_text_inner_layer() {
        let inner = json!({
            "content": [{ "type": "text", "text": "Message queued" }],
            "messageId": "m1"
        });
        let body = sse(&rpc(text_layer(&inner)));
        let out = unwrap(&body).unwrap();
        assert_eq!(out["messageId"], "m1");
        assert_eq!(out, inner);
    }

    #[test]
    fn first_parsing_data_line_wins() {
        let body = format!(
            "event: message\ndata: {{broken\ndata: {}\ndata: {}\n",
            rpc(json!({ "n": 1 })),
            rpc(json!({ "n": 2 }))
        );
        assert_eq!(unwrap(&body).unwrap(), json!({ "n": 1 }));
    }

    #[test]
    fn crlf_framing_is_accepted() {
        let body = format!("event: message\r\ndata: {}\r\n\r\n", rpc(json!({ "n": 1 })));
        assert_eq!(unwrap(&body).unwrap(), json!({ "n": 1 }));
    }

    #[test]
    fn malformed_sse_is_unparseable_with_excerpt() {
        let body = "event: message\ndata: {not json\n\n";
        match unwrap(body) {
            Err(TransportError::UnparseableEnvelope { excerpt }) => {
                assert!(!excerpt.is_empty());
                assert!(excerpt.starts_with("event:"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn sse_without_data_lines_is_unparseable() {
        assert!(matches!(
            unwrap("event: ping\n\n"),
            Err(TransportError::UnparseableEnvelope { .. })
        ));
    }

    #[test]
    fn garbage_plain_body_is_unparseable() {
        assert!(matches!(
            unwrap("<html>bad gateway</html>"),
            Err(TransportError::UnparseableEnvelope { .. })
        ));
    }

    #[test]
    fn rpc_error_object_is_surfaced() {
        let body = sse(&json!({ "jsonrpc": "2.0", "id": 1, "error": { "code": -32602, "message": "Invalid params" } }));
        assert_eq!(
            unwrap(&body),
            Err(TransportError::Rpc {
                code: -32602,
                message: "Invalid params".to_string()
            })
        );
    }

    #[test]
    fn tool_list_is_extracted_from_sse() {
        let event = rpc(json!({
            "tools": [
                { "name": "contacts_get-contact", "description": "Get contact", "inputSchema": { "type": "object" } },
                { "name": "locations_get-location" },
                { "description": "nameless" }
            ]
        }));
        let tools = parse_tool_list(&sse(&event)).unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "contacts_get-contact");
        assert_eq!(tools[1].description, "");
        assert_eq!(tools[1].input_schema, Value::Null);
    }

    #[test]
    fn tool_list_accepts_plain_json() {
        let event = rpc(json!({ "tools": [{ "name": "a" }] }));
        assert_eq!(parse_tool_list(&event.to_string()).unwrap().len(), 1);
    }

    #[test]
    fn tool_list_without_tools_is_unparseable() {
        let event = rpc(json!({ "items": [] }));
        assert!(matches!(
            parse_tool_list(&sse(&event)),
            Err(TransportError::UnparseableEnvelope { .. })
        ));
    }
}
