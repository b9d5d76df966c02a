//! Tests for devtwin-llm: message shapes and wire serialization

use devtwin_llm::*;
use serde_json::json;

#[test]
fn tool_use_block_serializes_with_type_tag() {
    let message = ChatMessage::assistant_with_tools(
        "let me look",
        &[ToolCall {
            id: "toolu_1".into(),
            name: "read_file".into(),
            args: json!({"path": "src/lib.rs"}),
        }],
    );
    let value = serde_json::to_value(&message).unwrap();
    assert_eq!(value["role"], "assistant");
    assert_eq!(value["content"][0]["type"], "text");
    assert_eq!(value["content"][1]["type"], "tool_use");
    assert_eq!(value["content"][1]["name"], "read_file");
    assert_eq!(value["content"][1]["input"]["path"], "src/lib.rs");
}

#[test]
fn tool_result_error_flag_is_omitted_when_false() {
    let ok = serde_json::to_value(ChatMessage::tool_result("c1", "fine", false)).unwrap();
    assert!(ok["content"][0].get("is_error").is_none());

    let err = serde_json::to_value(ChatMessage::tool_result("c1", "boom", true)).unwrap();
    assert_eq!(err["content"][0]["is_error"], true);
}

#[test]
fn content_roundtrips_from_wire_shapes() {
    let text: ChatMessage = serde_json::from_value(json!({
        "role": "user",
        "content": "plain string"
    }))
    .unwrap();
    assert_eq!(text.text(), "plain string");

    let blocks: ChatMessage = serde_json::from_value(json!({
        "role": "assistant",
        "content": [
            {"type": "text", "text": "hello "},
            {"type": "tool_use", "id": "c1", "name": "shell", "input": {"command": "ls"}}
        ]
    }))
    .unwrap();
    assert_eq!(blocks.text(), "hello ");
    match &blocks.content {
        MessageContent::Blocks(b) => assert_eq!(b.len(), 2),
        other => panic!("expected blocks, got {other:?}"),
    }
}

#[test]
fn coerce_text_flattens_part_lists() {
    assert_eq!(coerce_text(&json!("s")), "s");
    assert_eq!(
        coerce_text(&json!([{"type": "text", "text": "a"}, {"value": "b"}, {"type": "image"}])),
        "ab"
    );
    assert_eq!(coerce_text(&json!({"text": "t"})), "t");
    assert_eq!(coerce_text(&json!(null)), "");
}

#[test]
fn request_omits_unset_fields() {
    let request = ChatRequest {
        model: "m".into(),
        messages: vec![ChatMessage::user("hi")],
        ..Default::default()
    };
    let value = serde_json::to_value(&request).unwrap();
    assert!(value.get("tools").is_none());
    assert!(value.get("system").is_none());
    assert!(value.get("temperature").is_none());
    assert_eq!(value["max_tokens"], 8192);
}
