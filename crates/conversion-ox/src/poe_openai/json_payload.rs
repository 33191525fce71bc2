//! Reading the OpenAI-shaped structures bots put inside `json` events.

use serde_json::{Map, Value};

/// One tool call entry as a bot sent it; every field is optional on the wire
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct PoeToolCall {
    /// Explicit position in the tool call list, if the bot sent one
    pub index: Option<u32>,
    /// Tool call identifier
    pub id: Option<String>,
    /// Tool call type, normally `function`
    pub r#type: Option<String>,
    /// Function name
    pub name: Option<String>,
    /// Function arguments as a JSON string
    pub arguments: Option<String>,
}

/// What a `json` event's `data` object turned out to hold
#[derive(Debug, PartialEq)]
pub(crate) enum JsonShape {
    /// `data.choices[0].delta` with optional content and tool calls
    ChoiceDelta {
        /// Non-empty delta content
        content: Option<String>,
        /// Decoded tool calls, or why the list was rejected
        tool_calls: Option<Result<Vec<PoeToolCall>, String>>,
    },
    /// `data.tool_calls` at the top level
    ToolCalls(Result<Vec<PoeToolCall>, String>),
    /// `data.choices` is present but its first entry carries no delta
    EmptyChoices,
    /// Nothing recognizable
    Other,
}

/// Classify the `data` object of a `json` event
pub(crate) fn classify(data: Option<&Map<String, Value>>) -> JsonShape {
    let Some(data) = data else {
        return JsonShape::Other;
    };

    if let Some(choices) = data.get("choices").and_then(Value::as_array).filter(|c| !c.is_empty()) {
        let Some(delta) = choices[0].get("delta").and_then(Value::as_object) else {
            return JsonShape::EmptyChoices;
        };

        let content = delta
            .get("content")
            .and_then(Value::as_str)
            .filter(|content| !content.is_empty())
            .map(str::to_string);
        let tool_calls = delta
            .get("tool_calls")
            .and_then(Value::as_array)
            .map(|items| parse_tool_calls(items));

        return JsonShape::ChoiceDelta {
            content,
            tool_calls,
        };
    }

    if let Some(items) = data.get("tool_calls").and_then(Value::as_array) {
        return JsonShape::ToolCalls(parse_tool_calls(items));
    }

    JsonShape::Other
}

/// Decode a tool call list. A non-object entry rejects the whole list.
pub(crate) fn parse_tool_calls(items: &[Value]) -> Result<Vec<PoeToolCall>, String> {
    items
        .iter()
        .enumerate()
        .map(|(position, item)| {
            let Some(entry) = item.as_object() else {
                return Err(format!("tool_call item at index {position} is not an object"));
            };

            let function = entry.get("function").and_then(|function| {
                let map = function.as_object();
                if map.is_none() {
                    log::warn!("tool_call item {position}: 'function' is not an object");
                }
                map
            });

            Ok(PoeToolCall {
                index: entry
                    .get("index")
                    .and_then(Value::as_u64)
                    .and_then(|index| u32::try_from(index).ok()),
                id: string_field(entry, "id", position),
                r#type: string_field(entry, "type", position),
                name: function.and_then(|f| string_field(f, "name", position)),
                arguments: function.and_then(|f| string_field(f, "arguments", position)),
            })
        })
        .collect()
}

/// Read a string field, warning when it is present with another type
fn string_field(map: &Map<String, Value>, key: &str, position: usize) -> Option<String> {
    match map.get(key)? {
        Value::String(value) => Some(value.clone()),
        other => {
            log::warn!("tool_call item {position}: '{key}' is not a string: {other}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: &Value) -> &Map<String, Value> {
        value.as_object().unwrap()
    }

    #[test]
    fn test_classify_nested_choice_delta() {
        let data = json!({
            "choices": [{
                "delta": {
                    "content": "thinking",
                    "tool_calls": [{
                        "index": 1,
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "lookup", "arguments": "{\"q\":1}"}
                    }]
                }
            }]
        });

        let JsonShape::ChoiceDelta { content, tool_calls } = classify(Some(object(&data))) else {
            panic!("expected choice delta");
        };
        assert_eq!(content.as_deref(), Some("thinking"));
        let calls = tool_calls.unwrap().unwrap();
        assert_eq!(
            calls,
            vec![PoeToolCall {
                index: Some(1),
                id: Some("call_1".to_string()),
                r#type: Some("function".to_string()),
                name: Some("lookup".to_string()),
                arguments: Some("{\"q\":1}".to_string()),
            }]
        );
    }

    #[test]
    fn test_classify_top_level_tool_calls() {
        let data = json!({"tool_calls": [{"id": "call_2", "function": {"name": "f"}}]});
        let JsonShape::ToolCalls(Ok(calls)) = classify(Some(object(&data))) else {
            panic!("expected top-level tool calls");
        };
        assert_eq!(calls[0].id.as_deref(), Some("call_2"));
        assert_eq!(calls[0].arguments, None);
    }

    #[test]
    fn test_non_object_entry_rejects_list() {
        let result = parse_tool_calls(&[json!({"id": "ok"}), json!("nope")]);
        assert_eq!(result.unwrap_err(), "tool_call item at index 1 is not an object");
    }

    #[test]
    fn test_wrong_field_types_are_dropped() {
        let calls = parse_tool_calls(&[json!({"id": 7, "function": "x"})]).unwrap();
        assert_eq!(calls, vec![PoeToolCall::default()]);
    }

    #[test]
    fn test_classify_other_shapes() {
        assert_eq!(classify(None), JsonShape::Other);
        let data = json!({"choices": []});
        assert_eq!(classify(Some(object(&data))), JsonShape::Other);
        let data = json!({"choices": [{"index": 0}]});
        assert_eq!(classify(Some(object(&data))), JsonShape::EmptyChoices);
    }
}
