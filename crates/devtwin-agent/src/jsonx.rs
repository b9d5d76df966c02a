//! Extract the first JSON object embedded in free-form model output

use serde_json::Value;

/// Scan for the first balanced `{...}` region that parses as JSON. Models
/// often wrap their JSON in prose or code fences; this skips both.
pub fn extract_first_json_object(text: &str) -> Value {
    let bytes = text.as_bytes();
    let mut start = None;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' if start.is_some() => in_string = true,
            b'{' => {
                if start.is_none() {
                    start = Some(i);
                }
                depth += 1;
            }
            b'}' if start.is_some() => {
                depth -= 1;
                if depth == 0 {
                    let candidate = &text[start.expect("set with depth")..=i];
                    if let Ok(value) = serde_json::from_str::<Value>(candidate) {
                        return value;
                    }
                    start = None;
                }
            }
            _ => {}
        }
    }
    Value::Object(Default::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_from_prose_and_fences() {
        let text = "Here is the result:\n```json\n{\"steps\": [{\"id\": \"a\"}]}\n```\ndone";
        assert_eq!(extract_first_json_object(text), json!({"steps": [{"id": "a"}]}));
    }

    #[test]
    fn handles_braces_inside_strings() {
        let text = "{\"key\": \"value with } brace\"}";
        assert_eq!(
            extract_first_json_object(text),
            json!({"key": "value with } brace"})
        );
    }

    #[test]
    fn empty_object_on_no_json() {
        assert_eq!(extract_first_json_object("no json here"), json!({}));
    }
}
