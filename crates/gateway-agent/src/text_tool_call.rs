//! Extracts a text-embedded tool call (`<tool_call>{"name":…,"arguments":…}`)
//! from accumulated content when the model emits the call as plain text
//! rather than structured deltas.

/// Find the first balanced `{...}` object in `text`, scanning brace depth
/// and skipping over quoted-string contents (including escapes) so braces
/// inside string values don't throw off the count.
#[must_use]
pub fn extract_json_object(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let start = bytes.iter().position(|&b| b == b'{')?;

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + 1;
                    return text.get(start..end).map(str::to_string);
                }
            }
            _ => {}
        }
    }
    None
}
