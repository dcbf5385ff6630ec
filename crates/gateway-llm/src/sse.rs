//! Minimal server-sent-events line splitter for upstream chat-completions
//! streams: buffers raw bytes and yields each `data: ...` payload, skipping
//! keep-alive blanks and the terminal `[DONE]` sentinel.

use futures_core::stream::Stream;
use futures_util::StreamExt;

use gateway_core::LlmError;

pub fn sse_data_lines<B, E>(
    bytes: impl Stream<Item = Result<B, E>> + Send + 'static,
) -> impl Stream<Item = Result<String, LlmError>> + Send + 'static
where
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    async_stream::stream! {
        let mut buf = String::new();
        futures_util::pin_mut!(bytes);
        while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    yield Err(LlmError::Transport(e.to_string()));
                    return;
                }
            };
            let text = match std::str::from_utf8(chunk.as_ref()) {
                Ok(t) => t,
                Err(e) => {
                    yield Err(LlmError::MalformedChunk(e.to_string()));
                    continue;
                }
            };
            buf.push_str(text);

            while let Some(pos) = buf.find('\n') {
                let line = buf[..pos].trim_end_matches('\r').to_string();
                buf.drain(..=pos);
                let Some(payload) = line.strip_prefix("data:") else { continue };
                let payload = payload.trim();
                if payload.is_empty() || payload == "[DONE]" {
                    continue;
                }
                yield Ok(payload.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    async fn collect(input: Vec<&str>) -> Vec<String> {
        let chunks: Vec<Result<String, String>> = input.into_iter().map(|s| Ok(s.to_string())).collect();
        let lines = sse_data_lines(stream::iter(chunks));
        futures_util::pin_mut!(lines);
        let mut out = Vec::new();
        while let Some(item) = lines.next().await {
            out.push(item.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn extracts_data_payloads_and_skips_done_and_blank_keepalives() {
        let out = collect(vec!["data: {\"a\":1}\n\n", "data: \n", "data: [DONE]\n"]).await;
        assert_eq!(out, vec!["{\"a\":1}"]);
    }

    #[tokio::test]
    async fn a_payload_split_across_two_chunks_is_reassembled() {
        let out = collect(vec!["data: {\"a\":", "1}\n"]).await;
        assert_eq!(out, vec!["{\"a\":1}"]);
    }
}
