use serde_json::Value;

/// One event in a provider's streaming response (spec.md §4.4).
///
/// `ProviderEvent.type` is this enum's discriminant; `content`/`tool_calls`
/// live on the variants that carry them. A provider implementation MUST
/// eventually emit `Done` or `Error`, even after an abort signal — the turn
/// loop waits on that to unwind cleanly rather than on the stream simply
/// ending.
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    ThinkingStart,
    ThinkingDelta { text: String },
    ThinkingEnd,
    TextDelta { text: String },
    ToolCall { id: String, name: String, input: Value },
    Usage { tokens_in: u32, tokens_out: u32 },
    Done {
        model: String,
        tokens_in: u32,
        tokens_out: u32,
        stop_reason: String,
    },
    Error { message: String },
}

/// Parse a single SSE line from a provider's streaming API.
/// SSE format: `event: <type>\ndata: <json>\n\n`
pub fn parse_sse_line(line: &str) -> Option<SseParsed> {
    if let Some(event_type) = line.strip_prefix("event: ") {
        Some(SseParsed::Event(event_type.to_string()))
    } else {
        line.strip_prefix("data: ")
            .map(|data| SseParsed::Data(data.to_string()))
    }
}

#[derive(Debug)]
pub enum SseParsed {
    Event(String),
    Data(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_event_and_data_lines() {
        assert!(matches!(parse_sse_line("event: message_start"), Some(SseParsed::Event(e)) if e == "message_start"));
        assert!(matches!(parse_sse_line("data: {\"a\":1}"), Some(SseParsed::Data(d)) if d == "{\"a\":1}"));
        assert!(parse_sse_line("").is_none());
    }
}
