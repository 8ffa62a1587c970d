//! Parses inline `[[...]]` directives out of streaming LLM output.
//!
//! The model is free to emit media links, reply-routing hints, and a silent
//! token anywhere in its text, possibly split across chunk boundaries. This
//! module strips those directives from the visible text and surfaces them as
//! structured fields so the channel-send path can act on them.

use regex::Regex;
use std::sync::LazyLock;

/// Default token a model can emit (as prefix or suffix) to suppress a reply.
pub const SILENT_REPLY_TOKEN: &str = "NO_REPLY";

static MEDIA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\[\[(image|audio|video|file):([^\]]+)\]\]").unwrap());
static VOICE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\[\[audio_as_voice\]\]").unwrap());
static SILENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\[\[silent\]\]").unwrap());
static REPLY_CURRENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\[\[reply_to_current\]\]").unwrap());
static REPLY_TO_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\[\[reply_to:([^\]]+)\]\]").unwrap());
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Media extracted from a text chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct MediaParse {
    text: String,
    media_url: Option<String>,
    media_urls: Vec<String>,
    audio_as_voice: bool,
}

fn split_media_from_output(text: &str) -> MediaParse {
    if text.is_empty() {
        return MediaParse::default();
    }

    let mut media_urls = Vec::new();
    let cleaned = MEDIA_RE.replace_all(text, |caps: &regex::Captures| {
        let url = caps[2].trim();
        if !url.is_empty() {
            media_urls.push(url.to_string());
        }
        ""
    });

    let audio_as_voice = VOICE_RE.is_match(&cleaned);
    let cleaned = VOICE_RE.replace_all(&cleaned, "");
    let cleaned = WHITESPACE_RE.replace_all(cleaned.trim(), " ").into_owned();

    MediaParse {
        media_url: (media_urls.len() == 1).then(|| media_urls[0].clone()),
        media_urls: if media_urls.len() > 1 { media_urls } else { Vec::new() },
        audio_as_voice,
        text: cleaned,
    }
}

/// Reply-routing and silence directives parsed out of a text chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct InlineDirectives {
    text: String,
    has_reply_tag: bool,
    reply_to_id: Option<String>,
    reply_to_current: bool,
    is_silent: bool,
}

fn parse_inline_directives(text: &str) -> InlineDirectives {
    if text.is_empty() {
        return InlineDirectives::default();
    }

    let mut clean = text.to_string();
    let is_silent = SILENT_RE.is_match(&clean);
    if is_silent {
        clean = SILENT_RE.replace_all(&clean, "").into_owned();
    }

    let mut has_reply_tag = false;
    let mut reply_to_current = false;
    if REPLY_CURRENT_RE.is_match(&clean) {
        has_reply_tag = true;
        reply_to_current = true;
        clean = REPLY_CURRENT_RE.replace_all(&clean, "").into_owned();
    }

    let mut reply_to_id = None;
    if let Some(caps) = REPLY_TO_RE.captures(&clean) {
        has_reply_tag = true;
        reply_to_id = Some(caps[1].trim().to_string());
        clean = REPLY_TO_RE.replace(&clean, "").into_owned();
    }

    let clean = WHITESPACE_RE.replace_all(clean.trim(), " ").into_owned();

    InlineDirectives {
        text: clean,
        has_reply_tag,
        reply_to_id,
        reply_to_current,
        is_silent,
    }
}

/// Returns true if `text` starts or ends with `token`, word-bounded.
fn is_silent_reply_text(text: &str, token: &str) -> bool {
    if text.is_empty() {
        return false;
    }
    let escaped = regex::escape(token);
    let prefix = Regex::new(&format!(r"(?i)^\s*{escaped}(?:$|\W)")).unwrap();
    if prefix.is_match(text) {
        return true;
    }
    let suffix = Regex::new(&format!(r"(?i)\b{escaped}\b\W*$")).unwrap();
    suffix.is_match(text)
}

/// One parsed directive payload ready for channel delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplyDirectiveParseResult {
    pub text: String,
    pub media_url: Option<String>,
    pub media_urls: Vec<String>,
    pub reply_to_id: Option<String>,
    pub reply_to_current: bool,
    pub reply_to_tag: bool,
    pub audio_as_voice: bool,
    pub is_silent: bool,
}

impl ReplyDirectiveParseResult {
    fn has_renderable_content(&self) -> bool {
        !self.text.is_empty()
            || self.media_url.is_some()
            || !self.media_urls.is_empty()
            || self.audio_as_voice
    }
}

#[derive(Debug, Clone, Default)]
struct PendingReply {
    reply_to_id: Option<String>,
    reply_to_current: bool,
    has_tag: bool,
}

/// Split an unterminated trailing `[[...` directive off the end of `text`.
/// Returns `(text, tail)`; `tail` is empty unless `text` ends mid-directive.
fn split_trailing_directive(text: &str) -> (String, String) {
    let Some(open) = text.rfind("[[") else {
        return (text.to_string(), String::new());
    };
    if text[open + 2..].contains("]]") {
        return (text.to_string(), String::new());
    }
    (text[..open].to_string(), text[open..].to_string())
}

/// Incremental parser for directives in streaming LLM output.
///
/// Chunks may split a `[[...]]` directive across a chunk boundary, or split
/// a `[[reply_to:...]]` tag from the content it should attach to. The
/// accumulator buffers an unterminated tail and carries a reply binding
/// forward until a chunk produces renderable content to attach it to.
#[derive(Debug, Clone, Default)]
pub struct StreamingDirectiveAccumulator {
    pending_tail: String,
    pending_reply: PendingReply,
}

impl StreamingDirectiveAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.pending_tail.clear();
        self.pending_reply = PendingReply::default();
    }

    /// Feed a raw chunk of provider text output. `final_chunk` must be `true`
    /// on the last chunk of a turn so any buffered tail is flushed as text
    /// instead of held for a continuation that will never arrive.
    pub fn consume(&mut self, raw: &str, final_chunk: bool) -> Option<ReplyDirectiveParseResult> {
        self.consume_with_token(raw, final_chunk, SILENT_REPLY_TOKEN)
    }

    pub fn consume_with_token(
        &mut self,
        raw: &str,
        final_chunk: bool,
        silent_token: &str,
    ) -> Option<ReplyDirectiveParseResult> {
        let mut combined = std::mem::take(&mut self.pending_tail);
        combined.push_str(raw);

        if !final_chunk {
            let (text, tail) = split_trailing_directive(&combined);
            combined = text;
            self.pending_tail = tail;
        }

        if combined.is_empty() {
            return None;
        }

        let media = split_media_from_output(&combined);
        let reply = parse_inline_directives(&media.text);

        let mut text = reply.text;
        let is_silent = is_silent_reply_text(&text, silent_token) || reply.is_silent;
        if is_silent {
            text.clear();
        }

        let has_tag = self.pending_reply.has_tag || reply.has_reply_tag;
        let reply_to_current = self.pending_reply.reply_to_current || reply.reply_to_current;
        let reply_to_id = reply.reply_to_id.or_else(|| self.pending_reply.reply_to_id.clone());

        let result = ReplyDirectiveParseResult {
            text,
            media_url: media.media_url,
            media_urls: media.media_urls,
            reply_to_id,
            reply_to_current,
            reply_to_tag: has_tag,
            audio_as_voice: media.audio_as_voice,
            is_silent,
        };

        if !result.has_renderable_content() {
            self.pending_reply = if has_tag {
                PendingReply {
                    reply_to_id: result.reply_to_id,
                    reply_to_current,
                    has_tag,
                }
            } else {
                PendingReply::default()
            };
            return None;
        }

        self.pending_reply = PendingReply::default();
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_media_and_reports_single_url() {
        let parsed = split_media_from_output("check this [[image:https://x/y.png]] out");
        assert_eq!(parsed.text, "check this out");
        assert_eq!(parsed.media_url.as_deref(), Some("https://x/y.png"));
        assert!(parsed.media_urls.is_empty());
    }

    #[test]
    fn multiple_media_urls_go_to_media_urls() {
        let parsed = split_media_from_output("[[image:a]] and [[video:b]]");
        assert_eq!(parsed.media_url, None);
        assert_eq!(parsed.media_urls, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn reply_to_id_is_extracted_and_stripped() {
        let reply = parse_inline_directives("hello [[reply_to:msg-123]] world");
        assert_eq!(reply.text, "hello world");
        assert_eq!(reply.reply_to_id.as_deref(), Some("msg-123"));
        assert!(reply.has_reply_tag);
    }

    #[test]
    fn silent_reply_token_prefix_and_suffix() {
        assert!(is_silent_reply_text("NO_REPLY", "NO_REPLY"));
        assert!(is_silent_reply_text("NO_REPLY because nothing to say", "NO_REPLY"));
        assert!(is_silent_reply_text("nothing to add NO_REPLY", "NO_REPLY"));
        assert!(!is_silent_reply_text("this has NO_REPLYISH in it", "NO_REPLY"));
    }

    #[test]
    fn split_trailing_directive_buffers_incomplete_tag() {
        let (text, tail) = split_trailing_directive("hello [[image:http");
        assert_eq!(text, "hello ");
        assert_eq!(tail, "[[image:http");
    }

    #[test]
    fn split_trailing_directive_leaves_complete_tag_whole() {
        let (text, tail) = split_trailing_directive("hello [[image:x]]");
        assert_eq!(text, "hello [[image:x]]");
        assert_eq!(tail, "");
    }

    #[test]
    fn accumulator_joins_directive_split_across_chunks() {
        let mut acc = StreamingDirectiveAccumulator::new();
        assert!(acc.consume("here is a pic [[image:http", false).is_none());
        let result = acc.consume("s://x/y.png]]", true).unwrap();
        assert_eq!(result.text, "here is a pic");
        assert_eq!(result.media_url.as_deref(), Some("https://x/y.png"));
    }

    #[test]
    fn accumulator_carries_reply_binding_until_renderable_content() {
        let mut acc = StreamingDirectiveAccumulator::new();
        assert!(acc.consume("[[reply_to:abc]]", false).is_none());
        let result = acc.consume("now the actual reply", true).unwrap();
        assert_eq!(result.text, "now the actual reply");
        assert_eq!(result.reply_to_id.as_deref(), Some("abc"));
        assert!(result.reply_to_tag);
    }

    #[test]
    fn silent_directive_yields_no_renderable_result() {
        let mut acc = StreamingDirectiveAccumulator::new();
        assert!(acc.consume("[[silent]]", true).is_none());
    }

    #[test]
    fn silent_token_suppresses_text_but_keeps_media() {
        let mut acc = StreamingDirectiveAccumulator::new();
        let result = acc.consume("[[image:x]] NO_REPLY", true).unwrap();
        assert!(result.text.is_empty());
        assert_eq!(result.media_url.as_deref(), Some("x"));
        assert!(result.is_silent);
    }

    #[test]
    fn reset_clears_pending_state() {
        let mut acc = StreamingDirectiveAccumulator::new();
        acc.consume("[[reply_to:abc]]", false);
        acc.reset();
        let result = acc.consume("plain text", true).unwrap();
        assert_eq!(result.reply_to_id, None);
        assert!(!result.reply_to_tag);
        assert_eq!(result.text, "plain text");
    }
}
