//! Decoder output-line parsing
//!
//! multimon-ng speaks several dialects at once, even with `--json`
//! enabled: POCSAG and most FLEX pages arrive as one JSON object per
//! line, while FLEX continuation fragments and some builds fall back to
//! plain text in either a pipe-delimited or space-delimited shape.
//! Everything else on stdout is status chatter.
//!
//! Parsing is a fixed-priority cascade. A line that parses as JSON is
//! handled by the structured branch and never retried against the text
//! grammars, so precedence is deterministic. The text grammars are an
//! ordered list of matchers; the first to produce an event wins, and a
//! line matching none is dropped without error.

use lazy_static::lazy_static;
use log::trace;
use regex::Regex;
use serde_json::Value;

use crate::event::PageEvent;

/// FLEX text message-type codes that carry a payload
///
/// Tone-only and binary pages (`TON`, `BIN`, ...) have nothing worth
/// storing and are dropped.
const FLEX_PAYLOAD_TYPES: [&str; 2] = ["ALN", "NUM"];

lazy_static! {
    // FLEX|2006-09-08 00:19:01|1600/2/C/A|09.064|1234567|ALN|message
    static ref FLEX_PIPE: Regex =
        Regex::new(r"^FLEX\|[^|]*\|[^|]*\|[^|]*\|(\d+)\|([A-Z]+)\|(.*)")
            .expect("bad FLEX pipe regexp");

    // FLEX: 2006-09-08 00:19:01 1600/2/C/A 09.064 [1234567] ALN message
    static ref FLEX_SPACE: Regex =
        Regex::new(r"^FLEX(?:_NEXT)?:\s+.*\[(\d+)\]\s+(\w+)\s+(.*)")
            .expect("bad FLEX space regexp");

    // POCSAG1200: Address: 1234567 Function: 0 Alpha: message
    static ref POCSAG_TEXT: Regex = Regex::new(
        r"^(POCSAG\d+):\s+Address:\s+(\d+)\s+Function:\s+\d+\s+(?:Alpha|Numeric):\s*(.*)"
    )
    .expect("bad POCSAG regexp");

    // In-band markers multimon-ng substitutes for control bytes
    static ref CONTROL_MARKERS: Regex =
        Regex::new(r"<(?:NUL|SOH|STX|ETX|EOT|ESC)>").expect("bad marker regexp");
}

/// Text grammars in priority order; first match wins
const TEXT_GRAMMARS: &[fn(&str, &str) -> Option<PageEvent>] =
    &[flex_pipe, flex_space, pocsag_text];

/// Parse one line of decoder output for the named channel
///
/// Returns `None` for anything that is not a page: status chatter,
/// tone-only pages, unknown formats, and pages whose content cleans
/// down to nothing.
pub fn parse_line(channel: &str, line: &str) -> Option<PageEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<Value>(line) {
        return from_json(channel, &value);
    }

    let event = TEXT_GRAMMARS
        .iter()
        .find_map(|grammar| grammar(channel, line));
    if event.is_none() {
        trace!("[{channel}] unparsed decoder line: {line}");
    }
    event
}

/// Strip control markers and non-printable bytes, then trim
///
/// Only conventional printable ASCII (0x20..=0x7E) survives. Cleaning
/// an already-clean string returns it unchanged.
pub fn clean_content(raw: &str) -> String {
    let stripped = CONTROL_MARKERS.replace_all(raw, "");
    stripped
        .chars()
        .filter(|c| (' '..='~').contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}

fn from_json(channel: &str, value: &Value) -> Option<PageEvent> {
    let demod = value
        .get("demod_name")
        .and_then(Value::as_str)
        .unwrap_or("");

    if demod.starts_with("POCSAG") {
        // prefer alpha content; fall back to numeric when alpha is
        // absent or empty
        let content = value
            .get("alpha")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .or_else(|| value.get("numeric").and_then(Value::as_str))
            .unwrap_or("");
        let content = clean_content(content);
        if content.is_empty() {
            return None;
        }
        return Some(PageEvent {
            source: format!("{channel} ({demod})"),
            recipient: text_field(value, "address"),
            content,
        });
    }

    // flex_alphanumeric, flex_numeric, flex_tone_only
    if demod.starts_with("flex") {
        let content = clean_content(value.get("message").and_then(Value::as_str).unwrap_or(""));
        if content.is_empty() {
            return None;
        }
        let baud = text_field(value, "sync_baud");
        let source = if baud.is_empty() {
            format!("{channel} (FLEX)")
        } else {
            format!("{channel} (FLEX {baud})")
        };
        return Some(PageEvent {
            source,
            recipient: text_field(value, "capcode"),
            content,
        });
    }

    None
}

// Addresses and capcodes arrive as JSON numbers or strings depending
// on the demodulator; keep them as text either way.
fn text_field(value: &Value, key: &str) -> String {
    match value.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn flex_pipe(channel: &str, line: &str) -> Option<PageEvent> {
    let caps = FLEX_PIPE.captures(line)?;
    if !FLEX_PAYLOAD_TYPES.contains(&&caps[2]) {
        return None;
    }
    let content = clean_content(&caps[3]);
    if content.is_empty() {
        return None;
    }
    Some(PageEvent {
        source: format!("{channel} (FLEX)"),
        recipient: caps[1].to_string(),
        content,
    })
}

fn flex_space(channel: &str, line: &str) -> Option<PageEvent> {
    let caps = FLEX_SPACE.captures(line)?;
    if !FLEX_PAYLOAD_TYPES.contains(&&caps[2]) {
        return None;
    }
    let content = clean_content(&caps[3]);
    if content.is_empty() {
        return None;
    }
    Some(PageEvent {
        source: format!("{channel} (FLEX)"),
        recipient: caps[1].to_string(),
        content,
    })
}

fn pocsag_text(channel: &str, line: &str) -> Option<PageEvent> {
    let caps = POCSAG_TEXT.captures(line)?;
    let content = clean_content(&caps[3]);
    if content.is_empty() {
        return None;
    }
    Some(PageEvent {
        source: format!("{channel} ({})", &caps[1]),
        recipient: caps[2].to_string(),
        content,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_pocsag_prefers_alpha() {
        let line = r#"{"demod_name":"POCSAG1200","address":1234567,"function":0,"alpha":"Test Message","numeric":"911"}"#;
        let event = parse_line("Hospital", line).unwrap();
        assert_eq!(event.source, "Hospital (POCSAG1200)");
        assert_eq!(event.recipient, "1234567");
        assert_eq!(event.content, "Test Message");
    }

    #[test]
    fn structured_pocsag_falls_back_to_numeric() {
        let line = r#"{"demod_name":"POCSAG512","address":"88","alpha":"","numeric":"555 0199"}"#;
        let event = parse_line("Hospital", line).unwrap();
        assert_eq!(event.source, "Hospital (POCSAG512)");
        assert_eq!(event.recipient, "88");
        assert_eq!(event.content, "555 0199");
    }

    #[test]
    fn structured_flex_carries_baud_label() {
        let line = r#"{"demod_name":"flex_alphanumeric","capcode":7654321,"sync_baud":1600,"message":"Hello"}"#;
        let event = parse_line("Wide Area", line).unwrap();
        assert_eq!(event.source, "Wide Area (FLEX 1600)");
        assert_eq!(event.recipient, "7654321");
        assert_eq!(event.content, "Hello");
    }

    #[test]
    fn structured_tone_only_is_dropped() {
        let line = r#"{"demod_name":"flex_tone_only","capcode":1234,"sync_baud":1600,"message":""}"#;
        assert_eq!(parse_line("Wide Area", line), None);
    }

    #[test]
    fn valid_json_never_reaches_text_grammars() {
        // parses as JSON, matches no family, must not fall through
        assert_eq!(
            parse_line("ch", r#"{"demod_name":"AFSK1200","text":"nope"}"#),
            None
        );
        assert_eq!(parse_line("ch", "12345"), None);
    }

    #[test]
    fn pipe_flex_alphanumeric() {
        let line = "FLEX|2006-09-08 00:19:01|1600/2/C/A|09.064|7654321|ALN|Hello";
        let event = parse_line("Wide Area", line).unwrap();
        assert_eq!(event.source, "Wide Area (FLEX)");
        assert_eq!(event.recipient, "7654321");
        assert_eq!(event.content, "Hello");
    }

    #[test]
    fn pipe_flex_numeric() {
        let line = "FLEX|2006-09-08 00:19:01|1600/2/C/A|09.064|1000912|NUM|555 0147";
        let event = parse_line("Wide Area", line).unwrap();
        assert_eq!(event.content, "555 0147");
    }

    #[test]
    fn pipe_flex_tone_only_is_dropped() {
        let line = "FLEX|2006-09-08 00:19:01|1600/2/C/A|09.064|1234567|TON|";
        assert_eq!(parse_line("Wide Area", line), None);
    }

    #[test]
    fn space_flex_and_continuation() {
        let line = "FLEX: 2006-09-08 00:19:01 1600/2/C/A 09.064 [0012345] ALN Hello world";
        let event = parse_line("Wide Area", line).unwrap();
        assert_eq!(event.recipient, "0012345");
        assert_eq!(event.content, "Hello world");

        let next = "FLEX_NEXT: 2006-09-08 00:19:02 1600/2/C/A 09.064 [0012345] ALN and more";
        let event = parse_line("Wide Area", next).unwrap();
        assert_eq!(event.content, "and more");
    }

    #[test]
    fn space_flex_unknown_type_is_dropped() {
        let line = "FLEX: 2006-09-08 00:19:01 1600/2/C/A 09.064 [0012345] BIN 0x00ff";
        assert_eq!(parse_line("Wide Area", line), None);
    }

    #[test]
    fn pocsag_text_alpha() {
        let line = "POCSAG1200: Address: 1234567 Function: 3 Alpha: Hello world<ETX>";
        let event = parse_line("Hospital", line).unwrap();
        assert_eq!(event.source, "Hospital (POCSAG1200)");
        assert_eq!(event.recipient, "1234567");
        assert_eq!(event.content, "Hello world");
    }

    #[test]
    fn pocsag_text_numeric() {
        let line = "POCSAG2400: Address: 42 Function: 0 Numeric: 555 0147";
        let event = parse_line("Hospital", line).unwrap();
        assert_eq!(event.source, "Hospital (POCSAG2400)");
        assert_eq!(event.recipient, "42");
        assert_eq!(event.content, "555 0147");
    }

    #[test]
    fn chatter_is_dropped() {
        assert_eq!(parse_line("ch", "Enabled demodulators: POCSAG1200"), None);
        assert_eq!(parse_line("ch", ""), None);
        assert_eq!(parse_line("ch", "   "), None);
    }

    #[test]
    fn cleaning_strips_markers_and_control_bytes() {
        assert_eq!(clean_content("Hello<ETX>"), "Hello");
        assert_eq!(clean_content("<STX>Hello<EOT>"), "Hello");
        assert_eq!(clean_content("He\u{7}llo\u{0}"), "Hello");
        assert_eq!(clean_content("  padded  "), "padded");
        assert_eq!(clean_content("caf\u{e9}"), "caf");
    }

    #[test]
    fn cleaning_is_idempotent() {
        for raw in ["Hello<ETX> wor\u{7}ld ", "already clean", "<NUL>", ""] {
            let once = clean_content(raw);
            assert_eq!(clean_content(&once), once);
        }
    }

    #[test]
    fn empty_after_cleaning_is_dropped() {
        let line = "POCSAG1200: Address: 7 Function: 0 Alpha: <ETX>";
        assert_eq!(parse_line("ch", line), None);
    }
}
