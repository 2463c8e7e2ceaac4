//! Trace-event line validation and id extraction.
//!
//! A valid event is a line that, after trimming ASCII whitespace and one
//! trailing comma, is at least [`MIN_EVENT_LEN`] bytes and parses as a JSON
//! object. The `[` and `]` wrapper lines of Chrome trace files fail the
//! length check. Validity and the id triple are separate notions: an event
//! can be valid JSON yet carry no usable integer id (then `id = -1` and it
//! is excluded from verification, but still written to output).

use serde::Deserialize;
use serde_json::Value;

use crate::types::EventId;
use crate::utils::config::MIN_EVENT_LEN;

#[derive(Deserialize)]
struct EventRecord {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    pid: Value,
    #[serde(default)]
    tid: Value,
}

/// Strip surrounding ASCII whitespace and one trailing comma.
pub fn trim_event(line: &[u8]) -> &[u8] {
    let mut s = line.trim_ascii();
    if let Some(rest) = s.strip_suffix(b",") {
        s = rest.trim_ascii_end();
    }
    s
}

/// Validate a line and extract its id triple. Returns the trimmed event
/// bytes and the `(id, pid, tid)` (defaulting to -1 for missing or
/// non-integer fields), or `None` when the line is not a valid event.
pub fn parse_event(line: &[u8]) -> Option<(&[u8], EventId)> {
    let trimmed = trim_event(line);
    if trimmed.len() < MIN_EVENT_LEN
        || trimmed.first() != Some(&b'{')
        || trimmed.last() != Some(&b'}')
    {
        return None;
    }
    let rec: EventRecord = serde_json::from_slice(trimmed).ok()?;
    Some((
        trimmed,
        EventId::new(
            rec.id.as_i64().unwrap_or(-1),
            rec.pid.as_i64().unwrap_or(-1),
            rec.tid.as_i64().unwrap_or(-1),
        ),
    ))
}

/// The accept/reject bit alone: trimmed event bytes when the line is valid.
pub fn validate_event(line: &[u8]) -> Option<&[u8]> {
    parse_event(line).map(|(trimmed, _)| trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_event() {
        let (trimmed, id) = parse_event(b"{\"id\":3,\"pid\":1,\"tid\":2}").unwrap();
        assert_eq!(trimmed, b"{\"id\":3,\"pid\":1,\"tid\":2}");
        assert_eq!(id, EventId::new(3, 1, 2));
    }

    #[test]
    fn trims_whitespace_and_trailing_comma() {
        let (trimmed, _) = parse_event(b"  {\"id\":0,\"pid\":1,\"tid\":2} ,\n").unwrap();
        assert_eq!(trimmed, b"{\"id\":0,\"pid\":1,\"tid\":2}");
    }

    #[test]
    fn rejects_wrapper_lines_and_fragments() {
        assert!(validate_event(b"[").is_none());
        assert!(validate_event(b"]").is_none());
        assert!(validate_event(b"").is_none());
        assert!(validate_event(b"{\"a\":1").is_none());
        assert!(validate_event(b"[1,2,3,4,5,6]").is_none());
        assert!(validate_event(b"not json at all").is_none());
    }

    #[test]
    fn missing_or_non_integer_ids_default_to_invalid() {
        let (_, id) = parse_event(b"{\"name\":\"compute\",\"ph\":\"X\"}").unwrap();
        assert_eq!(id.id, -1);
        assert!(!id.is_valid());

        let (_, id) = parse_event(b"{\"id\":\"abc\",\"pid\":4,\"tid\":5}").unwrap();
        assert_eq!(id, EventId::new(-1, 4, 5));
    }

    #[test]
    fn id_zero_is_valid() {
        let (_, id) = parse_event(b"{\"id\":0,\"pid\":1,\"tid\":2}").unwrap();
        assert!(id.is_valid());
    }
}
