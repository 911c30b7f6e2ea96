// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Benjamin Chess
//! Line-oriented SSE field parser (spec §4.6): `id:`, `event:`, `data:`,
//! `retry:` fields separated by blank lines, multi-line `data:` values
//! concatenated with `\n`. Unknown fields are ignored rather than rejected.

/// One parsed server-sent event.
#[derive(Clone, Debug, PartialEq)]
pub struct SseEvent {
    pub id: Option<String>,
    pub event: Option<String>,
    pub data: String,
    pub retry: Option<u64>,
}

#[derive(Default)]
pub struct Parser {
    id: Option<String>,
    event: Option<String>,
    data: Vec<String>,
    retry: Option<u64>,
}

impl Parser {
    pub fn new() -> Self {
        Parser::default()
    }

    /// Feeds one line (no trailing `\n`/`\r`). A blank line flushes the
    /// accumulated fields into an event, unless nothing was accumulated
    /// (two consecutive blank lines, or leading blank lines, produce
    /// nothing).
    pub fn push_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            if self.id.is_none() && self.event.is_none() && self.retry.is_none() && self.data.is_empty() {
                return None;
            }
            let event = SseEvent {
                id: self.id.take(),
                event: self.event.take(),
                data: self.data.join("\n"),
                retry: self.retry.take(),
            };
            self.data.clear();
            return Some(event);
        }

        if line.starts_with(':') {
            // A comment line; SSE keepalives look like this.
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };

        match field {
            "id" => self.id = Some(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "retry" => self.retry = value.parse().ok(),
            _ => {}
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(lines: &[&str]) -> Vec<SseEvent> {
        let mut p = Parser::new();
        lines.iter().filter_map(|l| p.push_line(l)).collect()
    }

    #[test]
    fn single_line_event() {
        let events = parse_all(&["id: 1", "event: message", "data: hello", ""]);
        assert_eq!(
            events,
            vec![SseEvent { id: Some("1".to_string()), event: Some("message".to_string()), data: "hello".to_string(), retry: None }]
        );
    }

    #[test]
    fn multiline_data_concatenates_with_newline() {
        let events = parse_all(&["data: line one", "data: line two", ""]);
        assert_eq!(events[0].data, "line one\nline two");
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let events = parse_all(&["foo: bar", "data: payload", ""]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "payload");
    }

    #[test]
    fn blank_line_with_nothing_accumulated_produces_no_event() {
        let events = parse_all(&["", "", "data: x", ""]);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn comment_lines_are_ignored() {
        let events = parse_all(&[":keepalive", "data: payload", ""]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "payload");
    }

    #[test]
    fn retry_field_parses_to_u64() {
        let events = parse_all(&["retry: 3000", "data: x", ""]);
        assert_eq!(events[0].retry, Some(3000));
    }
}
