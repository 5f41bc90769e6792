use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Raised when an invocation's braces or brackets do not balance.
///
/// Never auto-repaired: callers leave the original text in place and report
/// the invocation for manual review.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed template at byte {offset}: {reason}")]
pub struct MalformedTemplate {
    pub reason: &'static str,
    pub offset: usize,
}

impl MalformedTemplate {
    fn new(reason: &'static str, offset: usize) -> Self {
        Self { reason, offset }
    }
}

/// One field of an invocation, in the order it appeared in the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TemplateField {
    Positional { index: usize, value: String },
    Named { key: String, value: String },
}

impl TemplateField {
    pub fn value(&self) -> &str {
        match self {
            Self::Positional { value, .. } | Self::Named { value, .. } => value,
        }
    }

    pub fn is_named(&self) -> bool {
        matches!(self, Self::Named { .. })
    }

    fn contains(&self, needle: &str) -> bool {
        match self {
            Self::Positional { value, .. } => value.contains(needle),
            Self::Named { key, value } => key.contains(needle) || value.contains(needle),
        }
    }
}

/// Parsed form of a single `{{name|...}}` construct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateInvocation {
    pub name: String,
    pub positional: Vec<String>,
    pub named: BTreeMap<String, String>,
    fields: Vec<TemplateField>,
}

impl TemplateInvocation {
    /// Every field in source order, duplicate named keys included.
    pub fn fields(&self) -> &[TemplateField] {
        &self.fields
    }

    pub fn first_positional(&self) -> Option<&str> {
        self.positional.first().map(String::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.named.get(key).map(String::as_str)
    }

    pub fn contains_marker(&self, marker: &str) -> bool {
        !marker.is_empty() && self.fields.iter().any(|field| field.contains(marker))
    }

    /// Named keys made only of digits. These may be mis-ordered positional
    /// arguments from another template dialect, so they are kept as named and
    /// surfaced for manual reclassification.
    pub fn numeric_named_keys(&self) -> Vec<&str> {
        self.named
            .keys()
            .filter(|key| !key.is_empty() && key.bytes().all(|byte| byte.is_ascii_digit()))
            .map(String::as_str)
            .collect()
    }

    pub fn to_wikitext(&self) -> String {
        let mut out = String::with_capacity(self.name.len() + 4);
        out.push_str("{{");
        out.push_str(&self.name);
        for value in &self.positional {
            out.push('|');
            out.push_str(value);
        }
        for (key, value) in &self.named {
            out.push('|');
            out.push_str(key);
            out.push('=');
            out.push_str(value);
        }
        out.push_str("}}");
        out
    }
}

impl fmt::Display for TemplateInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wikitext())
    }
}

#[derive(Debug, Clone, Copy)]
struct Segment {
    start: usize,
    end: usize,
    first_eq: Option<usize>,
}

/// Parse one invocation. `raw` must start with `{{` and end with the matching `}}`.
///
/// Field separators are `|` characters outside nested `[[...]]` links and
/// `{{...}}` templates and not escaped with `\`.
pub fn parse_template(raw: &str) -> Result<TemplateInvocation, MalformedTemplate> {
    if !raw.starts_with("{{") {
        return Err(MalformedTemplate::new("missing opening braces", 0));
    }
    if raw.len() < 4 || !raw.ends_with("}}") {
        return Err(MalformedTemplate::new("missing closing braces", raw.len()));
    }

    let bytes = raw.as_bytes();
    let interior_end = raw.len() - 2;
    let mut brace_depth = 0usize;
    let mut link_depth = 0usize;
    let mut segments = Vec::new();
    let mut current = Segment {
        start: 2,
        end: 2,
        first_eq: None,
    };

    let mut cursor = 2usize;
    while cursor < interior_end {
        let byte = bytes[cursor];
        let pair = cursor + 1 < interior_end && bytes[cursor + 1] == byte;
        match byte {
            b'\\' => {
                cursor += 2;
                continue;
            }
            b'{' if pair => {
                brace_depth += 1;
                cursor += 2;
                continue;
            }
            b'}' if pair => {
                if brace_depth == 0 {
                    return Err(MalformedTemplate::new("unbalanced closing braces", cursor));
                }
                brace_depth -= 1;
                cursor += 2;
                continue;
            }
            b'[' if pair => {
                link_depth += 1;
                cursor += 2;
                continue;
            }
            b']' if pair => {
                if link_depth == 0 {
                    return Err(MalformedTemplate::new("unbalanced closing brackets", cursor));
                }
                link_depth -= 1;
                cursor += 2;
                continue;
            }
            b'|' if brace_depth == 0 && link_depth == 0 => {
                current.end = cursor;
                segments.push(current);
                current = Segment {
                    start: cursor + 1,
                    end: cursor + 1,
                    first_eq: None,
                };
            }
            b'=' if brace_depth == 0 && link_depth == 0 && current.first_eq.is_none() => {
                current.first_eq = Some(cursor);
            }
            _ => {}
        }
        cursor += 1;
    }

    if brace_depth > 0 {
        return Err(MalformedTemplate::new("unclosed nested template", interior_end));
    }
    if link_depth > 0 {
        return Err(MalformedTemplate::new("unclosed link", interior_end));
    }
    current.end = interior_end;
    segments.push(current);

    let name = raw[segments[0].start..segments[0].end].trim();
    if name.is_empty() {
        return Err(MalformedTemplate::new("empty template name", 2));
    }

    let mut positional = Vec::new();
    let mut named = BTreeMap::new();
    let mut fields = Vec::with_capacity(segments.len() - 1);
    for (ordinal, segment) in segments[1..].iter().enumerate() {
        let value = &raw[segment.start..segment.end];
        let named_split = match segment.first_eq {
            Some(eq) if ordinal > 0 => {
                let key = raw[segment.start..eq].trim();
                if key.is_empty() {
                    None
                } else {
                    Some((key, &raw[eq + 1..segment.end]))
                }
            }
            _ => None,
        };

        match named_split {
            Some((key, value)) => {
                named.insert(key.to_string(), value.to_string());
                fields.push(TemplateField::Named {
                    key: key.to_string(),
                    value: value.to_string(),
                });
            }
            None => {
                fields.push(TemplateField::Positional {
                    index: positional.len(),
                    value: value.to_string(),
                });
                positional.push(value.to_string());
            }
        }
    }

    Ok(TemplateInvocation {
        name: name.to_string(),
        positional,
        named,
        fields,
    })
}

/// Byte range of one invocation inside a larger text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InvocationSpan {
    pub start: usize,
    pub end: usize,
}

impl InvocationSpan {
    pub fn slice<'a>(&self, text: &'a str) -> &'a str {
        &text[self.start..self.end]
    }
}

/// Isolate the top-level `{{...}}` invocations of `text` by brace depth.
///
/// `{{{...}}}` parameter references are tracked as their own frames, and
/// inside an invocation a `\` escapes the next byte, as in [`parse_template`].
/// An unterminated invocation yields a span running to the end of the text;
/// parsing that span fails with [`MalformedTemplate`].
pub fn scan_invocations(text: &str) -> Vec<InvocationSpan> {
    let bytes = text.as_bytes();
    let run_of = |at: usize, count: usize, brace: u8| {
        bytes
            .get(at..at + count)
            .is_some_and(|run| run.iter().all(|byte| *byte == brace))
    };
    let opens = |at: usize, count: usize| run_of(at, count, b'{');
    let closes = |at: usize, count: usize| run_of(at, count, b'}');

    let mut spans = Vec::new();
    let mut frames: Vec<BraceFrame> = Vec::new();
    let mut start = 0usize;
    let mut cursor = 0usize;

    while cursor < bytes.len() {
        if bytes[cursor] == b'\\' && !frames.is_empty() {
            cursor += 2;
            continue;
        }
        if opens(cursor, 2) {
            if frames.is_empty() {
                start = cursor;
            }
            let frame = if opens(cursor, 3) {
                BraceFrame::Parameter
            } else {
                BraceFrame::Template
            };
            cursor += frame.width();
            frames.push(frame);
            continue;
        }
        if let Some(frame) = frames.last().copied()
            && closes(cursor, frame.width())
        {
            frames.pop();
            cursor += frame.width();
            if frames.is_empty() && frame == BraceFrame::Template {
                spans.push(InvocationSpan { start, end: cursor });
            }
            continue;
        }
        cursor += 1;
    }

    if frames.first() == Some(&BraceFrame::Template) {
        spans.push(InvocationSpan {
            start,
            end: bytes.len(),
        });
    }
    spans
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BraceFrame {
    Template,
    Parameter,
}

impl BraceFrame {
    fn width(self) -> usize {
        match self {
            Self::Template => 2,
            Self::Parameter => 3,
        }
    }
}

/// Locate invocations of any template in `names`, descending into other
/// templates so that invocations nested in e.g. an infobox are found too.
pub fn locate_templates(text: &str, names: &[String]) -> Vec<InvocationSpan> {
    let mut out = Vec::new();
    collect_templates(text, 0, names, &mut out);
    out
}

fn collect_templates(text: &str, offset: usize, names: &[String], out: &mut Vec<InvocationSpan>) {
    for span in scan_invocations(text) {
        let raw = span.slice(text);
        let matched = peek_template_name(raw)
            .is_some_and(|name| names.iter().any(|wanted| template_name_matches(name, wanted)));
        if matched {
            out.push(InvocationSpan {
                start: offset + span.start,
                end: offset + span.end,
            });
            continue;
        }
        if raw.len() >= 4 && raw.ends_with("}}") {
            collect_templates(&raw[2..raw.len() - 2], offset + span.start + 2, names, out);
        }
    }
}

/// Read the template name without a full parse, so malformed invocations can
/// still be attributed to a template.
pub fn peek_template_name(raw: &str) -> Option<&str> {
    let body = raw.strip_prefix("{{")?;
    let end = body.find(['|', '}', '{']).unwrap_or(body.len());
    let name = body[..end].trim();
    if name.is_empty() { None } else { Some(name) }
}

/// Compare template names the way the wiki does: underscores equal spaces
/// and the first letter is case-insensitive.
pub fn template_name_matches(name: &str, wanted: &str) -> bool {
    let left = normalize_name(name);
    let right = normalize_name(wanted);
    let mut left_chars = left.chars();
    let mut right_chars = right.chars();
    match (left_chars.next(), right_chars.next()) {
        (Some(a), Some(b)) => {
            a.to_lowercase().eq(b.to_lowercase()) && left_chars.as_str() == right_chars.as_str()
        }
        (None, None) => true,
        _ => false,
    }
}

fn normalize_name(value: &str) -> String {
    let replaced = value.replace('_', " ");
    let trimmed = replaced.trim();
    trimmed
        .strip_prefix("Template:")
        .unwrap_or(trimmed)
        .trim()
        .to_string()
}
