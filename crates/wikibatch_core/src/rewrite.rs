use std::fmt;

use anyhow::{Result, bail};
use serde::Serialize;

use crate::template::{TemplateField, TemplateInvocation, locate_templates, parse_template};

pub const FILE_PREFIX: &str = "File:";
pub const DEFAULT_DISPLAY_HINT: &str = "thumb";
pub const DEFAULT_UNKNOWN_MARKER: &str = "UNKNOWN";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnclassifiedReason {
    Malformed,
    UnknownMarker,
}

impl UnclassifiedReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::UnknownMarker => "unknown marker",
        }
    }
}

impl fmt::Display for UnclassifiedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteDecision {
    Rewrite(String),
    KeepUnchanged,
    Unclassified(UnclassifiedReason),
}

pub trait RewritePolicy {
    fn decide(&self, invocation: &TemplateInvocation) -> RewriteDecision;
}

/// Turns `{{ill|File:X|...}}` into `[[File:X|thumb]]`.
///
/// Only the first positional argument is consulted. Every other field is
/// dropped because a file reference wrapped in a link template carries no
/// recoverable language or caption data.
#[derive(Debug, Clone)]
pub struct MediaEmbedPolicy {
    display_hint: String,
}

impl MediaEmbedPolicy {
    pub fn new(display_hint: impl Into<String>) -> Self {
        Self {
            display_hint: display_hint.into(),
        }
    }
}

impl Default for MediaEmbedPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_DISPLAY_HINT)
    }
}

impl RewritePolicy for MediaEmbedPolicy {
    fn decide(&self, invocation: &TemplateInvocation) -> RewriteDecision {
        match invocation.first_positional() {
            Some(first) if first.starts_with(FILE_PREFIX) => {
                RewriteDecision::Rewrite(format!("[[{first}|{}]]", self.display_hint))
            }
            _ => RewriteDecision::KeepUnchanged,
        }
    }
}

/// Removes every invocation it is applied to.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveTemplatePolicy;

impl RewritePolicy for RemoveTemplatePolicy {
    fn decide(&self, _invocation: &TemplateInvocation) -> RewriteDecision {
        RewriteDecision::Rewrite(String::new())
    }
}

pub trait LanguageCodePredicate {
    fn is_language_code(&self, candidate: &str) -> bool;
}

/// Two or three ASCII letters of either case after trimming. A shape check,
/// not a validated ISO 639 list. Non-ASCII letters are rejected so that short
/// CJK titles are not read as codes.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicLanguageCode;

impl LanguageCodePredicate for HeuristicLanguageCode {
    fn is_language_code(&self, candidate: &str) -> bool {
        let trimmed = candidate.trim();
        (2..=3).contains(&trimmed.len()) && trimmed.bytes().all(|byte| byte.is_ascii_alphabetic())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LanguagePair {
    pub language: String,
    pub title: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LanguageExtraction {
    pub pairs: Vec<LanguagePair>,
    pub orphaned_codes: Vec<String>,
    pub numeric_keys: Vec<String>,
}

impl LanguageExtraction {
    pub fn needs_review(&self) -> bool {
        !self.orphaned_codes.is_empty() || !self.numeric_keys.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LanguageClassification {
    Extracted(LanguageExtraction),
    Unclassified { reason: UnclassifiedReason },
}

/// Single left-to-right walk over the fields after the first one.
///
/// A field whose value looks like a language code is paired with the next
/// field when that field is positional; the paired field is consumed. A code
/// with nothing positional after it is reported as orphaned.
pub fn extract_language_pairs<P>(
    invocation: &TemplateInvocation,
    predicate: &P,
    unknown_marker: &str,
) -> LanguageClassification
where
    P: LanguageCodePredicate + ?Sized,
{
    if invocation.contains_marker(unknown_marker) {
        return LanguageClassification::Unclassified {
            reason: UnclassifiedReason::UnknownMarker,
        };
    }

    let mut extraction = LanguageExtraction {
        numeric_keys: invocation
            .numeric_named_keys()
            .into_iter()
            .map(ToString::to_string)
            .collect(),
        ..LanguageExtraction::default()
    };

    let rest = invocation.fields().get(1..).unwrap_or_default();
    let mut cursor = 0usize;
    while cursor < rest.len() {
        let candidate = rest[cursor].value();
        if predicate.is_language_code(candidate) {
            let code = candidate.trim().to_string();
            if let Some(TemplateField::Positional { value, .. }) = rest.get(cursor + 1) {
                extraction.pairs.push(LanguagePair {
                    language: code,
                    title: value.clone(),
                });
                cursor += 2;
                continue;
            }
            extraction.orphaned_codes.push(code);
        }
        cursor += 1;
    }

    LanguageClassification::Extracted(extraction)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Replacement {
    pub start: usize,
    pub end: usize,
    pub original: String,
    pub replacement: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnclassifiedInvocation {
    pub start: usize,
    pub text: String,
    pub reason: UnclassifiedReason,
}

/// The edits computed for one page. Built, applied once, then dropped.
#[derive(Debug, Clone)]
pub struct PageEditUnit {
    pub title: String,
    pub original_text: String,
    pub replacements: Vec<Replacement>,
    pub unclassified: Vec<UnclassifiedInvocation>,
}

impl PageEditUnit {
    pub fn new(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            original_text: text.into(),
            replacements: Vec::new(),
            unclassified: Vec::new(),
        }
    }

    /// Register a replacement of `start..end`. Spans may not overlap.
    pub fn replace(&mut self, start: usize, end: usize, replacement: impl Into<String>) -> Result<()> {
        if start > end || end > self.original_text.len() {
            bail!("replacement span {start}..{end} is out of bounds for {}", self.title);
        }
        if !self.original_text.is_char_boundary(start) || !self.original_text.is_char_boundary(end)
        {
            bail!("replacement span {start}..{end} splits a character in {}", self.title);
        }
        let overlaps = self.replacements.iter().any(|existing| {
            (start < existing.end && existing.start < end)
                || (start == end && existing.start == start && existing.end == end)
        });
        if overlaps {
            bail!("replacement span {start}..{end} overlaps an earlier edit in {}", self.title);
        }

        let position = self
            .replacements
            .partition_point(|existing| (existing.start, existing.end) < (start, end));
        self.replacements.insert(
            position,
            Replacement {
                start,
                end,
                original: self.original_text[start..end].to_string(),
                replacement: replacement.into(),
            },
        );
        Ok(())
    }

    pub fn mark_unclassified(&mut self, start: usize, text: &str, reason: UnclassifiedReason) {
        self.unclassified.push(UnclassifiedInvocation {
            start,
            text: text.to_string(),
            reason,
        });
    }

    pub fn has_changes(&self) -> bool {
        self.replacements
            .iter()
            .any(|replacement| replacement.original != replacement.replacement)
    }

    pub fn apply(&self) -> String {
        let mut out = String::with_capacity(self.original_text.len());
        let mut cursor = 0usize;
        for replacement in &self.replacements {
            out.push_str(&self.original_text[cursor..replacement.start]);
            out.push_str(&replacement.replacement);
            cursor = replacement.end;
        }
        out.push_str(&self.original_text[cursor..]);
        out
    }
}

/// Run `policy` over every invocation of the named templates in `text`.
pub fn plan_template_rewrites<P>(
    title: &str,
    text: &str,
    template_names: &[String],
    policy: &P,
) -> PageEditUnit
where
    P: RewritePolicy + ?Sized,
{
    let mut unit = PageEditUnit::new(title, text);
    for span in locate_templates(text, template_names) {
        let raw = span.slice(text);
        let decision = match parse_template(raw) {
            Ok(invocation) => policy.decide(&invocation),
            Err(_) => RewriteDecision::Unclassified(UnclassifiedReason::Malformed),
        };
        match decision {
            RewriteDecision::Rewrite(replacement) if replacement != raw => {
                // Spans from locate_templates never overlap.
                if unit.replace(span.start, span.end, replacement).is_err() {
                    unit.mark_unclassified(span.start, raw, UnclassifiedReason::Malformed);
                }
            }
            RewriteDecision::Rewrite(_) | RewriteDecision::KeepUnchanged => {}
            RewriteDecision::Unclassified(reason) => unit.mark_unclassified(span.start, raw, reason),
        }
    }
    unit
}

/// Raw text of every named template that carries `marker` anywhere, malformed
/// invocations included.
pub fn find_marked_templates(text: &str, template_names: &[String], marker: &str) -> Vec<String> {
    if marker.is_empty() {
        return Vec::new();
    }
    locate_templates(text, template_names)
        .into_iter()
        .map(|span| span.slice(text))
        .filter(|raw| raw.contains(marker))
        .map(ToString::to_string)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateLanguages {
    pub template: String,
    pub classification: LanguageClassification,
}

pub fn scan_language_pairs<P>(
    text: &str,
    template_names: &[String],
    predicate: &P,
    unknown_marker: &str,
) -> Vec<TemplateLanguages>
where
    P: LanguageCodePredicate + ?Sized,
{
    locate_templates(text, template_names)
        .into_iter()
        .map(|span| {
            let raw = span.slice(text);
            let classification = match parse_template(raw) {
                Ok(invocation) => extract_language_pairs(&invocation, predicate, unknown_marker),
                Err(_) => LanguageClassification::Unclassified {
                    reason: UnclassifiedReason::Malformed,
                },
            };
            TemplateLanguages {
                template: raw.to_string(),
                classification,
            }
        })
        .collect()
}
