use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use quick_xml::Reader;
use quick_xml::events::Event;

use crate::api::WikiReadApi;

/// Normalises a page title the way MediaWiki does for lookups: underscores
/// become spaces and surrounding whitespace is dropped.
pub fn normalize_title(raw: &str) -> String {
    raw.replace('_', " ").trim().to_string()
}

/// One title per line. Blank lines and `#` comments are skipped.
pub fn parse_title_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(normalize_title)
        .filter(|title| !title.is_empty())
        .collect()
}

pub fn load_title_list(path: &Path) -> Result<Vec<String>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(parse_title_list(&content))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CsvColumn {
    Name(String),
    Index(usize),
}

impl CsvColumn {
    /// A bare number selects by zero-based index, anything else by header name.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.parse::<usize>() {
            Ok(index) => Self::Index(index),
            Err(_) => Self::Name(trimmed.to_string()),
        }
    }

    fn resolve(&self, headers: &csv::StringRecord, path: &Path) -> Result<usize> {
        match self {
            Self::Index(index) => {
                if *index >= headers.len() {
                    bail!(
                        "column index {index} out of range in {} ({} columns)",
                        path.display(),
                        headers.len()
                    );
                }
                Ok(*index)
            }
            Self::Name(name) => headers
                .iter()
                .position(|header| header.trim().eq_ignore_ascii_case(name))
                .ok_or_else(|| {
                    anyhow::anyhow!("column `{name}` not found in {}", path.display())
                }),
        }
    }
}

/// Reads one column of a headered CSV file as page titles.
pub fn load_csv_column(path: &Path, column: &CsvColumn) -> Result<Vec<String>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let headers = reader
        .headers()
        .with_context(|| format!("failed to read CSV headers from {}", path.display()))?
        .clone();
    let index = column.resolve(&headers, path)?;

    let mut titles = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record =
            record.with_context(|| format!("failed to read row {} of {}", row + 2, path.display()))?;
        if let Some(value) = record.get(index) {
            let title = normalize_title(value);
            if !title.is_empty() {
                titles.push(title);
            }
        }
    }
    Ok(titles)
}

/// Reads two-column rows (`source,target`, `from,to`) from a headered CSV file.
/// Rows with an empty cell are dropped.
pub fn load_csv_pairs(path: &Path) -> Result<Vec<(String, String)>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let headers = reader
        .headers()
        .with_context(|| format!("failed to read CSV headers from {}", path.display()))?;
    if headers.len() < 2 {
        bail!("{} must have at least two columns", path.display());
    }

    let mut pairs = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record =
            record.with_context(|| format!("failed to read row {} of {}", row + 2, path.display()))?;
        let left = record.get(0).map(normalize_title).unwrap_or_default();
        let right = record.get(1).map(normalize_title).unwrap_or_default();
        if left.is_empty() || right.is_empty() {
            tracing::warn!(target: "input", row = row + 2, "skipping incomplete CSV row");
            continue;
        }
        pairs.push((left, right));
    }
    Ok(pairs)
}

/// Collects the text of every `<title>` element in a MediaWiki XML export.
pub fn parse_xml_titles(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    let mut titles = Vec::new();
    let mut in_title = false;
    let mut current = String::new();

    loop {
        match reader
            .read_event()
            .with_context(|| format!("invalid XML at byte {}", reader.buffer_position()))?
        {
            Event::Start(e) if e.local_name().as_ref() == b"title" => {
                in_title = true;
                current.clear();
            }
            Event::Text(e) if in_title => {
                let text = e.unescape().context("invalid XML text in <title>")?;
                current.push_str(&text);
            }
            Event::CData(e) if in_title => {
                current.push_str(&String::from_utf8_lossy(&e.into_inner()));
            }
            Event::End(e) if e.local_name().as_ref() == b"title" => {
                in_title = false;
                let title = normalize_title(&current);
                if !title.is_empty() {
                    titles.push(title);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(titles)
}

pub fn load_xml_titles(path: &Path) -> Result<Vec<String>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    parse_xml_titles(&content).with_context(|| format!("failed to parse {}", path.display()))
}

/// Where a job's target pages come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSource {
    Category(String),
    TitleFile(PathBuf),
    Csv { path: PathBuf, column: CsvColumn },
    Xml(PathBuf),
    Titles(Vec<String>),
}

impl TargetSource {
    pub fn describe(&self) -> String {
        match self {
            Self::Category(name) => format!("category {name}"),
            Self::TitleFile(path) => format!("title list {}", path.display()),
            Self::Csv { path, .. } => format!("CSV {}", path.display()),
            Self::Xml(path) => format!("XML export {}", path.display()),
            Self::Titles(titles) => format!("{} explicit titles", titles.len()),
        }
    }

    /// Resolves to an ordered, de-duplicated title list. Only category
    /// sources touch the wiki.
    pub fn resolve<A: WikiReadApi>(&self, api: &mut A, namespace: Option<i32>) -> Result<Vec<String>> {
        let titles = match self {
            Self::Category(name) => api
                .get_category_members(name, namespace)
                .with_context(|| format!("failed to list members of category {name}"))?,
            Self::TitleFile(path) => load_title_list(path)?,
            Self::Csv { path, column } => load_csv_column(path, column)?,
            Self::Xml(path) => load_xml_titles(path)?,
            Self::Titles(titles) => titles.iter().map(|title| normalize_title(title)).collect(),
        };
        Ok(dedupe_preserving_order(titles))
    }
}

fn dedupe_preserving_order(titles: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    titles
        .into_iter()
        .filter(|title| seen.insert(title.clone()))
        .collect()
}
