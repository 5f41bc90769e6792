use crate::rewrite::PageEditUnit;

const CATEGORY_NAMESPACE: &str = "Category";

/// A `[[Category:Name|sort]]` membership link and its byte span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryLink {
    pub start: usize,
    pub end: usize,
    pub name: String,
    pub sort_key: Option<String>,
}

/// Strips an optional `Category:` prefix and normalises underscores and runs
/// of whitespace. The first letter is upper-cased as MediaWiki does.
pub fn normalize_category_name(raw: &str) -> String {
    let mut name = raw.trim();
    if let Some((prefix, rest)) = name.split_once(':')
        && prefix.trim().eq_ignore_ascii_case(CATEGORY_NAMESPACE)
    {
        name = rest;
    }
    let collapsed = name
        .replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let mut chars = collapsed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Finds category membership links. `[[:Category:X]]` is a plain link and
/// is not reported.
pub fn find_category_links(content: &str) -> Vec<CategoryLink> {
    wikilink_spans(content)
        .into_iter()
        .filter_map(|(start, end, inner)| {
            let (name, sort_key) = parse_category_target(inner)?;
            Some(CategoryLink {
                start,
                end,
                name,
                sort_key,
            })
        })
        .collect()
}

/// Every `[[...]]` link as `(start, end, inner)`, with `end` past the closing
/// brackets. Links do not nest; an unclosed `[[` ends the scan.
pub(crate) fn wikilink_spans(content: &str) -> Vec<(usize, usize, &str)> {
    let bytes = content.as_bytes();
    let mut out = Vec::new();
    let mut cursor = 0usize;

    while cursor + 1 < bytes.len() {
        if bytes[cursor] == b'[' && bytes[cursor + 1] == b'[' {
            let start = cursor + 2;
            let mut end = start;
            while end + 1 < bytes.len() {
                if bytes[end] == b']' && bytes[end + 1] == b']' {
                    break;
                }
                end += 1;
            }
            if end + 1 >= bytes.len() {
                break;
            }

            out.push((cursor, end + 2, &content[start..end]));
            cursor = end + 2;
            continue;
        }
        cursor += 1;
    }

    out
}

/// End of the span to delete for a link ending at `end`: one trailing
/// newline goes with it so removal does not leave a blank line.
pub(crate) fn removal_end(content: &str, end: usize) -> usize {
    if content[end..].starts_with('\n') {
        end + 1
    } else {
        end
    }
}

fn parse_category_target(inner: &str) -> Option<(String, Option<String>)> {
    let (target, sort_key) = match inner.split_once('|') {
        Some((target, sort)) => (target, Some(sort.to_string())),
        None => (inner, None),
    };
    let target = target.trim();
    if target.starts_with(':') {
        return None;
    }
    let (prefix, rest) = target.split_once(':')?;
    if !prefix.trim().eq_ignore_ascii_case(CATEGORY_NAMESPACE) {
        return None;
    }
    let name = normalize_category_name(rest);
    if name.is_empty() {
        return None;
    }
    Some((name, sort_key))
}

pub fn has_category(content: &str, category: &str) -> bool {
    let wanted = normalize_category_name(category);
    find_category_links(content)
        .iter()
        .any(|link| link.name == wanted)
}

/// Appends `[[Category:Name]]` on its own line unless the page is already a member.
pub fn plan_add_category(title: &str, content: &str, category: &str) -> anyhow::Result<PageEditUnit> {
    let mut unit = PageEditUnit::new(title, content);
    let name = normalize_category_name(category);
    if name.is_empty() {
        anyhow::bail!("category name is empty");
    }
    if has_category(content, &name) {
        return Ok(unit);
    }

    let link = format!("[[{CATEGORY_NAMESPACE}:{name}]]");
    let insertion = if content.is_empty() || content.ends_with('\n') {
        link
    } else {
        format!("\n{link}")
    };
    unit.replace(content.len(), content.len(), insertion)?;
    Ok(unit)
}

/// Removes every membership link for `category` together with one trailing newline.
pub fn plan_remove_category(
    title: &str,
    content: &str,
    category: &str,
) -> anyhow::Result<PageEditUnit> {
    let mut unit = PageEditUnit::new(title, content);
    let wanted = normalize_category_name(category);
    if wanted.is_empty() {
        anyhow::bail!("category name is empty");
    }
    for link in find_category_links(content) {
        if link.name != wanted {
            continue;
        }
        unit.replace(link.start, removal_end(content, link.end), String::new())?;
    }
    Ok(unit)
}
