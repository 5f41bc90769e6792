use anyhow::{Result, bail};

use crate::category::{removal_end, wikilink_spans};
use crate::rewrite::PageEditUnit;

/// A `[[xx:Title]]` interlanguage link and its byte span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterwikiLink {
    pub start: usize,
    pub end: usize,
    pub language: String,
    pub title: String,
}

pub fn normalize_language_prefix(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

/// Interlanguage prefixes look like `de`, `zh-yue` or `be-tarask`, compared
/// case-insensitively. `simple` is the one longer code accepted as is.
pub fn is_interwiki_prefix(prefix: &str) -> bool {
    let prefix = normalize_language_prefix(prefix);
    if prefix == "simple" {
        return true;
    }
    let mut parts = prefix.split('-');
    let primary = parts.next().unwrap_or_default();
    (2..=3).contains(&primary.len())
        && primary.bytes().all(|byte| byte.is_ascii_lowercase())
        && parts.all(|part| !part.is_empty() && part.bytes().all(|byte| byte.is_ascii_alphanumeric()))
}

/// Finds interlanguage links. `[[:de:X]]` is an inline link to the other
/// wiki, not a language link, and is not reported.
pub fn find_interwiki_links(content: &str) -> Vec<InterwikiLink> {
    wikilink_spans(content)
        .into_iter()
        .filter_map(|(start, end, inner)| {
            if inner.trim_start().starts_with(':') {
                return None;
            }
            let (prefix, title) = inner.split_once(':')?;
            let title = title.trim();
            if !is_interwiki_prefix(prefix) || title.is_empty() {
                return None;
            }
            Some(InterwikiLink {
                start,
                end,
                language: normalize_language_prefix(prefix),
                title: title.to_string(),
            })
        })
        .collect()
}

fn checked_language(language: &str) -> Result<String> {
    let language = normalize_language_prefix(language);
    if !is_interwiki_prefix(&language) {
        bail!("not an interlanguage prefix: {language:?}");
    }
    Ok(language)
}

/// Removes every `[[language:...]]` link together with one trailing newline.
pub fn plan_remove_interwiki(title: &str, content: &str, language: &str) -> Result<PageEditUnit> {
    let wanted = checked_language(language)?;
    let mut unit = PageEditUnit::new(title, content);
    for link in find_interwiki_links(content) {
        if link.language == wanted {
            unit.replace(link.start, removal_end(content, link.end), String::new())?;
        }
    }
    Ok(unit)
}

/// Appends `[[language:foreign_title]]` on its own line unless the page
/// already links that language, whatever the linked title.
pub fn plan_add_interwiki(
    title: &str,
    content: &str,
    language: &str,
    foreign_title: &str,
) -> Result<PageEditUnit> {
    let language = checked_language(language)?;
    let foreign_title = foreign_title.trim();
    if foreign_title.is_empty() {
        bail!("interlanguage title for {title} is empty");
    }
    let mut unit = PageEditUnit::new(title, content);
    if find_interwiki_links(content)
        .iter()
        .any(|link| link.language == language)
    {
        return Ok(unit);
    }

    let link = format!("[[{language}:{foreign_title}]]");
    let insertion = if content.is_empty() || content.ends_with('\n') {
        link
    } else {
        format!("\n{link}")
    };
    unit.replace(content.len(), content.len(), insertion)?;
    Ok(unit)
}

#[cfg(test)]
mod tests {
    use super::{
        find_interwiki_links, is_interwiki_prefix, plan_add_interwiki, plan_remove_interwiki,
    };

    #[test]
    fn prefixes_accept_language_codes_only() {
        assert!(is_interwiki_prefix("en"));
        assert!(is_interwiki_prefix(" SN "));
        assert!(is_interwiki_prefix("zh-yue"));
        assert!(is_interwiki_prefix("simple"));
        assert!(!is_interwiki_prefix("Category"));
        assert!(!is_interwiki_prefix("File"));
        assert!(!is_interwiki_prefix("e"));
        assert!(!is_interwiki_prefix("zh-"));
    }

    #[test]
    fn finds_language_links_but_not_namespaces_or_inline_links() {
        let content = "[[en:Ise Grand Shrine]] [[:de:Ise-Schrein]] [[Category:Shrines]] [[File:A.jpg]] [[JA:伊勢神宮]]";
        let links = find_interwiki_links(content);
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].language, "en");
        assert_eq!(links[0].title, "Ise Grand Shrine");
        assert_eq!(&content[links[0].start..links[0].end], "[[en:Ise Grand Shrine]]");
        assert_eq!(links[1].language, "ja");
        assert_eq!(links[1].title, "伊勢神宮");
    }

    #[test]
    fn remove_interwiki_drops_links_without_leaving_blank_lines() {
        let content = "Body\n\n[[sn:Ise]]\n[[en:Ise]]\n[[sn:Other]][[de:Ise]]\n";
        let unit = plan_remove_interwiki("Ise", content, "sn").expect("plan");
        assert_eq!(unit.replacements.len(), 2);
        assert_eq!(unit.apply(), "Body\n\n[[en:Ise]]\n[[de:Ise]]\n");

        let unit = plan_remove_interwiki("Ise", "[[en:Ise]]", "sn").expect("plan");
        assert!(!unit.has_changes());
    }

    #[test]
    fn add_interwiki_appends_once_per_language() {
        let unit = plan_add_interwiki("Ise", "Body", "EN", "Ise Grand Shrine").expect("plan");
        assert_eq!(unit.apply(), "Body\n[[en:Ise Grand Shrine]]");

        let unit = plan_add_interwiki("Ise", "Body\n[[en:Other]]\n", "en", "Ise Grand Shrine")
            .expect("plan");
        assert!(!unit.has_changes());
    }

    #[test]
    fn invalid_language_or_title_is_rejected() {
        assert!(plan_remove_interwiki("Ise", "Body", "Category").is_err());
        assert!(plan_add_interwiki("Ise", "Body", "en", "  ").is_err());
    }
}
