use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::api::{WikiReadApi, WikiWriteApi};
use crate::batch::{
    BatchOptions, BatchReport, ItemResult, ItemStatus, run_batch, run_edit_batch, run_scan_batch,
};
use crate::category::{normalize_category_name, plan_add_category, plan_remove_category};
use crate::config::BatchConfig;
use crate::interwiki::{normalize_language_prefix, plan_add_interwiki, plan_remove_interwiki};
use crate::rewrite::{
    HeuristicLanguageCode, LanguageClassification, MediaEmbedPolicy, RemoveTemplatePolicy,
    RewriteDecision, RewritePolicy, TemplateLanguages, extract_language_pairs,
    find_marked_templates, plan_template_rewrites, scan_language_pairs,
};
use crate::runtime::write_text_file;
use crate::template::{TemplateInvocation, parse_template};

pub const FILE_ILLS_CATEGORY: &str = "Pages with files linked by ill";
/// fix-file-ills only edits articles unless told otherwise.
pub const FILE_ILLS_NAMESPACE: i32 = 0;
pub const DEFAULT_FIX_FILE_ILLS_SUMMARY: &str =
    "Bot: Fix ill templates with files - convert to [[File:...|thumb]]";
pub const DEFAULT_REMOVE_TEMPLATE_SUMMARY: &str = "Bot: remove template";
pub const DEFAULT_DELETE_REASON: &str = "Bot: batch deletion";
pub const DEFAULT_REDIRECT_SUMMARY: &str = "Bot: create redirect";
pub const DEFAULT_MOVE_REASON: &str = "Bot: batch move";

pub const UNKNOWN_ILLS_HEADERS: [&str; 2] = ["Page", "Template"];
pub const LANGUAGE_ROW_HEADERS: [&str; 5] = ["Page", "Template", "Kind", "Language", "Value"];

/// Template-level settings shared by the `{{ill}}` jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IllSettings {
    pub template_names: Vec<String>,
    pub display_hint: String,
    pub unknown_marker: String,
}

impl IllSettings {
    pub fn from_config(config: &BatchConfig) -> Self {
        Self {
            template_names: config.ill_template_names(),
            display_hint: config.display_hint().to_string(),
            unknown_marker: config.unknown_marker().to_string(),
        }
    }
}

impl Default for IllSettings {
    fn default() -> Self {
        Self::from_config(&BatchConfig::default())
    }
}

pub fn default_add_category_summary(category: &str) -> String {
    format!(
        "Bot: add [[Category:{}]]",
        normalize_category_name(category)
    )
}

pub fn default_remove_category_summary(category: &str) -> String {
    format!(
        "Bot: remove [[Category:{}]]",
        normalize_category_name(category)
    )
}

pub fn default_remove_interwiki_summary(language: &str) -> String {
    format!(
        "Bot: remove {}: interwiki links",
        normalize_language_prefix(language)
    )
}

pub fn default_add_interwiki_summary(language: &str) -> String {
    format!("Bot: add {}: interwiki link", normalize_language_prefix(language))
}

pub fn fix_file_ills<A>(
    api: &mut A,
    titles: &[String],
    settings: &IllSettings,
    summary: &str,
    options: &BatchOptions,
) -> BatchReport
where
    A: WikiWriteApi + ?Sized,
{
    let policy = MediaEmbedPolicy::new(settings.display_hint.clone());
    run_edit_batch(api, titles, summary, options, "fix-file-ills", |title, text| {
        Ok(plan_template_rewrites(
            title,
            text,
            &settings.template_names,
            &policy,
        ))
    })
}

pub fn remove_template<A>(
    api: &mut A,
    titles: &[String],
    template_names: &[String],
    summary: &str,
    options: &BatchOptions,
) -> BatchReport
where
    A: WikiWriteApi + ?Sized,
{
    run_edit_batch(api, titles, summary, options, "remove-template", |title, text| {
        Ok(plan_template_rewrites(
            title,
            text,
            template_names,
            &RemoveTemplatePolicy,
        ))
    })
}

pub fn add_category<A>(
    api: &mut A,
    titles: &[String],
    category: &str,
    summary: &str,
    options: &BatchOptions,
) -> BatchReport
where
    A: WikiWriteApi + ?Sized,
{
    run_edit_batch(api, titles, summary, options, "add-category", |title, text| {
        plan_add_category(title, text, category)
    })
}

pub fn remove_category<A>(
    api: &mut A,
    titles: &[String],
    category: &str,
    summary: &str,
    options: &BatchOptions,
) -> BatchReport
where
    A: WikiWriteApi + ?Sized,
{
    run_edit_batch(api, titles, summary, options, "remove-category", |title, text| {
        plan_remove_category(title, text, category)
    })
}

pub fn remove_interwiki<A>(
    api: &mut A,
    titles: &[String],
    language: &str,
    summary: &str,
    options: &BatchOptions,
) -> BatchReport
where
    A: WikiWriteApi + ?Sized,
{
    run_edit_batch(api, titles, summary, options, "remove-interwiki", |title, text| {
        plan_remove_interwiki(title, text, language)
    })
}

/// Adds `[[language:foreign]]` for each `(page, foreign)` row. Pages that
/// already link the language are left unchanged.
pub fn add_interwiki<A>(
    api: &mut A,
    pairs: &[(String, String)],
    language: &str,
    summary: &str,
    options: &BatchOptions,
) -> BatchReport
where
    A: WikiWriteApi + ?Sized,
{
    let (pages, foreign_titles) = index_pairs(pairs);
    run_edit_batch(api, &pages, summary, options, "add-interwiki", |title, text| {
        let foreign = foreign_titles
            .get(title)
            .ok_or_else(|| anyhow::anyhow!("no interlanguage title for {title}"))?;
        plan_add_interwiki(title, text, language, foreign)
    })
}

/// Deletes each page. Pages that do not exist are skipped, both when the
/// existence check says so and when the delete itself reports a missing title.
pub fn delete_pages<A>(
    api: &mut A,
    titles: &[String],
    reason: &str,
    options: &BatchOptions,
) -> BatchReport
where
    A: WikiWriteApi + ?Sized,
{
    run_batch(api, titles, options, "delete", |api, title| {
        if !api
            .page_exists(title)
            .with_context(|| format!("failed to check {title}"))?
        {
            return Ok(ItemResult::new(title, ItemStatus::Skipped).with_detail("missing"));
        }
        if options.dry_run {
            return Ok(ItemResult::new(title, ItemStatus::WouldUpdate).with_detail("would delete"));
        }
        api.delete_page(title, reason)
            .with_context(|| format!("failed to delete {title}"))?;
        Ok(ItemResult::new(title, ItemStatus::Updated).with_detail("deleted"))
    })
}

pub fn redirect_text(target: &str) -> String {
    format!("#REDIRECT [[{target}]]")
}

/// Creates `#REDIRECT [[target]]` at each source that does not exist yet.
/// The first row wins when a source is listed twice.
pub fn create_redirects<A>(
    api: &mut A,
    pairs: &[(String, String)],
    summary: &str,
    options: &BatchOptions,
) -> BatchReport
where
    A: WikiWriteApi + ?Sized,
{
    let (sources, targets) = index_pairs(pairs);
    run_batch(api, &sources, options, "redirect", |api, source| {
        let target = targets
            .get(source)
            .ok_or_else(|| anyhow::anyhow!("no redirect target for {source}"))?;
        if api
            .page_exists(source)
            .with_context(|| format!("failed to check {source}"))?
        {
            return Ok(ItemResult::new(source, ItemStatus::Skipped).with_detail("already exists"));
        }
        if options.dry_run {
            return Ok(ItemResult::new(source, ItemStatus::WouldUpdate)
                .with_detail(format!("would redirect to {target}")));
        }
        api.create_page(source, &redirect_text(target), summary)
            .with_context(|| format!("failed to create redirect {source}"))?;
        Ok(ItemResult::new(source, ItemStatus::Updated).with_detail(format!("redirects to {target}")))
    })
}

/// Moves each `from` page to `to`, leaving the wiki's default redirect behind.
pub fn move_pages<A>(
    api: &mut A,
    pairs: &[(String, String)],
    reason: &str,
    options: &BatchOptions,
) -> BatchReport
where
    A: WikiWriteApi + ?Sized,
{
    let (sources, targets) = index_pairs(pairs);
    run_batch(api, &sources, options, "move", |api, from| {
        let to = targets
            .get(from)
            .ok_or_else(|| anyhow::anyhow!("no move target for {from}"))?;
        if options.dry_run {
            if !api
                .page_exists(from)
                .with_context(|| format!("failed to check {from}"))?
            {
                return Ok(ItemResult::new(from, ItemStatus::Skipped).with_detail("missing"));
            }
            return Ok(ItemResult::new(from, ItemStatus::WouldUpdate)
                .with_detail(format!("would move to {to}")));
        }
        api.move_page(from, to, reason)
            .with_context(|| format!("failed to move {from} to {to}"))?;
        Ok(ItemResult::new(from, ItemStatus::Updated).with_detail(format!("moved to {to}")))
    })
}

fn index_pairs(pairs: &[(String, String)]) -> (Vec<String>, BTreeMap<String, String>) {
    let mut sources = Vec::new();
    let mut targets = BTreeMap::new();
    for (source, target) in pairs {
        if targets.contains_key(source) {
            tracing::warn!(target: "jobs", source = %source, "duplicate row ignored");
            continue;
        }
        targets.insert(source.clone(), target.clone());
        sources.push(source.clone());
    }
    (sources, targets)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnknownIllRow {
    pub page: String,
    pub template: String,
}

/// Lists every configured template that carries the unknown marker.
pub fn scan_unknown_ills<A>(
    api: &mut A,
    titles: &[String],
    settings: &IllSettings,
    options: &BatchOptions,
) -> (BatchReport, Vec<UnknownIllRow>)
where
    A: WikiReadApi + ?Sized,
{
    let mut rows = Vec::new();
    let report = run_scan_batch(api, titles, options, "unknown-ills", |title, text| {
        let found = find_marked_templates(text, &settings.template_names, &settings.unknown_marker);
        let count = found.len();
        rows.extend(found.into_iter().map(|template| UnknownIllRow {
            page: title.to_string(),
            template,
        }));
        Ok((count > 0).then(|| format!("{count} marked template(s)")))
    });
    (report, rows)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageLanguages {
    pub title: String,
    pub templates: Vec<TemplateLanguages>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LanguageRowKind {
    Pair,
    OrphanedCode,
    NumericKey,
    Unclassified,
}

/// Flat form of a language scan, one row per finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LanguageRow {
    pub page: String,
    pub template: String,
    pub kind: LanguageRowKind,
    pub language: String,
    pub value: String,
}

pub fn scan_ill_languages<A>(
    api: &mut A,
    titles: &[String],
    settings: &IllSettings,
    options: &BatchOptions,
) -> (BatchReport, Vec<PageLanguages>)
where
    A: WikiReadApi + ?Sized,
{
    let mut pages = Vec::new();
    let predicate = HeuristicLanguageCode;
    let report = run_scan_batch(api, titles, options, "ill-languages", |title, text| {
        let templates = scan_language_pairs(
            text,
            &settings.template_names,
            &predicate,
            &settings.unknown_marker,
        );
        if templates.is_empty() {
            return Ok(None);
        }
        let review = templates
            .iter()
            .filter(|entry| match &entry.classification {
                LanguageClassification::Extracted(extraction) => extraction.needs_review(),
                LanguageClassification::Unclassified { .. } => true,
            })
            .count();
        let detail = format!("{} template(s), {review} need review", templates.len());
        pages.push(PageLanguages {
            title: title.to_string(),
            templates,
        });
        Ok(Some(detail))
    });
    (report, pages)
}

pub fn language_rows(pages: &[PageLanguages]) -> Vec<LanguageRow> {
    let mut rows = Vec::new();
    for page in pages {
        for entry in &page.templates {
            let row = |kind, language: &str, value: &str| LanguageRow {
                page: page.title.clone(),
                template: entry.template.clone(),
                kind,
                language: language.to_string(),
                value: value.to_string(),
            };
            match &entry.classification {
                LanguageClassification::Extracted(extraction) => {
                    for pair in &extraction.pairs {
                        rows.push(row(LanguageRowKind::Pair, &pair.language, &pair.title));
                    }
                    for code in &extraction.orphaned_codes {
                        rows.push(row(LanguageRowKind::OrphanedCode, code, ""));
                    }
                    for key in &extraction.numeric_keys {
                        rows.push(row(LanguageRowKind::NumericKey, "", key));
                    }
                }
                LanguageClassification::Unclassified { reason } => {
                    rows.push(row(LanguageRowKind::Unclassified, "", reason.as_str()));
                }
            }
        }
    }
    rows
}

/// Offline decomposition of a single invocation.
#[derive(Debug, Clone, Serialize)]
pub struct ParseReport {
    pub invocation: TemplateInvocation,
    pub numeric_keys: Vec<String>,
    pub media_embed: Option<String>,
    pub languages: LanguageClassification,
}

pub fn parse_invocation(raw: &str, settings: &IllSettings) -> Result<ParseReport> {
    let invocation = parse_template(raw.trim())?;
    let media_embed = match MediaEmbedPolicy::new(settings.display_hint.clone()).decide(&invocation)
    {
        RewriteDecision::Rewrite(text) => Some(text),
        RewriteDecision::KeepUnchanged | RewriteDecision::Unclassified(_) => None,
    };
    let languages =
        extract_language_pairs(&invocation, &HeuristicLanguageCode, &settings.unknown_marker);
    Ok(ParseReport {
        numeric_keys: invocation
            .numeric_named_keys()
            .into_iter()
            .map(ToString::to_string)
            .collect(),
        media_embed,
        languages,
        invocation,
    })
}

/// Writes `rows` under an explicit header line, so an empty scan still
/// produces a well-formed file.
pub fn write_csv_report<T: Serialize>(path: &Path, headers: &[&str], rows: &[T]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    writer
        .write_record(headers)
        .with_context(|| format!("failed to write {}", path.display()))?;
    for row in rows {
        writer
            .serialize(row)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("failed to flush {}", path.display()))?;
    Ok(())
}

pub fn write_json_report<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("failed to serialize report")?;
    write_text_file(path, &format!("{json}\n"), true)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::Duration;

    use tempfile::tempdir;

    use super::{
        IllSettings, LanguageRowKind, UNKNOWN_ILLS_HEADERS, UnknownIllRow, add_category,
        add_interwiki, create_redirects, default_remove_interwiki_summary, delete_pages,
        fix_file_ills, language_rows, move_pages, parse_invocation, remove_category,
        remove_interwiki, remove_template, scan_ill_languages, scan_unknown_ills,
        write_csv_report, write_json_report,
    };
    use crate::api::ApiErrorKind;
    use crate::api::mock::MockApi;
    use crate::batch::{BatchOptions, ItemStatus};
    use crate::rewrite::LanguageClassification;

    fn options() -> BatchOptions {
        BatchOptions {
            rate_limit_cooldown: Duration::ZERO,
            ..BatchOptions::default()
        }
    }

    fn dry_run() -> BatchOptions {
        BatchOptions {
            dry_run: true,
            ..options()
        }
    }

    fn titles(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    fn pairs(values: &[(&str, &str)]) -> Vec<(String, String)> {
        values
            .iter()
            .map(|(left, right)| (left.to_string(), right.to_string()))
            .collect()
    }

    #[test]
    fn fix_file_ills_rewrites_file_references() {
        let mut api = MockApi::with_pages(&[(
            "Meiji Shrine",
            "Gate {{ill|File:Torii.jpg|ja|鳥居}} and {{ill|Torii|ja|鳥居}}.",
        )]);
        let report = fix_file_ills(
            &mut api,
            &titles(&["Meiji Shrine"]),
            &IllSettings::default(),
            "Bot: fix",
            &options(),
        );
        assert_eq!(report.updated, 1);
        assert_eq!(
            api.pages.get("Meiji Shrine").map(String::as_str),
            Some("Gate [[File:Torii.jpg|thumb]] and {{ill|Torii|ja|鳥居}}.")
        );
    }

    #[test]
    fn fix_file_ills_honours_configured_names_and_hint() {
        let settings = IllSettings {
            template_names: vec!["Interlanguage link".to_string()],
            display_hint: "frameless".to_string(),
            ..IllSettings::default()
        };
        let mut api = MockApi::with_pages(&[(
            "Page",
            "{{interlanguage_link|File:A.png}} {{ill|File:B.png}}",
        )]);
        fix_file_ills(&mut api, &titles(&["Page"]), &settings, "s", &options());
        assert_eq!(
            api.pages.get("Page").map(String::as_str),
            Some("[[File:A.png|frameless]] {{ill|File:B.png}}")
        );
    }

    #[test]
    fn remove_template_strips_every_invocation() {
        let mut api = MockApi::with_pages(&[("Page", "{{Orphan|date=2024}}Body{{orphan}}")]);
        let report = remove_template(
            &mut api,
            &titles(&["Page"]),
            &["Orphan".to_string()],
            "s",
            &options(),
        );
        assert_eq!(report.updated, 1);
        assert_eq!(api.pages.get("Page").map(String::as_str), Some("Body"));
    }

    #[test]
    fn category_jobs_add_and_remove_links() {
        let mut api = MockApi::with_pages(&[
            ("A", "Body"),
            ("B", "Body\n[[Category:Shrines]]"),
        ]);
        let report = add_category(&mut api, &titles(&["A", "B"]), "Shrines", "s", &options());
        assert_eq!(report.updated, 1);
        assert_eq!(report.unchanged, 1);
        assert_eq!(
            api.pages.get("A").map(String::as_str),
            Some("Body\n[[Category:Shrines]]")
        );

        let report = remove_category(&mut api, &titles(&["A", "B"]), "Shrines", "s", &options());
        assert_eq!(report.updated, 2);
        assert_eq!(api.pages.get("A").map(String::as_str), Some("Body\n"));
        assert_eq!(api.pages.get("B").map(String::as_str), Some("Body\n"));
    }

    #[test]
    fn interwiki_jobs_remove_by_language_and_add_from_pairs() {
        let mut api = MockApi::with_pages(&[
            ("Ise", "Body\n[[sn:Ise]]\n[[en:Ise Grand Shrine]]\n"),
            ("Izumo", "Body\n[[en:Izumo-taisha]]"),
        ]);
        let report = remove_interwiki(&mut api, &titles(&["Ise", "Izumo"]), "SN", "s", &options());
        assert_eq!(report.updated, 1);
        assert_eq!(report.unchanged, 1);
        assert_eq!(
            api.pages.get("Ise").map(String::as_str),
            Some("Body\n[[en:Ise Grand Shrine]]\n")
        );

        let report = add_interwiki(
            &mut api,
            &pairs(&[("Ise", "伊勢神宮"), ("Izumo", "出雲大社"), ("Ise", "ignored")]),
            "ja",
            "s",
            &options(),
        );
        assert_eq!(report.processed, 2);
        assert_eq!(report.updated, 2);
        assert_eq!(
            api.pages.get("Ise").map(String::as_str),
            Some("Body\n[[en:Ise Grand Shrine]]\n[[ja:伊勢神宮]]")
        );
        assert_eq!(
            api.pages.get("Izumo").map(String::as_str),
            Some("Body\n[[en:Izumo-taisha]]\n[[ja:出雲大社]]")
        );
        assert_eq!(default_remove_interwiki_summary(" SN"), "Bot: remove sn: interwiki links");
    }

    #[test]
    fn delete_skips_missing_and_respects_dry_run() {
        let mut api = MockApi::with_pages(&[("Old page", "x"), ("Other", "y")]);
        let report = delete_pages(&mut api, &titles(&["Old page", "Gone"]), "cleanup", &dry_run());
        assert_eq!(report.updated, 1);
        assert_eq!(report.skipped, 1);
        assert!(api.deleted.is_empty());

        let report = delete_pages(&mut api, &titles(&["Old page", "Gone"]), "cleanup", &options());
        assert_eq!(report.items[0].status, ItemStatus::Updated);
        assert_eq!(report.items[1].status, ItemStatus::Skipped);
        assert_eq!(api.deleted, vec!["Old page".to_string()]);
        assert!(report.success);
    }

    #[test]
    fn delete_reports_permission_errors() {
        let mut api = MockApi::with_pages(&[("Protected", "x")]);
        api.write_failures
            .insert("Protected".to_string(), ApiErrorKind::PermissionDenied);
        let report = delete_pages(&mut api, &titles(&["Protected"]), "cleanup", &options());
        assert_eq!(report.failed, 1);
        assert!(report.has_failures());
    }

    #[test]
    fn redirects_are_created_only_for_missing_sources() {
        let mut api = MockApi::with_pages(&[("Category:Existing", "x")]);
        let report = create_redirects(
            &mut api,
            &pairs(&[
                ("Category:Shinto shrines", "Category:Shrines"),
                ("Category:Existing", "Category:Shrines"),
                ("Category:Shinto shrines", "Category:Ignored"),
            ]),
            "s",
            &options(),
        );
        assert_eq!(report.processed, 2);
        assert_eq!(report.updated, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(
            api.pages.get("Category:Shinto shrines").map(String::as_str),
            Some("#REDIRECT [[Category:Shrines]]")
        );
    }

    #[test]
    fn move_pages_moves_and_reports_missing() {
        let mut api = MockApi::with_pages(&[("Old", "text")]);
        let report = move_pages(
            &mut api,
            &pairs(&[("Old", "New"), ("Absent", "Elsewhere")]),
            "rename",
            &options(),
        );
        assert_eq!(report.updated, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(api.moved, vec![("Old".to_string(), "New".to_string())]);
        assert_eq!(api.pages.get("New").map(String::as_str), Some("text"));
    }

    #[test]
    fn unknown_ills_are_listed_per_template() {
        let mut api = MockApi::with_pages(&[
            ("A", "{{ill|UNKNOWN|ja|x}} {{ill|Known|de|y}} {{ill|Foo|ja|UNKNOWN}}"),
            ("B", "{{ill|Known|de|y}}"),
        ]);
        let (report, rows) =
            scan_unknown_ills(&mut api, &titles(&["A", "B"]), &IllSettings::default(), &options());
        assert_eq!(report.scanned, 2);
        assert_eq!(
            rows,
            vec![
                UnknownIllRow {
                    page: "A".to_string(),
                    template: "{{ill|UNKNOWN|ja|x}}".to_string()
                },
                UnknownIllRow {
                    page: "A".to_string(),
                    template: "{{ill|Foo|ja|UNKNOWN}}".to_string()
                },
            ]
        );
        assert!(api.edits.is_empty());
    }

    #[test]
    fn language_scan_flattens_to_rows() {
        let mut api = MockApi::with_pages(&[(
            "Page",
            "{{ill|Unfading Flower|de|Blume|8=en|every|fr}} {{ill|X|UNKNOWN}} {{ill|Broken|[[x}}",
        )]);
        let (report, pages) =
            scan_ill_languages(&mut api, &titles(&["Page"]), &IllSettings::default(), &options());
        assert_eq!(report.scanned, 1);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].templates.len(), 3);
        assert!(matches!(
            pages[0].templates[1].classification,
            LanguageClassification::Unclassified { .. }
        ));

        let rows = language_rows(&pages);
        let kinds = rows.iter().map(|row| row.kind).collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![
                LanguageRowKind::Pair,
                LanguageRowKind::Pair,
                LanguageRowKind::OrphanedCode,
                LanguageRowKind::NumericKey,
                LanguageRowKind::Unclassified,
                LanguageRowKind::Unclassified,
            ]
        );
        assert_eq!(rows[0].language, "de");
        assert_eq!(rows[0].value, "Blume");
        assert_eq!(rows[1].language, "en");
        assert_eq!(rows[1].value, "every");
        assert_eq!(rows[2].language, "fr");
        assert_eq!(rows[3].value, "8");
        assert_eq!(rows[4].value, "unknown marker");
        assert_eq!(rows[5].value, "malformed");
    }

    #[test]
    fn parse_invocation_reports_all_views() {
        let report = parse_invocation(
            " {{ill|File:Example.jpg|ja|例}} ",
            &IllSettings::default(),
        )
        .expect("parse");
        assert_eq!(report.invocation.name, "ill");
        assert_eq!(
            report.media_embed.as_deref(),
            Some("[[File:Example.jpg|thumb]]")
        );
        assert!(matches!(
            report.languages,
            LanguageClassification::Extracted(ref extraction) if extraction.pairs.len() == 1
        ));

        let error = parse_invocation("{{ill|Foo", &IllSettings::default()).expect_err("malformed");
        assert!(error.to_string().contains("malformed template"));
    }

    #[test]
    fn csv_report_always_has_header() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("reports").join("unknown.csv");
        write_csv_report::<UnknownIllRow>(&path, &UNKNOWN_ILLS_HEADERS, &[]).expect("write");
        assert_eq!(fs::read_to_string(&path).expect("read"), "Page,Template\n");

        let rows = vec![UnknownIllRow {
            page: "A, B".to_string(),
            template: "{{ill|UNKNOWN}}".to_string(),
        }];
        write_csv_report(&path, &UNKNOWN_ILLS_HEADERS, &rows).expect("write");
        assert_eq!(
            fs::read_to_string(&path).expect("read"),
            "Page,Template\n\"A, B\",{{ill|UNKNOWN}}\n"
        );
    }

    #[test]
    fn json_report_is_pretty_printed() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("report.json");
        write_json_report(&path, &vec!["a", "b"]).expect("write");
        let content = fs::read_to_string(&path).expect("read");
        assert!(content.starts_with("[\n"));
        assert!(content.ends_with("]\n"));
    }
}
