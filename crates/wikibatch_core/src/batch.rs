use std::thread::sleep;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use similar::TextDiff;

use crate::api::{ApiErrorKind, WikiReadApi, WikiWriteApi, error_kind};
use crate::rewrite::{PageEditUnit, UnclassifiedInvocation};

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub dry_run: bool,
    pub rate_limit_cooldown: Duration,
    pub limit: Option<usize>,
    pub show_diff: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            rate_limit_cooldown: Duration::from_secs(crate::config::DEFAULT_RATE_LIMIT_COOLDOWN_SECS),
            limit: None,
            show_diff: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Updated,
    WouldUpdate,
    Unchanged,
    Scanned,
    Skipped,
    Failed,
    RateLimited,
}

impl ItemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Updated => "updated",
            Self::WouldUpdate => "would_update",
            Self::Unchanged => "unchanged",
            Self::Scanned => "scanned",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
            Self::RateLimited => "rate_limited",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemResult {
    pub title: String,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ApiErrorKind>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unclassified: Vec<UnclassifiedInvocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
}

impl ItemResult {
    pub fn new(title: &str, status: ItemStatus) -> Self {
        Self {
            title: title.to_string(),
            status,
            detail: None,
            error_kind: None,
            unclassified: Vec::new(),
            diff: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    fn from_error(title: &str, error: &anyhow::Error) -> Self {
        let kind = error_kind(error);
        let status = match kind {
            ApiErrorKind::NotFound => ItemStatus::Skipped,
            ApiErrorKind::RateLimited => ItemStatus::RateLimited,
            ApiErrorKind::Conflict
            | ApiErrorKind::PermissionDenied
            | ApiErrorKind::RemoteUnavailable
            | ApiErrorKind::Other => ItemStatus::Failed,
        };
        Self {
            error_kind: Some(kind),
            ..Self::new(title, status).with_detail(format!("{error:#}"))
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub action: String,
    pub success: bool,
    pub dry_run: bool,
    pub processed: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub scanned: usize,
    pub skipped: usize,
    pub failed: usize,
    pub rate_limited: usize,
    pub cooldowns: usize,
    pub unclassified: usize,
    pub request_count: usize,
    pub items: Vec<ItemResult>,
}

impl BatchReport {
    fn new(action: &str, dry_run: bool) -> Self {
        Self {
            action: action.to_string(),
            success: true,
            dry_run,
            processed: 0,
            updated: 0,
            unchanged: 0,
            scanned: 0,
            skipped: 0,
            failed: 0,
            rate_limited: 0,
            cooldowns: 0,
            unclassified: 0,
            request_count: 0,
            items: Vec::new(),
        }
    }

    fn record(&mut self, item: ItemResult) {
        self.processed += 1;
        self.unclassified += item.unclassified.len();
        match item.status {
            ItemStatus::Updated | ItemStatus::WouldUpdate => self.updated += 1,
            ItemStatus::Unchanged => self.unchanged += 1,
            ItemStatus::Scanned => self.scanned += 1,
            ItemStatus::Skipped => self.skipped += 1,
            ItemStatus::Failed => self.failed += 1,
            ItemStatus::RateLimited => self.rate_limited += 1,
        }
        self.items.push(item);
    }

    /// Failed and rate-limited pages both mean work was left undone.
    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.rate_limited > 0
    }

    pub fn items_with_status(&self, status: ItemStatus) -> impl Iterator<Item = &ItemResult> {
        self.items.iter().filter(move |item| item.status == status)
    }
}

/// Runs `step` for each title in order. Errors become per-item results; a
/// rate-limited item triggers one cooldown and is not retried.
pub fn run_batch<A, F>(
    api: &mut A,
    titles: &[String],
    options: &BatchOptions,
    action: &str,
    mut step: F,
) -> BatchReport
where
    A: WikiReadApi + ?Sized,
    F: FnMut(&mut A, &str) -> Result<ItemResult>,
{
    let mut report = BatchReport::new(action, options.dry_run);
    let total = options
        .limit
        .map_or(titles.len(), |limit| limit.min(titles.len()));

    for (index, title) in titles.iter().take(total).enumerate() {
        tracing::info!(target: "batch", "[{}/{}] {}", index + 1, total, title);
        let item = match step(api, title) {
            Ok(item) => item,
            Err(error) => ItemResult::from_error(title, &error),
        };

        match item.status {
            ItemStatus::Failed => {
                tracing::warn!(target: "batch", title = %title, "failed: {}", item.detail.as_deref().unwrap_or("unknown error"));
            }
            ItemStatus::Skipped => {
                tracing::info!(target: "batch", title = %title, "skipped: {}", item.detail.as_deref().unwrap_or(""));
            }
            _ => {}
        }
        let rate_limited = item.status == ItemStatus::RateLimited;
        report.record(item);

        if rate_limited {
            tracing::warn!(
                target: "batch",
                title = %title,
                cooldown = ?options.rate_limit_cooldown,
                "rate limited; cooling down before the next page"
            );
            report.cooldowns += 1;
            sleep(options.rate_limit_cooldown);
        }
    }

    report.request_count = api.request_count();
    report.success = !report.has_failures();
    report
}

/// Fetch, plan and save each page. `plan` turns the current text into a
/// `PageEditUnit`; pages with no replacements are left untouched.
pub fn run_edit_batch<A, P>(
    api: &mut A,
    titles: &[String],
    summary: &str,
    options: &BatchOptions,
    action: &str,
    mut plan: P,
) -> BatchReport
where
    A: WikiWriteApi + ?Sized,
    P: FnMut(&str, &str) -> Result<PageEditUnit>,
{
    run_batch(api, titles, options, action, |api, title| {
        let Some(text) = api
            .get_page_text(title)
            .with_context(|| format!("failed to fetch {title}"))?
        else {
            return Ok(ItemResult::new(title, ItemStatus::Skipped).with_detail("missing"));
        };

        let unit = plan(title, &text)?;
        let unclassified = unit.unclassified.clone();
        for entry in &unclassified {
            tracing::warn!(target: "batch", title = %title, reason = %entry.reason, "left for review: {}", entry.text);
        }
        if !unit.has_changes() {
            let mut item = ItemResult::new(title, ItemStatus::Unchanged);
            item.unclassified = unclassified;
            return Ok(item);
        }

        let replacements = unit.replacements.len();
        let new_text = unit.apply();
        let mut item = if options.dry_run {
            ItemResult::new(title, ItemStatus::WouldUpdate)
        } else {
            api.edit_page(title, &new_text, summary)
                .with_context(|| format!("failed to save {title}"))?;
            ItemResult::new(title, ItemStatus::Updated)
        }
        .with_detail(format!("{replacements} replacement(s)"));
        item.unclassified = unclassified;
        if options.show_diff {
            item.diff = Some(render_diff(title, &text, &new_text));
        }
        Ok(item)
    })
}

/// Read-only pass. `visit` returns an optional detail line for the page.
pub fn run_scan_batch<A, V>(
    api: &mut A,
    titles: &[String],
    options: &BatchOptions,
    action: &str,
    mut visit: V,
) -> BatchReport
where
    A: WikiReadApi + ?Sized,
    V: FnMut(&str, &str) -> Result<Option<String>>,
{
    run_batch(api, titles, options, action, |api, title| {
        let Some(text) = api
            .get_page_text(title)
            .with_context(|| format!("failed to fetch {title}"))?
        else {
            return Ok(ItemResult::new(title, ItemStatus::Skipped).with_detail("missing"));
        };
        let mut item = ItemResult::new(title, ItemStatus::Scanned);
        item.detail = visit(title, &text)?;
        Ok(item)
    })
}

pub fn render_diff(title: &str, old: &str, new: &str) -> String {
    TextDiff::from_lines(old, new)
        .unified_diff()
        .context_radius(2)
        .header(title, title)
        .to_string()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::{Context, anyhow};

    use super::{
        BatchOptions, ItemStatus, render_diff, run_batch, run_edit_batch, run_scan_batch,
    };
    use crate::api::ApiErrorKind;
    use crate::api::mock::MockApi;
    use crate::rewrite::{MediaEmbedPolicy, plan_template_rewrites};

    fn quick_options() -> BatchOptions {
        BatchOptions {
            rate_limit_cooldown: Duration::ZERO,
            ..BatchOptions::default()
        }
    }

    fn titles(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    fn media_embed_plan(
        title: &str,
        text: &str,
    ) -> anyhow::Result<crate::rewrite::PageEditUnit> {
        Ok(plan_template_rewrites(
            title,
            text,
            &["ill".to_string()],
            &MediaEmbedPolicy::default(),
        ))
    }

    #[test]
    fn edit_batch_saves_changed_pages_only() {
        let mut api = MockApi::with_pages(&[
            ("Ise", "Intro {{ill|File:Ise.jpg|ja|伊勢}} end"),
            ("Izumo", "No templates here"),
        ]);
        let report = run_edit_batch(
            &mut api,
            &titles(&["Ise", "Izumo", "Missing"]),
            "Bot: fix ill",
            &quick_options(),
            "fix-file-ills",
            media_embed_plan,
        );

        assert_eq!(report.processed, 3);
        assert_eq!(report.updated, 1);
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.skipped, 1);
        assert!(report.success);
        assert_eq!(api.edits.len(), 1);
        assert_eq!(api.edits[0].title, "Ise");
        assert_eq!(api.edits[0].content, "Intro [[File:Ise.jpg|thumb]] end");
        assert_eq!(api.edits[0].summary, "Bot: fix ill");
        assert_eq!(report.items[2].detail.as_deref(), Some("missing"));
    }

    #[test]
    fn dry_run_reports_without_saving() {
        let mut api = MockApi::with_pages(&[("Ise", "{{ill|File:Ise.jpg}}\n")]);
        let options = BatchOptions {
            dry_run: true,
            show_diff: true,
            ..quick_options()
        };
        let report = run_edit_batch(
            &mut api,
            &titles(&["Ise"]),
            "summary",
            &options,
            "fix-file-ills",
            media_embed_plan,
        );
        assert!(report.dry_run);
        assert_eq!(report.items[0].status, ItemStatus::WouldUpdate);
        assert!(api.edits.is_empty());
        let diff = report.items[0].diff.as_deref().expect("diff");
        assert!(diff.contains("-{{ill|File:Ise.jpg}}"));
        assert!(diff.contains("+[[File:Ise.jpg|thumb]]"));
    }

    #[test]
    fn failures_are_classified_and_batch_continues() {
        let mut api = MockApi::with_pages(&[
            ("Locked", "{{ill|File:A.jpg}}"),
            ("Busy", "{{ill|File:B.jpg}}"),
            ("Open", "{{ill|File:C.jpg}}"),
        ]);
        api.write_failures
            .insert("Locked".to_string(), ApiErrorKind::PermissionDenied);
        api.write_failures
            .insert("Busy".to_string(), ApiErrorKind::RateLimited);

        let report = run_edit_batch(
            &mut api,
            &titles(&["Locked", "Busy", "Open"]),
            "summary",
            &quick_options(),
            "fix-file-ills",
            media_embed_plan,
        );

        assert_eq!(report.failed, 1);
        assert_eq!(report.rate_limited, 1);
        assert_eq!(report.cooldowns, 1);
        assert_eq!(report.updated, 1);
        assert!(!report.success);
        assert!(report.has_failures());
        assert_eq!(
            report.items[0].error_kind,
            Some(ApiErrorKind::PermissionDenied)
        );
        assert_eq!(report.items[1].status, ItemStatus::RateLimited);
        assert_eq!(api.edits.len(), 1);
        assert_eq!(api.edits[0].title, "Open");
    }

    #[test]
    fn unclassified_invocations_are_counted_not_rewritten() {
        let mut api = MockApi::with_pages(&[("Broken", "A {{ill|File:X.jpg|[[oops}} B")]);
        let report = run_edit_batch(
            &mut api,
            &titles(&["Broken"]),
            "summary",
            &quick_options(),
            "fix-file-ills",
            media_embed_plan,
        );
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.unclassified, 1);
        assert!(api.edits.is_empty());
    }

    #[test]
    fn limit_caps_processed_titles() {
        let mut api = MockApi::with_pages(&[("A", "x"), ("B", "y"), ("C", "z")]);
        let options = BatchOptions {
            limit: Some(1),
            ..quick_options()
        };
        let report = run_scan_batch(
            &mut api,
            &titles(&["A", "B", "C"]),
            &options,
            "scan",
            |_, text| Ok(Some(format!("{} bytes", text.len()))),
        );
        assert_eq!(report.processed, 1);
        assert_eq!(report.scanned, 1);
        assert_eq!(report.items[0].detail.as_deref(), Some("1 bytes"));
        assert_eq!(report.request_count, 1);
    }

    #[test]
    fn read_failures_mark_item_failed() {
        let mut api = MockApi::with_pages(&[("A", "x")]);
        api.read_failures
            .insert("A".to_string(), ApiErrorKind::RemoteUnavailable);
        let report = run_scan_batch(&mut api, &titles(&["A"]), &quick_options(), "scan", |_, _| {
            Ok(None)
        });
        assert_eq!(report.failed, 1);
        assert_eq!(
            report.items[0].error_kind,
            Some(ApiErrorKind::RemoteUnavailable)
        );
        assert!(
            report.items[0]
                .detail
                .as_deref()
                .is_some_and(|detail| detail.contains("failed to fetch A"))
        );
    }

    #[test]
    fn untyped_error_on_numbered_title_counts_as_failed() {
        let mut api = MockApi::default();
        let report = run_batch(
            &mut api,
            &titles(&["Emperor 429"]),
            &quick_options(),
            "fix-file-ills",
            |_, title| {
                Err(anyhow!("MediaWiki edit failed for {title}: Failure"))
                    .with_context(|| format!("failed to save {title}"))
            },
        );
        assert_eq!(report.items[0].status, ItemStatus::Failed);
        assert_eq!(report.items[0].error_kind, Some(ApiErrorKind::Other));
        assert_eq!(report.failed, 1);
        assert_eq!(report.rate_limited, 0);
        assert_eq!(report.cooldowns, 0);
    }

    #[test]
    fn diff_marks_changed_lines() {
        let diff = render_diff("Page", "one\ntwo\n", "one\nthree\n");
        assert!(diff.contains("--- Page"));
        assert!(diff.contains("-two"));
        assert!(diff.contains("+three"));
    }
}
