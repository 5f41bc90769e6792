use std::env;
use std::fmt;
use std::thread::sleep;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::BatchConfig;

pub const CATEGORY_PREFIX: &str = "Category:";

/// Coarse classification of a failed wiki request, used by the batch runner
/// to decide between skip, fail and cool down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorKind {
    NotFound,
    Conflict,
    PermissionDenied,
    RateLimited,
    RemoteUnavailable,
    Other,
}

impl ApiErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::PermissionDenied => "permission_denied",
            Self::RateLimited => "rate_limited",
            Self::RemoteUnavailable => "remote_unavailable",
            Self::Other => "other",
        }
    }

    /// Maps a MediaWiki API error code onto a kind.
    pub fn from_api_code(code: &str) -> Self {
        match code {
            "ratelimited" => Self::RateLimited,
            "missingtitle" | "nosuchpageid" => Self::NotFound,
            "editconflict" | "articleexists" | "pagedeleted" | "selfmove" => Self::Conflict,
            "permissiondenied" | "protectedpage" | "protectedtitle" | "cascadeprotected"
            | "badtoken" | "notloggedin" | "cantmove" | "cantdelete" => Self::PermissionDenied,
            "maxlag" | "readonly" | "internal_api_error_DBQueryError" => Self::RemoteUnavailable,
            other if other.starts_with("assert") => Self::PermissionDenied,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct WikiApiError {
    pub kind: ApiErrorKind,
    pub message: String,
}

impl WikiApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn from_api_error(code: &str, info: &str) -> Self {
        Self::new(
            ApiErrorKind::from_api_code(code),
            format!("MediaWiki API error [{code}]: {info}"),
        )
    }
}

/// Finds the request classification anywhere in an error chain. Errors that
/// never passed through the client are `Other`.
pub fn error_kind(error: &anyhow::Error) -> ApiErrorKind {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<WikiApiError>())
        .map_or(ApiErrorKind::Other, |api_error| api_error.kind)
}

pub trait WikiReadApi {
    /// Current wikitext of a page, or `None` when the page does not exist.
    fn get_page_text(&mut self, title: &str) -> Result<Option<String>>;
    fn get_category_members(&mut self, category: &str, namespace: Option<i32>)
    -> Result<Vec<String>>;
    fn request_count(&self) -> usize;

    fn page_exists(&mut self, title: &str) -> Result<bool> {
        Ok(self.get_page_text(title)?.is_some())
    }
}

pub trait WikiWriteApi: WikiReadApi {
    fn login(&mut self, username: &str, password: &str) -> Result<()>;
    fn edit_page(&mut self, title: &str, content: &str, summary: &str) -> Result<()>;
    /// Like `edit_page` but fails with a conflict when the title already exists.
    fn create_page(&mut self, title: &str, content: &str, summary: &str) -> Result<()>;
    fn delete_page(&mut self, title: &str, reason: &str) -> Result<()>;
    fn move_page(&mut self, from: &str, to: &str, reason: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct MediaWikiClientConfig {
    pub api_url: String,
    pub user_agent: String,
    pub timeout_ms: u64,
    pub rate_limit_read_ms: u64,
    pub rate_limit_write_ms: u64,
    pub max_retries: usize,
    pub max_write_retries: usize,
    pub retry_delay_ms: u64,
}

impl MediaWikiClientConfig {
    pub fn from_config(config: &BatchConfig) -> Self {
        Self {
            api_url: config.api_url_owned().unwrap_or_default(),
            user_agent: config.user_agent(),
            timeout_ms: env_value_u64("WIKI_HTTP_TIMEOUT_MS", 30_000),
            rate_limit_read_ms: env_value_u64(
                "WIKI_RATE_LIMIT_READ",
                duration_millis(config.read_delay()),
            ),
            rate_limit_write_ms: env_value_u64(
                "WIKI_RATE_LIMIT_WRITE",
                duration_millis(config.write_delay()),
            ),
            max_retries: env_value_usize("WIKI_HTTP_RETRIES", 2),
            max_write_retries: env_value_usize("WIKI_HTTP_WRITE_RETRIES", 1),
            retry_delay_ms: env_value_u64("WIKI_HTTP_RETRY_DELAY_MS", 500),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum RequestMethod {
    Get,
    Post,
}

pub struct MediaWikiClient {
    client: Client,
    config: MediaWikiClientConfig,
    last_request_at: Option<Instant>,
    request_count: usize,
    csrf_token: Option<String>,
}

impl MediaWikiClient {
    pub fn new(config: MediaWikiClientConfig) -> Result<Self> {
        if config.api_url.trim().is_empty() {
            bail!("wiki API URL is not configured (set WIKI_API_URL or [wiki].api_url)");
        }
        Url::parse(&config.api_url)
            .with_context(|| format!("invalid wiki API URL: {}", config.api_url))?;
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .cookie_store(true)
            .build()
            .context("failed to build MediaWiki HTTP client")?;

        Ok(Self {
            client,
            config,
            last_request_at: None,
            request_count: 0,
            csrf_token: None,
        })
    }

    pub fn config(&self) -> &MediaWikiClientConfig {
        &self.config
    }

    fn request_json(
        &mut self,
        method: RequestMethod,
        params: &[(&str, String)],
        is_write: bool,
    ) -> Result<Value> {
        let max_retries = if is_write {
            self.config.max_write_retries
        } else {
            self.config.max_retries
        };
        let mut pairs = Vec::with_capacity(params.len() + 2);
        pairs.push(("format".to_string(), "json".to_string()));
        pairs.push(("formatversion".to_string(), "2".to_string()));
        for (key, value) in params {
            if !value.is_empty() {
                pairs.push(((*key).to_string(), value.clone()));
            }
        }

        for attempt in 0..=max_retries {
            self.apply_rate_limit(is_write);
            let request = match method {
                RequestMethod::Get => self.client.get(&self.config.api_url).query(&pairs),
                RequestMethod::Post => self.client.post(&self.config.api_url).form(&pairs),
            };
            let response = request
                .header("User-Agent", self.config.user_agent.clone())
                .send();

            match response {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        return Err(WikiApiError::new(
                            ApiErrorKind::RateLimited,
                            format!("MediaWiki API request failed with HTTP {status}"),
                        )
                        .into());
                    }
                    if !status.is_success() {
                        if attempt < max_retries && is_retryable_status(status) {
                            self.wait_before_retry(attempt, is_write);
                            continue;
                        }
                        return Err(WikiApiError::new(
                            status_error_kind(status),
                            format!("MediaWiki API request failed with HTTP {status}"),
                        )
                        .into());
                    }

                    let payload: Value = response
                        .json()
                        .context("failed to decode MediaWiki API JSON response")?;
                    check_api_error(&payload)?;
                    return Ok(payload);
                }
                Err(error) => {
                    if attempt < max_retries && is_retryable_error(&error) {
                        self.wait_before_retry(attempt, is_write);
                        continue;
                    }
                    let kind = if is_retryable_error(&error) {
                        ApiErrorKind::RemoteUnavailable
                    } else {
                        ApiErrorKind::Other
                    };
                    return Err(anyhow::Error::new(WikiApiError::new(
                        kind,
                        format!("failed to call MediaWiki API: {error}"),
                    )));
                }
            }
        }

        Err(WikiApiError::new(
            ApiErrorKind::RemoteUnavailable,
            "MediaWiki API request exhausted retry budget",
        )
        .into())
    }

    fn request_json_get(&mut self, params: &[(&str, String)]) -> Result<Value> {
        self.request_json(RequestMethod::Get, params, false)
    }

    fn request_json_post(&mut self, params: &[(&str, String)], is_write: bool) -> Result<Value> {
        self.request_json(RequestMethod::Post, params, is_write)
    }

    fn apply_rate_limit(&mut self, is_write: bool) {
        let delay = if is_write {
            Duration::from_millis(self.config.rate_limit_write_ms)
        } else {
            Duration::from_millis(self.config.rate_limit_read_ms)
        };
        if let Some(last) = self.last_request_at {
            let elapsed = last.elapsed();
            if elapsed < delay {
                sleep(delay - elapsed);
            }
        }
        self.last_request_at = Some(Instant::now());
        self.request_count += 1;
    }

    fn wait_before_retry(&self, attempt: usize, is_write: bool) {
        let exponent = u32::try_from(attempt).unwrap_or(16);
        let base = self
            .config
            .retry_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent));
        let jitter = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| u64::from(duration.subsec_millis() % 100))
            .unwrap_or(0);
        let multiplier = if is_write { 2u64 } else { 1u64 };
        let delay = Duration::from_millis(base.saturating_mul(multiplier).saturating_add(jitter));
        tracing::debug!(target: "api", attempt, ?delay, "retrying MediaWiki request");
        sleep(delay);
    }

    fn ensure_csrf_token(&mut self) -> Result<String> {
        if let Some(token) = &self.csrf_token {
            return Ok(token.clone());
        }
        let response = self.request_json_get(&[
            ("action", "query".to_string()),
            ("meta", "tokens".to_string()),
        ])?;
        let parsed: TokenQueryResponse =
            serde_json::from_value(response).context("failed to decode csrf token response")?;
        let token = parsed
            .query
            .tokens
            .and_then(|tokens| tokens.csrftoken)
            .ok_or_else(|| anyhow::anyhow!("failed to get MediaWiki csrf token"))?;
        self.csrf_token = Some(token.clone());
        Ok(token)
    }

    fn submit_edit(
        &mut self,
        title: &str,
        content: &str,
        summary: &str,
        create_only: bool,
    ) -> Result<()> {
        let token = self.ensure_csrf_token()?;
        let mut params = vec![
            ("action", "edit".to_string()),
            ("title", title.to_string()),
            ("text", content.to_string()),
            ("summary", summary.to_string()),
            ("bot", "1".to_string()),
        ];
        if create_only {
            params.push(("createonly", "1".to_string()));
        }
        params.push(("token", token));

        let response = self.request_json_post(&params, true)?;
        let edit_payload: EditResponse =
            serde_json::from_value(response).context("failed to decode edit response")?;
        let edit = edit_payload
            .edit
            .ok_or_else(|| anyhow::anyhow!("missing edit payload in API response"))?;
        if edit.result.as_deref() != Some("Success") {
            bail!(
                "MediaWiki edit failed for {}: {}",
                title,
                edit.result.unwrap_or_else(|| "unknown".to_string())
            );
        }
        Ok(())
    }
}

impl WikiReadApi for MediaWikiClient {
    fn get_page_text(&mut self, title: &str) -> Result<Option<String>> {
        let response = self.request_json_get(&[
            ("action", "query".to_string()),
            ("titles", title.to_string()),
            ("prop", "revisions".to_string()),
            ("rvprop", "content".to_string()),
            ("rvslots", "main".to_string()),
        ])?;
        page_text_from_response(response)
            .with_context(|| format!("failed to read page content for {title}"))
    }

    fn get_category_members(
        &mut self,
        category: &str,
        namespace: Option<i32>,
    ) -> Result<Vec<String>> {
        let mut titles = Vec::new();
        let mut continue_token: Option<String> = None;
        let category_title = category_page_title(category);

        loop {
            let mut params = vec![
                ("action", "query".to_string()),
                ("list", "categorymembers".to_string()),
                ("cmtitle", category_title.clone()),
                ("cmlimit", "500".to_string()),
            ];
            if let Some(namespace) = namespace {
                params.push(("cmnamespace", namespace.to_string()));
            }
            if let Some(token) = &continue_token {
                params.push(("cmcontinue", token.clone()));
            }

            let response = self.request_json_get(&params)?;
            let parsed: QueryResponse = serde_json::from_value(response)
                .context("failed to decode categorymembers API response")?;
            for item in parsed.query.categorymembers {
                titles.push(item.title);
            }

            continue_token = parsed.continuation.and_then(|cont| cont.cmcontinue);
            if continue_token.is_none() {
                break;
            }
        }

        tracing::debug!(target: "api", category = %category_title, count = titles.len(), "listed category members");
        Ok(titles)
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

impl WikiWriteApi for MediaWikiClient {
    fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let token_response = self.request_json_get(&[
            ("action", "query".to_string()),
            ("meta", "tokens".to_string()),
            ("type", "login".to_string()),
        ])?;
        let token_payload: TokenQueryResponse = serde_json::from_value(token_response)
            .context("failed to decode login token response")?;
        let login_token = token_payload
            .query
            .tokens
            .and_then(|tokens| tokens.logintoken)
            .ok_or_else(|| anyhow::anyhow!("failed to get MediaWiki login token"))?;

        let login_response = self.request_json_post(
            &[
                ("action", "login".to_string()),
                ("lgname", username.to_string()),
                ("lgpassword", password.to_string()),
                ("lgtoken", login_token),
            ],
            true,
        )?;
        let login_payload: LoginResponse =
            serde_json::from_value(login_response).context("failed to decode login response")?;
        match login_payload.login.result.as_deref() {
            Some("Success") => {
                self.csrf_token = None;
                tracing::info!(target: "api", user = username, "logged in");
                Ok(())
            }
            other => Err(WikiApiError::new(
                ApiErrorKind::PermissionDenied,
                format!(
                    "MediaWiki login failed: {}",
                    login_payload
                        .login
                        .reason
                        .or_else(|| other.map(ToString::to_string))
                        .unwrap_or_else(|| "unknown error".to_string())
                ),
            )
            .into()),
        }
    }

    fn edit_page(&mut self, title: &str, content: &str, summary: &str) -> Result<()> {
        self.submit_edit(title, content, summary, false)
    }

    fn create_page(&mut self, title: &str, content: &str, summary: &str) -> Result<()> {
        self.submit_edit(title, content, summary, true)
    }

    fn delete_page(&mut self, title: &str, reason: &str) -> Result<()> {
        let token = self.ensure_csrf_token()?;
        self.request_json_post(
            &[
                ("action", "delete".to_string()),
                ("title", title.to_string()),
                ("reason", reason.to_string()),
                ("token", token),
            ],
            true,
        )?;
        Ok(())
    }

    fn move_page(&mut self, from: &str, to: &str, reason: &str) -> Result<()> {
        let token = self.ensure_csrf_token()?;
        self.request_json_post(
            &[
                ("action", "move".to_string()),
                ("from", from.to_string()),
                ("to", to.to_string()),
                ("reason", reason.to_string()),
                ("movetalk", "1".to_string()),
                ("token", token),
            ],
            true,
        )?;
        Ok(())
    }
}

/// `Foo` and `Category:Foo` both name the category page `Category:Foo`.
pub fn category_page_title(category: &str) -> String {
    let trimmed = category.trim();
    if trimmed.starts_with(CATEGORY_PREFIX) {
        trimmed.to_string()
    } else {
        format!("{CATEGORY_PREFIX}{trimmed}")
    }
}

fn check_api_error(payload: &Value) -> Result<()> {
    if let Some(error) = payload.get("error") {
        let code = error
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error");
        let info = error
            .get("info")
            .and_then(Value::as_str)
            .unwrap_or("unknown info");
        return Err(WikiApiError::from_api_error(code, info).into());
    }
    Ok(())
}

fn page_text_from_response(response: Value) -> Result<Option<String>> {
    let parsed: QueryResponse =
        serde_json::from_value(response).context("failed to decode page content API response")?;
    let Some(page) = parsed.query.pages.into_iter().next() else {
        return Ok(None);
    };
    if page.missing.unwrap_or(false) || page.invalid.unwrap_or(false) {
        return Ok(None);
    }
    let content = page
        .revisions
        .into_iter()
        .next()
        .and_then(|revision| revision.slots)
        .and_then(|slots| slots.main)
        .map(|slot| slot.content)
        .ok_or_else(|| anyhow::anyhow!("page {} has no main slot content", page.title))?;
    Ok(Some(content))
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn env_value_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_value_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn status_error_kind(status: StatusCode) -> ApiErrorKind {
    match status {
        StatusCode::TOO_MANY_REQUESTS => ApiErrorKind::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiErrorKind::PermissionDenied,
        status if is_retryable_status(status) => ApiErrorKind::RemoteUnavailable,
        _ => ApiErrorKind::Other,
    }
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

#[derive(Debug, Deserialize, Default)]
struct QueryResponse {
    #[serde(default)]
    query: QueryPayload,
    #[serde(default, rename = "continue")]
    continuation: Option<ContinuationPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct QueryPayload {
    #[serde(default)]
    categorymembers: Vec<TitleQueryItem>,
    #[serde(default)]
    pages: Vec<PageQueryItem>,
}

#[derive(Debug, Deserialize, Default)]
struct ContinuationPayload {
    cmcontinue: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TitleQueryItem {
    title: String,
}

#[derive(Debug, Deserialize)]
struct PageQueryItem {
    title: String,
    missing: Option<bool>,
    invalid: Option<bool>,
    #[serde(default)]
    revisions: Vec<RevisionQueryItem>,
}

#[derive(Debug, Deserialize)]
struct RevisionQueryItem {
    slots: Option<RevisionSlotContainer>,
}

#[derive(Debug, Deserialize)]
struct RevisionSlotContainer {
    main: Option<RevisionMainSlot>,
}

#[derive(Debug, Deserialize)]
struct RevisionMainSlot {
    content: String,
}

#[derive(Debug, Deserialize, Default)]
struct TokenQueryResponse {
    #[serde(default)]
    query: TokenQueryPayload,
}

#[derive(Debug, Deserialize, Default)]
struct TokenQueryPayload {
    tokens: Option<TokenPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct TokenPayload {
    logintoken: Option<String>,
    csrftoken: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct LoginResponse {
    #[serde(default)]
    login: LoginPayload,
}

#[derive(Debug, Deserialize, Default)]
struct LoginPayload {
    result: Option<String>,
    reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct EditResponse {
    edit: Option<EditPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct EditPayload {
    result: Option<String>,
}


#[cfg(test)]
mod tests {
    use anyhow::Context;
    use serde_json::json;

    use super::{
        ApiErrorKind, MediaWikiClient, MediaWikiClientConfig, StatusCode, WikiApiError,
        category_page_title, check_api_error, error_kind, is_retryable_status,
        page_text_from_response, status_error_kind,
    };
    use crate::config::BatchConfig;

    #[test]
    fn api_codes_map_to_error_kinds() {
        assert_eq!(ApiErrorKind::from_api_code("ratelimited"), ApiErrorKind::RateLimited);
        assert_eq!(ApiErrorKind::from_api_code("missingtitle"), ApiErrorKind::NotFound);
        assert_eq!(ApiErrorKind::from_api_code("editconflict"), ApiErrorKind::Conflict);
        assert_eq!(ApiErrorKind::from_api_code("articleexists"), ApiErrorKind::Conflict);
        assert_eq!(
            ApiErrorKind::from_api_code("protectedpage"),
            ApiErrorKind::PermissionDenied
        );
        assert_eq!(
            ApiErrorKind::from_api_code("assertbotfailed"),
            ApiErrorKind::PermissionDenied
        );
        assert_eq!(ApiErrorKind::from_api_code("maxlag"), ApiErrorKind::RemoteUnavailable);
        assert_eq!(ApiErrorKind::from_api_code("spamblacklist"), ApiErrorKind::Other);
    }

    #[test]
    fn error_kind_survives_added_context() {
        let error: anyhow::Error =
            WikiApiError::new(ApiErrorKind::RateLimited, "slow down").into();
        let wrapped = Err::<(), _>(error)
            .context("failed to edit Shrine")
            .expect_err("must fail");
        assert_eq!(error_kind(&wrapped), ApiErrorKind::RateLimited);
    }

    #[test]
    fn untyped_errors_are_other_even_with_status_like_text() {
        let error = anyhow::anyhow!("MediaWiki edit failed for Emperor 429: Failure")
            .context("failed to save Emperor 429");
        assert_eq!(error_kind(&error), ApiErrorKind::Other);
        let error = anyhow::anyhow!("connection reset");
        assert_eq!(error_kind(&error), ApiErrorKind::Other);
    }

    #[test]
    fn api_error_payload_becomes_classified_error() {
        let payload = json!({"error": {"code": "ratelimited", "info": "You've exceeded your rate limit."}});
        let error = check_api_error(&payload).expect_err("must fail");
        assert_eq!(error_kind(&error), ApiErrorKind::RateLimited);
        assert!(error.to_string().contains("[ratelimited]"));
        assert!(check_api_error(&json!({"query": {}})).is_ok());
    }

    #[test]
    fn rate_limit_status_is_not_retried() {
        assert!(!is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert_eq!(
            status_error_kind(StatusCode::TOO_MANY_REQUESTS),
            ApiErrorKind::RateLimited
        );
        assert_eq!(
            status_error_kind(StatusCode::BAD_GATEWAY),
            ApiErrorKind::RemoteUnavailable
        );
        assert_eq!(
            status_error_kind(StatusCode::FORBIDDEN),
            ApiErrorKind::PermissionDenied
        );
    }

    #[test]
    fn page_text_reads_main_slot_and_missing_pages() {
        let response = json!({
            "query": {"pages": [{
                "pageid": 12,
                "ns": 0,
                "title": "Ise Grand Shrine",
                "revisions": [{"slots": {"main": {"contentmodel": "wikitext", "content": "Body {{ill|A|ja|B}}"}}}]
            }]}
        });
        assert_eq!(
            page_text_from_response(response).expect("decode").as_deref(),
            Some("Body {{ill|A|ja|B}}")
        );

        let missing = json!({"query": {"pages": [{"ns": 0, "title": "Nope", "missing": true}]}});
        assert_eq!(page_text_from_response(missing).expect("decode"), None);
    }

    #[test]
    fn category_titles_are_prefixed_once() {
        assert_eq!(category_page_title("Shinto shrines"), "Category:Shinto shrines");
        assert_eq!(
            category_page_title(" Category:Shinto shrines "),
            "Category:Shinto shrines"
        );
    }

    #[test]
    fn client_config_takes_delays_from_batch_config() {
        let config: BatchConfig = toml::from_str(
            "[wiki]\napi_url = \"https://wiki.example.org/w/api.php\"\n[batch]\nwrite_delay_ms = 750\nread_delay_ms = 20\n",
        )
        .expect("parse config");
        let client_config = MediaWikiClientConfig::from_config(&config);
        assert_eq!(client_config.rate_limit_write_ms, 750);
        assert_eq!(client_config.rate_limit_read_ms, 20);
    }

    #[test]
    fn client_requires_api_url() {
        let mut config = MediaWikiClientConfig::from_config(&BatchConfig::default());
        config.api_url = String::new();
        let error = MediaWikiClient::new(config).err().expect("must fail");
        assert!(error.to_string().contains("not configured"));
    }
}
