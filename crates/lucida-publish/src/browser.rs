//! Minimal cookie-keeping HTTP "browser": navigate to pages, look up forms by
//! id or name, fill and submit them, and call JSON endpoints with the same
//! session.
//!
//! Requests carry no overall timeout. A navigation that hangs is abandoned
//! by the sequencer watchdog, which then re-invokes the stage.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::HeaderMap;
use reqwest::{Method, Url};

const USER_AGENT: &str = concat!("lucida-publish/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid url '{0}'")]
    InvalidUrl(String),

    #[error("element not found: {0}")]
    ElementMissing(String),
}

pub type Result<T> = std::result::Result<T, BrowserError>;

// ---------------------------------------------------------------------------
// HTML scanning
// ---------------------------------------------------------------------------

static FORM_RE: OnceLock<Regex> = OnceLock::new();
static INPUT_RE: OnceLock<Regex> = OnceLock::new();
static ATTR_RE: OnceLock<Regex> = OnceLock::new();
static TITLE_RE: OnceLock<Regex> = OnceLock::new();

fn form_re() -> &'static Regex {
    FORM_RE.get_or_init(|| Regex::new(r"(?is)<form\b([^>]*)>(.*?)</form\s*>").unwrap())
}

fn input_re() -> &'static Regex {
    INPUT_RE.get_or_init(|| Regex::new(r"(?is)<input\b([^>]*)>").unwrap())
}

fn attr_re() -> &'static Regex {
    ATTR_RE.get_or_init(|| {
        Regex::new(r#"(?i)([a-z_:][-a-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
            .unwrap()
    })
}

fn title_re() -> &'static Regex {
    TITLE_RE.get_or_init(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title\s*>").unwrap())
}

fn decode_entities(s: &str) -> String {
    s.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

fn attributes(tag: &str) -> Vec<(String, String)> {
    attr_re()
        .captures_iter(tag)
        .map(|c| {
            let value = c
                .get(2)
                .or_else(|| c.get(3))
                .or_else(|| c.get(4))
                .map_or("", |m| m.as_str());
            (c[1].to_ascii_lowercase(), decode_entities(value))
        })
        .collect()
}

fn attr<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

// ---------------------------------------------------------------------------
// Page / Form
// ---------------------------------------------------------------------------

/// A loaded document.
#[derive(Debug, Clone)]
pub struct Page {
    /// Final URL after redirects.
    pub url: Url,
    pub status: u16,
    pub html: String,
}

impl Page {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn title(&self) -> Option<String> {
        title_re()
            .captures(&self.html)
            .map(|c| decode_entities(c[1].trim()))
    }

    /// Case-insensitive text search over the raw document.
    pub fn contains(&self, needle: &str) -> bool {
        self.html
            .to_ascii_lowercase()
            .contains(&needle.to_ascii_lowercase())
    }

    pub fn forms(&self) -> Vec<Form> {
        form_re()
            .captures_iter(&self.html)
            .map(|c| Form::parse(&self.url, &c[1], &c[2]))
            .collect()
    }

    /// Find a form by its `id` or `name` attribute.
    pub fn form(&self, key: &str) -> Option<Form> {
        self.forms()
            .into_iter()
            .find(|f| f.id.as_deref() == Some(key) || f.name.as_deref() == Some(key))
    }

    /// Find the first form that carries every one of `fields`.
    pub fn form_with_fields(&self, fields: &[&str]) -> Option<Form> {
        self.forms()
            .into_iter()
            .find(|f| fields.iter().all(|name| f.has_field(name)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Form {
    pub id: Option<String>,
    pub name: Option<String>,
    /// Absolute submit URL.
    pub action: Url,
    pub method: Method,
    pub fields: Vec<(String, String)>,
}

impl Form {
    fn parse(base: &Url, form_attrs: &str, body: &str) -> Form {
        let attrs = attributes(form_attrs);
        let action = attr(&attrs, "action")
            .filter(|a| !a.is_empty())
            .and_then(|a| base.join(a).ok())
            .unwrap_or_else(|| base.clone());
        let method = match attr(&attrs, "method").map(str::to_ascii_uppercase).as_deref() {
            Some("POST") => Method::POST,
            _ => Method::GET,
        };
        let fields = input_re()
            .captures_iter(body)
            .filter_map(|c| {
                let input = attributes(&c[1]);
                let name = attr(&input, "name")?.to_string();
                let value = attr(&input, "value").unwrap_or("").to_string();
                Some((name, value))
            })
            .collect();
        Form {
            id: attr(&attrs, "id").map(String::from),
            name: attr(&attrs, "name").map(String::from),
            action,
            method,
            fields,
        }
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|(k, _)| k == name)
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Set an existing field. Fails when the form has no such input.
    pub fn fill(&mut self, name: &str, value: impl Into<String>) -> Result<()> {
        let slot = self
            .fields
            .iter_mut()
            .find(|(k, _)| k == name)
            .ok_or_else(|| BrowserError::ElementMissing(format!("input[name={name}]")))?;
        slot.1 = value.into();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JSON responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct JsonResponse {
    pub status: u16,
    /// `None` when the body is empty or not JSON.
    pub body: Option<serde_json::Value>,
}

impl JsonResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// ---------------------------------------------------------------------------
// Browser
// ---------------------------------------------------------------------------

pub struct Browser {
    client: reqwest::Client,
    jar: Arc<Jar>,
}

impl Browser {
    pub fn new() -> Result<Self> {
        let jar = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .cookie_provider(jar.clone())
            .build()?;
        Ok(Self { client, jar })
    }

    fn parse_url(url: &str) -> Result<Url> {
        Url::parse(url).map_err(|_| BrowserError::InvalidUrl(url.to_string()))
    }

    async fn load(&self, req: reqwest::RequestBuilder) -> Result<Page> {
        let resp = req.send().await?;
        let url = resp.url().clone();
        let status = resp.status().as_u16();
        let html = resp.text().await?;
        tracing::debug!(%url, status, bytes = html.len(), "page loaded");
        Ok(Page { url, status, html })
    }

    pub async fn navigate(&self, url: &str) -> Result<Page> {
        let url = Self::parse_url(url)?;
        self.load(self.client.get(url)).await
    }

    pub async fn submit(&self, form: &Form) -> Result<Page> {
        let req = if form.method == Method::POST {
            self.client.post(form.action.clone()).form(&form.fields)
        } else {
            self.client.get(form.action.clone()).query(&form.fields)
        };
        self.load(req).await
    }

    /// Value of cookie `name` as it would be sent to `url`.
    pub fn cookie(&self, url: &str, name: &str) -> Option<String> {
        let url = Url::parse(url).ok()?;
        let header = self.jar.cookies(&url)?;
        let header = header.to_str().ok()?;
        header.split(';').find_map(|pair| {
            let (k, v) = pair.trim().split_once('=')?;
            (k == name).then(|| v.to_string())
        })
    }

    pub async fn get_json(&self, url: &str, headers: HeaderMap) -> Result<JsonResponse> {
        let url = Self::parse_url(url)?;
        self.json(self.client.get(url).headers(headers)).await
    }

    pub async fn put_json(
        &self,
        url: &str,
        body: &serde_json::Value,
        headers: HeaderMap,
    ) -> Result<JsonResponse> {
        let url = Self::parse_url(url)?;
        self.json(self.client.put(url).headers(headers).json(body))
            .await
    }

    async fn json(&self, req: reqwest::RequestBuilder) -> Result<JsonResponse> {
        let resp = req.send().await?;
        let status = resp.status().as_u16();
        let text = resp.text().await?;
        Ok(JsonResponse {
            status,
            body: serde_json::from_str(&text).ok(),
        })
    }
}
