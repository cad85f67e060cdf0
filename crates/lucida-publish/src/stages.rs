//! The publish-endpoint script, one [`Stage`] per portal interaction.
//!
//! Every stage re-reads remote state before acting so a re-invocation after
//! a watchdog expiry is harmless.

use async_trait::async_trait;
use lucida_core::{ExitStatus, Stage, StageOutcome};
use reqwest::header::{HeaderMap, HeaderValue};

use crate::browser::BrowserError;
use crate::PublishContext;

pub const LOGIN_FIELD: &str = "login";
pub const PASSWORD_FIELD: &str = "passwd";
pub const CSRF_COOKIE: &str = "XSRF-TOKEN";
pub const CSRF_HEADER: &str = "x-xsrf-token";

/// Build the ordered stage list.
pub fn publish_stages() -> Vec<Box<dyn Stage<PublishContext>>> {
    vec![
        Box::new(OpenSignIn),
        Box::new(SubmitCredentials),
        Box::new(OpenBot),
        Box::new(ReadCsrf),
        Box::new(PublishEndpoint),
    ]
}

/// Map an HTTP status from the portal onto a halt, or `None` for 2xx.
fn halt_for_status(status: u16) -> Option<StageOutcome> {
    let exit = match status {
        200..=299 => return None,
        401 => ExitStatus::BadCredentials,
        403 => ExitStatus::Forbidden,
        404 => ExitStatus::NotFound,
        _ => ExitStatus::MalformedResponse,
    };
    Some(StageOutcome::Halt(exit))
}

/// Missing elements mean the page is not what we expected.
fn element_missing(e: BrowserError) -> anyhow::Result<StageOutcome> {
    match e {
        BrowserError::ElementMissing(what) => {
            tracing::error!("expected element missing: {what}");
            Ok(StageOutcome::Halt(ExitStatus::MalformedResponse))
        }
        other => Err(other.into()),
    }
}

// ---------------------------------------------------------------------------
// 1. Sign-in page
// ---------------------------------------------------------------------------

pub struct OpenSignIn;

#[async_trait]
impl Stage<PublishContext> for OpenSignIn {
    fn name(&self) -> &str {
        "open-sign-in"
    }

    async fn run(&self, ctx: &mut PublishContext) -> anyhow::Result<StageOutcome> {
        let page = ctx.browser.navigate(&ctx.signin_url()).await?;
        if !page.is_success() {
            tracing::error!(status = page.status, "sign-in page unavailable");
            return Ok(StageOutcome::Halt(ExitStatus::MalformedResponse));
        }
        if page.form_with_fields(&[LOGIN_FIELD, PASSWORD_FIELD]).is_none() {
            tracing::error!(url = %page.url, "sign-in form not found");
            return Ok(StageOutcome::Halt(ExitStatus::MalformedResponse));
        }
        ctx.page = Some(page);
        Ok(StageOutcome::Advance)
    }
}

// ---------------------------------------------------------------------------
// 2. Credentials
// ---------------------------------------------------------------------------

pub struct SubmitCredentials;

#[async_trait]
impl Stage<PublishContext> for SubmitCredentials {
    fn name(&self) -> &str {
        "submit-credentials"
    }

    async fn run(&self, ctx: &mut PublishContext) -> anyhow::Result<StageOutcome> {
        // Reload rather than reuse ctx.page: a previous attempt may already
        // have signed in, in which case the portal no longer shows the form.
        let page = ctx.browser.navigate(&ctx.signin_url()).await?;
        if let Some(halt) = halt_for_status(page.status) {
            tracing::error!(status = page.status, "sign-in page unavailable");
            return Ok(halt);
        }
        let Some(mut form) = page.form_with_fields(&[LOGIN_FIELD, PASSWORD_FIELD]) else {
            tracing::info!("already signed in");
            ctx.page = Some(page);
            return Ok(StageOutcome::Advance);
        };

        if let Err(e) = form.fill(LOGIN_FIELD, ctx.params.user.as_str()) {
            return element_missing(e);
        }
        if let Err(e) = form.fill(PASSWORD_FIELD, ctx.params.password.as_str()) {
            return element_missing(e);
        }
        let landed = ctx.browser.submit(&form).await?;

        if landed.form("proofs").is_some() || landed.contains("verify your identity") {
            tracing::error!("account requires additional verification");
            return Ok(StageOutcome::Halt(ExitStatus::Forbidden));
        }
        if landed.contains("work or school account") {
            tracing::error!("account type does not match the portal");
            return Ok(StageOutcome::Halt(ExitStatus::Forbidden));
        }
        if landed
            .form_with_fields(&[LOGIN_FIELD, PASSWORD_FIELD])
            .is_some()
            || landed.status == 401
        {
            tracing::error!(user = %ctx.params.user, "credentials rejected");
            return Ok(StageOutcome::Halt(ExitStatus::BadCredentials));
        }
        if let Some(halt) = halt_for_status(landed.status) {
            return Ok(halt);
        }

        ctx.page = Some(landed);
        Ok(StageOutcome::Advance)
    }
}

// ---------------------------------------------------------------------------
// 3. Bot page
// ---------------------------------------------------------------------------

pub struct OpenBot;

#[async_trait]
impl Stage<PublishContext> for OpenBot {
    fn name(&self) -> &str {
        "open-bot"
    }

    async fn run(&self, ctx: &mut PublishContext) -> anyhow::Result<StageOutcome> {
        let page = ctx.browser.navigate(&ctx.bot_url()).await?;
        if page.status == 404 || page.contains("bot not found") {
            tracing::error!(handle = %ctx.params.handle, "bot not found");
            return Ok(StageOutcome::Halt(ExitStatus::NotFound));
        }
        if page
            .form_with_fields(&[LOGIN_FIELD, PASSWORD_FIELD])
            .is_some()
        {
            tracing::error!("portal bounced back to sign-in");
            return Ok(StageOutcome::Halt(ExitStatus::BadCredentials));
        }
        if let Some(halt) = halt_for_status(page.status) {
            return Ok(halt);
        }
        ctx.page = Some(page);
        Ok(StageOutcome::Advance)
    }
}

// ---------------------------------------------------------------------------
// 4. CSRF token
// ---------------------------------------------------------------------------

pub struct ReadCsrf;

#[async_trait]
impl Stage<PublishContext> for ReadCsrf {
    fn name(&self) -> &str {
        "read-csrf"
    }

    async fn run(&self, ctx: &mut PublishContext) -> anyhow::Result<StageOutcome> {
        match ctx.browser.cookie(&ctx.portal, CSRF_COOKIE) {
            Some(token) if !token.is_empty() => {
                ctx.csrf = Some(token);
                Ok(StageOutcome::Advance)
            }
            _ => {
                tracing::error!("{CSRF_COOKIE} cookie absent");
                Ok(StageOutcome::Halt(ExitStatus::BadCredentials))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// 5. Endpoint update
// ---------------------------------------------------------------------------

pub struct PublishEndpoint;

#[async_trait]
impl Stage<PublishContext> for PublishEndpoint {
    fn name(&self) -> &str {
        "publish-endpoint"
    }

    async fn run(&self, ctx: &mut PublishContext) -> anyhow::Result<StageOutcome> {
        let Some(csrf) = ctx.csrf.as_deref() else {
            return Ok(StageOutcome::Halt(ExitStatus::BadCredentials));
        };
        let mut headers = HeaderMap::new();
        headers.insert(CSRF_HEADER, HeaderValue::from_str(csrf)?);

        let url = ctx.bot_api_url();
        let current = ctx.browser.get_json(&url, headers.clone()).await?;
        if let Some(halt) = halt_for_status(current.status) {
            return Ok(halt);
        }
        let Some(mut bot) = current.body.filter(|b| b.get("properties").is_some_and(|p| p.is_object()))
        else {
            tracing::error!(%url, "bot settings response has no properties object");
            return Ok(StageOutcome::Halt(ExitStatus::MalformedResponse));
        };

        let endpoint = ctx.params.endpoint.as_str();
        if bot["properties"]["endpoint"].as_str() == Some(endpoint) {
            tracing::info!(endpoint, "endpoint already up to date");
            return Ok(StageOutcome::Advance);
        }
        bot["properties"]["endpoint"] = serde_json::Value::String(endpoint.to_string());

        let updated = ctx.browser.put_json(&url, &bot, headers).await?;
        if let Some(halt) = halt_for_status(updated.status) {
            return Ok(halt);
        }
        tracing::info!(handle = %ctx.params.handle, endpoint, "messaging endpoint updated");
        Ok(StageOutcome::Advance)
    }
}
