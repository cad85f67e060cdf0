//! Scripted update of a bot's messaging endpoint on the bot-framework portal.
//!
//! The portal has no API for this, so the crate signs in like a browser
//! would and drives a fixed [`Sequencer`] of stages:
//!
//! ```text
//! open-sign-in → submit-credentials → open-bot → read-csrf → publish-endpoint
//! ```
//!
//! The resulting [`ExitStatus`] is meant to become the process exit code.

pub mod browser;
pub mod stages;

use lucida_core::{ExitStatus, Outcome, Sequencer, SequencerOptions};
use reqwest::Url;

use crate::browser::{Browser, Page};

/// Invocation parameters. All four are required.
#[derive(Debug, Clone, Default)]
pub struct PublishParams {
    /// Bot handle as shown in the portal URL.
    pub handle: String,
    /// New messaging endpoint (the relay's public `/api/messages` URL).
    pub endpoint: String,
    pub user: String,
    pub password: String,
}

impl PublishParams {
    /// Names of the parameters that are empty.
    pub fn missing(&self) -> Vec<&'static str> {
        [
            ("handle", &self.handle),
            ("endpoint", &self.endpoint),
            ("user", &self.user),
            ("password", &self.password),
        ]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| k)
        .collect()
    }

    pub fn validate(&self) -> Result<(), ExitStatus> {
        if self.missing().is_empty() {
            Ok(())
        } else {
            Err(ExitStatus::MissingParameters)
        }
    }
}

/// Mutable state threaded through every stage.
pub struct PublishContext {
    pub browser: Browser,
    /// Portal base URL without trailing slash.
    pub portal: String,
    pub params: PublishParams,
    /// Last page a stage settled on.
    pub page: Option<Page>,
    pub csrf: Option<String>,
}

impl PublishContext {
    pub fn new(browser: Browser, portal: &str, params: PublishParams) -> Self {
        Self {
            browser,
            portal: portal.trim_end_matches('/').to_string(),
            params,
            page: None,
            csrf: None,
        }
    }

    pub fn signin_url(&self) -> String {
        self.portal_url(&["signin"])
    }

    pub fn bot_url(&self) -> String {
        self.portal_url(&["bots", &self.params.handle])
    }

    pub fn bot_api_url(&self) -> String {
        self.portal_url(&["api", "bots", &self.params.handle])
    }

    /// Append `segments` to the portal path, percent-encoding each one.
    fn portal_url(&self, segments: &[&str]) -> String {
        let Ok(mut url) = Url::parse(&self.portal) else {
            // Navigation reports the invalid portal URL.
            return format!("{}/{}", self.portal, segments.join("/"));
        };
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url.to_string()
    }
}

/// Run the full publish script against `portal`.
pub async fn publish(portal: &str, params: PublishParams, options: SequencerOptions) -> ExitStatus {
    if let Err(status) = params.validate() {
        tracing::error!(missing = ?params.missing(), "missing required parameters");
        return status;
    }
    let browser = match Browser::new() {
        Ok(b) => b,
        Err(e) => {
            tracing::error!("could not start browser session: {e}");
            return ExitStatus::AutomationError;
        }
    };

    let mut ctx = PublishContext::new(browser, portal, params);
    let mut sequencer = Sequencer::new(stages::publish_stages(), options);
    tracing::info!(portal = %ctx.portal, handle = %ctx.params.handle, stages = sequencer.len(), "publishing endpoint");

    let outcome = sequencer.run(&mut ctx).await;
    if let Outcome::Halted { stage, status } = &outcome {
        let last = ctx
            .page
            .as_ref()
            .map(|p| format!("{} ({})", p.url, p.title().unwrap_or_default()))
            .unwrap_or_default();
        tracing::error!(%stage, code = status.code(), last_page = %last, "publish failed");
    }
    outcome.exit_status()
}
