use crate::error::{LucidaError, Result};
use crate::sequencer::SequencerOptions;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3978;
pub const DEFAULT_BACKEND: &str = "http://localhost:3000";
pub const DEFAULT_PORTAL: &str = "https://dev.botframework.com";

// ---------------------------------------------------------------------------
// Positional listen arguments
// ---------------------------------------------------------------------------

/// Port the relay listens on plus the command-center host it forwards to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenAddr {
    pub port: u16,
    pub host: String,
}

impl Default for ListenAddr {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            host: DEFAULT_BACKEND.to_string(),
        }
    }
}

impl ListenAddr {
    /// The host as a URL base: bare hosts get an `http://` scheme and any
    /// trailing slash is dropped so paths can be appended directly.
    pub fn backend_url(&self) -> String {
        let url = if self.host.starts_with("http://") || self.host.starts_with("https://") {
            self.host.clone()
        } else {
            format!("http://{}", self.host)
        };
        url.trim_end_matches('/').to_string()
    }
}

enum ListenArg {
    Port(u16),
    Host(String),
}

static IPV4_RE: OnceLock<Regex> = OnceLock::new();
static URL_RE: OnceLock<Regex> = OnceLock::new();

fn ipv4_re() -> &'static Regex {
    IPV4_RE.get_or_init(|| {
        Regex::new(r"^(\d{1,3})\.(\d{1,3})\.(\d{1,3})\.(\d{1,3})(:\d{1,5})?$").unwrap()
    })
}

fn url_re() -> &'static Regex {
    URL_RE.get_or_init(|| Regex::new(r"^https?://[^\s/?#]+(/\S*)?$").unwrap())
}

pub fn validate_port(raw: &str) -> Result<u16> {
    match raw.parse::<u32>() {
        Ok(n) if (1..=65535).contains(&n) => Ok(n as u16),
        _ => Err(LucidaError::InvalidPort(raw.to_string())),
    }
}

pub fn validate_host(raw: &str) -> Result<String> {
    let valid = if raw == "localhost" || raw.starts_with("localhost:") {
        raw["localhost".len()..]
            .strip_prefix(':')
            .map_or(true, |p| validate_port(p).is_ok())
    } else if let Some(caps) = ipv4_re().captures(raw) {
        (1..=4).all(|i| caps[i].parse::<u16>().is_ok_and(|octet| octet <= 255))
            && caps
                .get(5)
                .map_or(true, |p| validate_port(&p.as_str()[1..]).is_ok())
    } else {
        url_re().is_match(raw)
    };

    if valid {
        Ok(raw.to_string())
    } else {
        Err(LucidaError::InvalidHost(raw.to_string()))
    }
}

fn classify(raw: &str) -> Result<ListenArg> {
    if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit()) {
        validate_port(raw).map(ListenArg::Port)
    } else {
        validate_host(raw).map(ListenArg::Host)
    }
}

/// Resolve up to two positional arguments, given in either order, into a
/// [`ListenAddr`]. Each argument is validated on its own; values that were
/// not supplied come from `defaults`.
pub fn resolve_listen<S: AsRef<str>>(args: &[S], defaults: &ListenAddr) -> Result<ListenAddr> {
    if args.len() > 2 {
        return Err(LucidaError::TooManyArguments(args.len()));
    }

    let mut port: Option<u16> = None;
    let mut host: Option<String> = None;

    for raw in args {
        let raw = raw.as_ref().trim();
        match classify(raw)? {
            ListenArg::Port(p) => {
                if let Some(first) = port {
                    return Err(LucidaError::DuplicateArgument {
                        kind: "port",
                        first: first.to_string(),
                        second: raw.to_string(),
                    });
                }
                port = Some(p);
            }
            ListenArg::Host(h) => {
                if let Some(first) = host {
                    return Err(LucidaError::DuplicateArgument {
                        kind: "host",
                        first,
                        second: h,
                    });
                }
                host = Some(h);
            }
        }
    }

    Ok(ListenAddr {
        port: port.unwrap_or(defaults.port),
        host: host.unwrap_or_else(|| defaults.host.clone()),
    })
}

// ---------------------------------------------------------------------------
// Config file
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// OAuth token endpoint used to authenticate replies to the channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connector_token_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_password: Option<String>,
}

fn default_backend() -> String {
    DEFAULT_BACKEND.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            port: default_port(),
            connector_token_url: None,
            app_id: None,
            app_password: None,
        }
    }
}

impl RelayConfig {
    /// File values as the fallback for positional arguments. They pass the
    /// same validation as the positionals do.
    pub fn listen_defaults(&self) -> Result<ListenAddr> {
        Ok(ListenAddr {
            port: validate_port(&self.port.to_string())?,
            host: validate_host(self.backend.trim())?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    #[serde(default = "default_portal")]
    pub portal_url: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_watchdog_secs")]
    pub watchdog_secs: u64,
    /// Give up on a stage after this many watchdog expiries. Unset means
    /// keep re-invoking it until the process is killed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_timeouts: Option<u32>,
}

fn default_portal() -> String {
    DEFAULT_PORTAL.to_string()
}

fn default_poll_interval_ms() -> u64 {
    50
}

fn default_watchdog_secs() -> u64 {
    30
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            portal_url: default_portal(),
            poll_interval_ms: default_poll_interval_ms(),
            watchdog_secs: default_watchdog_secs(),
            max_timeouts: None,
        }
    }
}

impl PublishConfig {
    pub fn sequencer_options(&self) -> SequencerOptions {
        SequencerOptions {
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            watchdog: Duration::from_secs(self.watchdog_secs.max(1)),
            max_timeouts: self.max_timeouts,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub publish: PublishConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(LucidaError::ConfigNotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Load `path` when given, otherwise fall back to built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }
}
