use chrono::Duration;
use shared_types::SESSION_EXPIRY_BUFFER_MS;
use url::Url;

const DEFAULT_API_BASE: &str = "https://revu.app";
const DEFAULT_APP_BASE: &str = "https://revu.app";
const DEFAULT_CALLBACK_HOST: &str = "revu.app";
const DEFAULT_CALLBACK_PATH: &str = "/extension/callback";

#[derive(Debug, Clone)]
pub struct Config {
    /// Server root; the extension API lives under `/api/extension`
    pub api_base: String,
    /// Web app root; the connect page lives under `/extension/connect`
    pub app_base: String,
    /// Callback route watched in tab navigation. Scheme, port and query are ignored.
    pub callback_host: String,
    pub callback_path: String,
    /// Sessions count as expired this long before `expires_at`
    pub refresh_buffer: Duration,
    /// Origins allowed to push a session through `externally_connectable`
    pub allowed_external_origins: Vec<String>,
    /// Reject callbacks when no nonce is pending (web-app-initiated flows)
    pub strict_state: bool,
}

impl Default for Config {
    /// Production settings; `REVU_API_BASE` / `REVU_APP_BASE` can be baked in at
    /// build time for the wasm bundle.
    fn default() -> Self {
        let app_base = option_env!("REVU_APP_BASE").unwrap_or(DEFAULT_APP_BASE);
        Self {
            api_base: option_env!("REVU_API_BASE")
                .unwrap_or(DEFAULT_API_BASE)
                .to_string(),
            app_base: app_base.to_string(),
            callback_host: DEFAULT_CALLBACK_HOST.to_string(),
            callback_path: DEFAULT_CALLBACK_PATH.to_string(),
            refresh_buffer: Duration::milliseconds(SESSION_EXPIRY_BUFFER_MS),
            allowed_external_origins: vec![app_base.trim_end_matches('/').to_string()],
            strict_state: false,
        }
    }
}

impl Config {
    /// Read overrides from the environment (and `.env`), for native harnesses.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let app_base = env_str("REVU_APP_BASE", &defaults.app_base);
        let default_origin = app_base.trim_end_matches('/').to_string();

        let (callback_host, callback_path) = match std::env::var("REVU_CALLBACK_URL") {
            Ok(raw) => split_callback_url(&raw)?,
            Err(_) => (defaults.callback_host, defaults.callback_path),
        };

        let config = Self {
            api_base: env_str("REVU_API_BASE", &defaults.api_base),
            app_base,
            callback_host,
            callback_path,
            refresh_buffer: Duration::seconds(env_parse(
                "REVU_REFRESH_BUFFER_SECS",
                defaults.refresh_buffer.num_seconds(),
            )?),
            allowed_external_origins: env_csv("REVU_EXTERNAL_ORIGINS", &[&default_origin]),
            strict_state: env_parse("REVU_STRICT_STATE", defaults.strict_state)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, value) in [
            ("REVU_API_BASE", &self.api_base),
            ("REVU_APP_BASE", &self.app_base),
        ] {
            Url::parse(value).map_err(|e| anyhow::anyhow!("invalid {name} '{value}': {e}"))?;
        }
        if self.callback_host.is_empty() || !self.callback_path.starts_with('/') {
            return Err(anyhow::anyhow!(
                "invalid callback route '{}{}'",
                self.callback_host,
                self.callback_path
            ));
        }
        if self.refresh_buffer < Duration::zero() {
            return Err(anyhow::anyhow!("refresh buffer must not be negative"));
        }
        Ok(())
    }

    /// Root of the extension API routes.
    pub fn api_root(&self) -> String {
        format!("{}/api/extension", self.api_base.trim_end_matches('/'))
    }

    /// Connect page carrying the pending nonce as `state`.
    pub fn connect_url(&self, nonce: &str) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&format!(
            "{}/extension/connect",
            self.app_base.trim_end_matches('/')
        ))?;
        url.query_pairs_mut().append_pair("state", nonce);
        Ok(url)
    }

    pub fn allows_external_origin(&self, origin: &str) -> bool {
        let origin = origin.trim_end_matches('/');
        self.allowed_external_origins
            .iter()
            .any(|allowed| allowed.trim_end_matches('/') == origin)
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn split_callback_url(raw: &str) -> anyhow::Result<(String, String)> {
    let url = Url::parse(raw).map_err(|e| anyhow::anyhow!("invalid REVU_CALLBACK_URL '{raw}': {e}"))?;
    let host = url
        .host_str()
        .ok_or_else(|| anyhow::anyhow!("REVU_CALLBACK_URL '{raw}' has no host"))?;
    Ok((host.to_string(), url.path().to_string()))
}

#[cfg(not(target_arch = "wasm32"))]
fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(not(target_arch = "wasm32"))]
fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Failed to parse env var {key}={val}: {e}")),
        Err(_) => Ok(default),
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn env_csv(key: &str, default: &[&str]) -> Vec<String> {
    match std::env::var(key) {
        Ok(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect(),
        Err(_) => default.iter().map(|s| (*s).to_string()).collect(),
    }
}
