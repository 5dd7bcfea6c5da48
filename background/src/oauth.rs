//! Nonce generation and callback URL parsing for the connect handshake.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use url::Url;

use crate::config::Config;

/// Generates a cryptographically random `state` nonce.
///
/// Returns a 22-character URL-safe string (16 random bytes → base64url).
#[must_use]
pub fn generate_state() -> String {
    let random_bytes: [u8; 16] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

/// Query parameters of a navigation to the callback route.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Parse `url` if its host and path match the configured callback route.
pub fn parse_callback(config: &Config, url: &str) -> Option<CallbackParams> {
    let url = Url::parse(url).ok()?;
    if url.host_str()? != config.callback_host {
        return None;
    }
    let path = url.path();
    let expected = config.callback_path.as_str();
    if path != expected && path.trim_end_matches('/') != expected.trim_end_matches('/') {
        return None;
    }

    let mut params = CallbackParams::default();
    for (key, value) in url.query_pairs() {
        let slot = match key.as_ref() {
            "code" => &mut params.code,
            "state" => &mut params.state,
            "error" => &mut params.error,
            _ => continue,
        };
        if slot.is_none() && !value.is_empty() {
            *slot = Some(value.into_owned());
        }
    }
    Some(params)
}
