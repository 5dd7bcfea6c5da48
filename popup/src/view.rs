use host::MessagingError;
use shared_types::{AuthStatusResponse, ErrorCode};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuickLink {
    pub label: &'static str,
    pub url: String,
}

/// Everything the popup can show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopupView {
    Loading,
    Connected {
        name: String,
        email: Option<String>,
        links: Vec<QuickLink>,
    },
    NotConnected,
    Error(String),
}

const LINKS: [(&str, &str); 3] = [
    ("Dashboard", "dashboard"),
    ("Review queue", "review"),
    ("Settings", "settings"),
];

/// Web app pages linked from the connected view. Pages that cannot be
/// joined onto `app_base` are left out.
pub fn quick_links(app_base: &str) -> Vec<QuickLink> {
    let Ok(base) = Url::parse(&format!("{}/", app_base.trim_end_matches('/'))) else {
        tracing::warn!(app_base, "invalid app base, no quick links");
        return Vec::new();
    };
    LINKS
        .iter()
        .filter_map(|&(label, path)| {
            base.join(path).ok().map(|url| QuickLink {
                label,
                url: url.to_string(),
            })
        })
        .collect()
}

impl PopupView {
    pub fn from_status(status: AuthStatusResponse, app_base: &str) -> Self {
        if let Some(error) = status.error {
            return match ErrorCode::parse(&error) {
                Some(code) if code.is_auth() => PopupView::NotConnected,
                _ => PopupView::Error(error),
            };
        }
        if !status.authenticated {
            return PopupView::NotConnected;
        }
        let user = status.user.unwrap_or_default();
        PopupView::Connected {
            name: user.display_name().unwrap_or("Revu user").to_string(),
            email: user.email.clone(),
            links: quick_links(app_base),
        }
    }

    pub fn from_messaging_error(error: &MessagingError) -> Self {
        match error {
            MessagingError::ContextInvalidated => {
                PopupView::Error("Revu was updated. Reopen the popup.".to_string())
            }
            other => PopupView::Error(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::SessionUser;

    #[test]
    fn test_connected_view_prefers_name() {
        let view = PopupView::from_status(
            AuthStatusResponse {
                authenticated: true,
                user: Some(SessionUser {
                    username: Some("ada".to_string()),
                    email: Some("ada@example.com".to_string()),
                    name: Some("Ada Lovelace".to_string()),
                    image: None,
                }),
                error: None,
            },
            "https://revu.app",
        );
        let PopupView::Connected { name, email, links } = view else {
            panic!("expected connected view");
        };
        assert_eq!(name, "Ada Lovelace");
        assert_eq!(email.as_deref(), Some("ada@example.com"));
        assert_eq!(links.len(), 3);
    }

    #[test]
    fn test_connected_without_profile() {
        let view = PopupView::from_status(
            AuthStatusResponse {
                authenticated: true,
                ..Default::default()
            },
            "https://revu.app",
        );
        assert!(matches!(view, PopupView::Connected { name, .. } if name == "Revu user"));
    }

    #[test]
    fn test_auth_errors_mean_not_connected() {
        let status = AuthStatusResponse {
            error: Some("TOKEN_EXPIRED".to_string()),
            ..Default::default()
        };
        assert_eq!(
            PopupView::from_status(status, "https://revu.app"),
            PopupView::NotConnected
        );
        assert_eq!(
            PopupView::from_status(AuthStatusResponse::default(), "https://revu.app"),
            PopupView::NotConnected
        );
    }

    #[test]
    fn test_other_errors_are_shown() {
        let status = AuthStatusResponse {
            error: Some("storage error: quota".to_string()),
            ..Default::default()
        };
        assert_eq!(
            PopupView::from_status(status, "https://revu.app"),
            PopupView::Error("storage error: quota".to_string())
        );
    }

    #[test]
    fn test_quick_links_join_app_base() {
        let links = quick_links("http://localhost:3000/app/");
        assert_eq!(links[0].url, "http://localhost:3000/app/dashboard");
        assert_eq!(links[1].label, "Review queue");
        assert!(quick_links("not a url").is_empty());
    }
}
