//! Shared User-Agent string for browser sessions and PDF downloads.
//!
//! The catalog serves PDFs only to browser-looking clients, so downloads use the
//! same desktop Chrome identity as the automation session.

/// Default User-Agent for the browser session and download client.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

/// Returns `configured` when it is non-blank, otherwise the default.
#[must_use]
pub fn resolve_user_agent(configured: Option<&str>) -> String {
    configured
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_USER_AGENT)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_looks_like_desktop_chrome() {
        assert!(DEFAULT_USER_AGENT.starts_with("Mozilla/5.0"));
        assert!(DEFAULT_USER_AGENT.contains("Chrome/"));
        assert!(!DEFAULT_USER_AGENT.contains("  "));
    }

    #[test]
    fn test_blank_override_falls_back_to_default() {
        assert_eq!(resolve_user_agent(Some("   ")), DEFAULT_USER_AGENT);
        assert_eq!(resolve_user_agent(None), DEFAULT_USER_AGENT);
        assert_eq!(resolve_user_agent(Some(" custom/1.0 ")), "custom/1.0");
    }
}
