//! Location tracking across SPA navigations.
//!
//! The host page never reloads; it rewrites history entries and streams new
//! content in. The host wraps the history entry points and forwards every
//! call, along with platform navigation-lifecycle events, visibility
//! regain, and initial document-ready. This module only answers two
//! questions: did the location actually change, and is it a direct
//! short-form page.

use crate::config::DetectionConfig;
use tracing::debug;
use url::Url;

pub struct NavigationTracker {
    shorts_prefix: String,
    last_location: Option<String>,
}

impl NavigationTracker {
    pub fn new(cfg: &DetectionConfig) -> Self {
        Self {
            shorts_prefix: cfg.shorts_path_prefix.clone(),
            last_location: None,
        }
    }

    /// Record a reported location. Returns true when it differs from the
    /// last one seen (including the first report).
    pub fn observe(&mut self, location: &str) -> bool {
        if self.last_location.as_deref() == Some(location) {
            return false;
        }
        debug!(
            "Location changed: {:?} -> {}",
            self.last_location, location
        );
        self.last_location = Some(location.to_string());
        true
    }

    pub fn current(&self) -> Option<&str> {
        self.last_location.as_deref()
    }

    /// Forget the last location (on teardown), so re-enabling re-evaluates
    pub fn reset(&mut self) {
        self.last_location = None;
    }

    /// Item id when the location is a direct short-form page.
    /// Accepts absolute URLs and bare paths.
    pub fn shorts_video_id(&self, location: &str) -> Option<String> {
        let path_and_query = match Url::parse(location) {
            Ok(url) => url.path().to_string(),
            Err(_) => location.to_string(),
        };
        let rest = path_and_query.strip_prefix(&self.shorts_prefix)?;
        let id: &str = rest
            .split(['/', '?', '#'])
            .next()
            .unwrap_or_default();
        if id.is_empty() {
            return None;
        }
        Some(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> NavigationTracker {
        NavigationTracker::new(&DetectionConfig::default())
    }

    #[test]
    fn test_observe_detects_change() {
        let mut nav = tracker();
        assert!(nav.observe("https://www.youtube.com/"));
        assert!(!nav.observe("https://www.youtube.com/"));
        assert!(nav.observe("https://www.youtube.com/feed/subscriptions"));
        assert_eq!(nav.current(), Some("https://www.youtube.com/feed/subscriptions"));
    }

    #[test]
    fn test_shorts_id_from_absolute_url() {
        let nav = tracker();
        assert_eq!(
            nav.shorts_video_id("https://www.youtube.com/shorts/dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn test_shorts_id_from_path() {
        let nav = tracker();
        assert_eq!(
            nav.shorts_video_id("/shorts/abc123"),
            Some("abc123".to_string())
        );
    }

    #[test]
    fn test_shorts_id_strips_query_and_trailing() {
        let nav = tracker();
        assert_eq!(
            nav.shorts_video_id("https://www.youtube.com/shorts/abc?feature=share"),
            Some("abc".to_string())
        );
        assert_eq!(
            nav.shorts_video_id("/shorts/abc/extra"),
            Some("abc".to_string())
        );
    }

    #[test]
    fn test_non_shorts_locations() {
        let nav = tracker();
        assert_eq!(nav.shorts_video_id("https://www.youtube.com/"), None);
        assert_eq!(nav.shorts_video_id("/watch?v=abc"), None);
        assert_eq!(nav.shorts_video_id("/shorts/"), None);
        // A watch URL mentioning shorts in the query is not a shorts page
        assert_eq!(nav.shorts_video_id("/watch?list=shorts"), None);
    }

    #[test]
    fn test_reset_forgets_location() {
        let mut nav = tracker();
        nav.observe("https://www.youtube.com/");
        nav.reset();
        assert_eq!(nav.current(), None);
        assert!(nav.observe("https://www.youtube.com/"));
    }
}
