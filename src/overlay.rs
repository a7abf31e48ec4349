//! The blocking and restoring overlays.
//!
//! At most one overlay node exists at a time. The blocking variant covers a
//! direct short-form page and offers the normal playback surface instead;
//! the restoring variant is shown during a user-initiated disable while
//! suppressed content is brought back. Both are ordinary subtrees in the
//! document model; the host renders them full-viewport.

use crate::config::EndpointsConfig;
use crate::dom::Document;
use crate::metadata::{VideoMetadata, LIKES_PLACEHOLDER, TITLE_PLACEHOLDER};
use crate::types::NodeId;
use tracing::debug;

/// HTML id of the singleton overlay node
pub const OVERLAY_HTML_ID: &str = "shorts-shield-overlay";

/// HTML id of the thumbnail image inside the blocking overlay
pub const THUMB_HTML_ID: &str = "shorts-shield-thumb";

/// HTML id of the title line inside the blocking overlay
pub const TITLE_HTML_ID: &str = "shorts-shield-title";

/// HTML id of the like-count line inside the blocking overlay
pub const LIKES_HTML_ID: &str = "shorts-shield-likes";

/// Which overlay variant is in the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayKind {
    Blocking,
    Restoring,
}

/// Thumbnail fallback progression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbStep {
    Primary,
    Fallback,
    Hidden,
}

/// The singleton overlay node, if any
pub fn current(doc: &Document) -> Option<NodeId> {
    doc.node_by_html_id(OVERLAY_HTML_ID)
}

pub fn current_kind(doc: &Document) -> Option<OverlayKind> {
    let id = current(doc)?;
    match doc.attr(id, "data-kind") {
        Some("blocking") => Some(OverlayKind::Blocking),
        Some("restoring") => Some(OverlayKind::Restoring),
        _ => None,
    }
}

/// The blocked item id recorded on a blocking overlay
pub fn blocked_video_id(doc: &Document) -> Option<String> {
    let id = current(doc)?;
    doc.attr(id, "data-video-id").map(str::to_string)
}

/// Remove whatever overlay is present. Returns true when one was removed.
pub fn remove(doc: &mut Document) -> bool {
    match current(doc) {
        Some(id) => !doc.remove(id).is_empty(),
        None => false,
    }
}

/// Insert the blocking overlay for a short-form item, replacing any
/// existing overlay so the singleton invariant holds.
pub fn insert_blocking(
    doc: &mut Document,
    endpoints: &EndpointsConfig,
    video_id: &str,
    meta: &VideoMetadata,
) -> NodeId {
    remove(doc);

    let root = doc.create_element("div");
    doc.set_attr(root, "id", OVERLAY_HTML_ID);
    doc.set_attr(root, "data-kind", "blocking");
    doc.set_attr(root, "data-video-id", video_id);

    let panel = doc.create_element("div");
    doc.set_attr(panel, "class", "panel");
    doc.append_child(root, panel);

    let icon = doc.create_element("img");
    doc.set_attr(icon, "class", "icon");
    let icon_url = format!("{}icon-128.png", endpoints.asset_base_url);
    doc.set_attr(icon, "src", &icon_url);
    doc.append_child(panel, icon);

    let thumb = doc.create_element("img");
    doc.set_attr(thumb, "id", THUMB_HTML_ID);
    doc.set_attr(thumb, "src", &thumbnail_url(&endpoints.thumbnail_primary, video_id));
    doc.set_attr(thumb, "data-thumb-step", "primary");
    doc.append_child(panel, thumb);

    let title = doc.create_element("div");
    doc.set_attr(title, "id", TITLE_HTML_ID);
    doc.set_text(
        title,
        meta.title.as_deref().unwrap_or(TITLE_PLACEHOLDER),
    );
    doc.append_child(panel, title);

    let likes = doc.create_element("div");
    doc.set_attr(likes, "id", LIKES_HTML_ID);
    let likes_text = format!(
        "👍 {}",
        meta.like_count.as_deref().unwrap_or(LIKES_PLACEHOLDER)
    );
    doc.set_text(likes, &likes_text);
    doc.append_child(panel, likes);

    let watch = doc.create_element("a");
    doc.set_attr(watch, "class", "watch-link");
    let watch_url = format!("{}{}", endpoints.watch_url_base, video_id);
    doc.set_attr(watch, "href", &watch_url);
    doc.set_text(watch, "視聴する");
    doc.append_child(panel, watch);

    let home = doc.create_element("a");
    doc.set_attr(home, "class", "home-link");
    doc.set_attr(home, "href", &endpoints.home_url);
    doc.set_text(home, "ホームへ戻る");
    doc.append_child(panel, home);

    doc.append_child(doc.body(), root);
    debug!("Blocking overlay inserted for {}", video_id);
    root
}

/// Insert the restoring overlay shown during a user-initiated disable
pub fn insert_restoring(doc: &mut Document) -> NodeId {
    remove(doc);

    let root = doc.create_element("div");
    doc.set_attr(root, "id", OVERLAY_HTML_ID);
    doc.set_attr(root, "data-kind", "restoring");

    let panel = doc.create_element("div");
    doc.set_attr(panel, "class", "panel");
    doc.append_child(root, panel);

    let message = doc.create_element("div");
    doc.set_attr(message, "class", "message");
    doc.set_text(message, "ショートを復元中...");
    doc.append_child(panel, message);

    let note = doc.create_element("div");
    doc.set_attr(note, "class", "note");
    doc.set_text(note, "しばらくお待ちください");
    doc.append_child(panel, note);

    let progress = doc.create_element("div");
    doc.set_attr(progress, "class", "progress");
    doc.set_attr(progress, "data-progress", "0.000");
    doc.append_child(panel, progress);

    doc.append_child(doc.body(), root);
    debug!("Restoring overlay inserted");
    root
}

/// Record restore progress on the overlay for the host to animate
pub fn set_restore_progress(doc: &mut Document, fraction: f64) {
    if let Some(root) = current(doc) {
        for child in doc.descendants(root) {
            if doc.attr(child, "data-progress").is_some() {
                doc.set_attr(child, "data-progress", &format!("{fraction:.3}"));
                return;
            }
        }
    }
}

/// Begin the overlay fade-out; the host animates opacity from this attribute
pub fn start_fade(doc: &mut Document) {
    if let Some(root) = current(doc) {
        doc.set_attr(root, "data-fading", "1");
    }
}

/// Current step of the thumbnail fallback progression
pub fn thumb_step(doc: &Document) -> Option<ThumbStep> {
    let thumb = doc.node_by_html_id(THUMB_HTML_ID)?;
    match doc.attr(thumb, "data-thumb-step") {
        Some("primary") => Some(ThumbStep::Primary),
        Some("fallback") => Some(ThumbStep::Fallback),
        Some("hidden") => Some(ThumbStep::Hidden),
        _ => None,
    }
}

/// Advance the thumbnail fallback after a load failure: the high-resolution
/// URL gives way to the guaranteed-available one, a second failure hides
/// the image rather than leaving a broken indicator.
pub fn handle_thumbnail_error(
    doc: &mut Document,
    endpoints: &EndpointsConfig,
) -> Option<ThumbStep> {
    let thumb = doc.node_by_html_id(THUMB_HTML_ID)?;
    let video_id = blocked_video_id(doc)?;
    match doc.attr(thumb, "data-thumb-step") {
        Some("primary") => {
            doc.set_attr(
                thumb,
                "src",
                &thumbnail_url(&endpoints.thumbnail_fallback, &video_id),
            );
            doc.set_attr(thumb, "data-thumb-step", "fallback");
            Some(ThumbStep::Fallback)
        }
        Some("fallback") => {
            doc.remove_attr(thumb, "src");
            doc.set_attr(thumb, "data-thumb-step", "hidden");
            doc.set_attr(thumb, "hidden", "true");
            Some(ThumbStep::Hidden)
        }
        _ => Some(ThumbStep::Hidden),
    }
}

/// Apply a late-resolved title to the blocking overlay
pub fn apply_title(doc: &mut Document, title: &str) {
    if let Some(node) = doc.node_by_html_id(TITLE_HTML_ID) {
        doc.set_text(node, title);
    }
}

/// Apply a late-resolved like count to the blocking overlay
pub fn apply_like_count(doc: &mut Document, like_count: &str) {
    if let Some(node) = doc.node_by_html_id(LIKES_HTML_ID) {
        doc.set_text(node, &format!("👍 {like_count}"));
    }
}

fn thumbnail_url(template: &str, video_id: &str) -> String {
    template.replace("{id}", video_id)
}

/// Eased multi-keyframe restore curve: monotonic, presentation-only shape.
/// The caller fires completion at exactly the configured total duration;
/// this function only answers "how full should the bar look at time t".
pub fn restore_progress(elapsed_ms: u64, total_ms: u64) -> f64 {
    const KEYFRAMES: [(f64, f64); 5] = [
        (0.0, 0.0),
        (0.25, 0.10),
        (0.50, 0.35),
        (0.75, 0.70),
        (1.0, 1.0),
    ];
    if total_ms == 0 || elapsed_ms >= total_ms {
        return 1.0;
    }
    let t = elapsed_ms as f64 / total_ms as f64;
    for pair in KEYFRAMES.windows(2) {
        let (t0, v0) = pair[0];
        let (t1, v1) = pair[1];
        if t <= t1 {
            let local = (t - t0) / (t1 - t0);
            return v0 + (v1 - v0) * local;
        }
    }
    1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoints() -> EndpointsConfig {
        EndpointsConfig::default()
    }

    #[test]
    fn test_blocking_overlay_structure() {
        let mut doc = Document::new();
        insert_blocking(&mut doc, &endpoints(), "dQw4w9WgXcQ", &VideoMetadata::default());

        assert_eq!(current_kind(&doc), Some(OverlayKind::Blocking));
        assert_eq!(blocked_video_id(&doc).as_deref(), Some("dQw4w9WgXcQ"));

        let thumb = doc.node_by_html_id(THUMB_HTML_ID).unwrap();
        assert_eq!(
            doc.attr(thumb, "src"),
            Some("https://i.ytimg.com/vi/dQw4w9WgXcQ/maxresdefault.jpg")
        );
        assert_eq!(thumb_step(&doc), Some(ThumbStep::Primary));

        let title = doc.node_by_html_id(TITLE_HTML_ID).unwrap();
        assert_eq!(doc.node(title).unwrap().text, TITLE_PLACEHOLDER);
    }

    #[test]
    fn test_overlay_is_singleton() {
        let mut doc = Document::new();
        insert_blocking(&mut doc, &endpoints(), "aaa", &VideoMetadata::default());
        insert_blocking(&mut doc, &endpoints(), "bbb", &VideoMetadata::default());

        let overlays: Vec<_> = doc
            .nodes_with_tag("div")
            .into_iter()
            .filter(|&id| doc.attr(id, "id") == Some(OVERLAY_HTML_ID))
            .collect();
        assert_eq!(overlays.len(), 1);
        assert_eq!(blocked_video_id(&doc).as_deref(), Some("bbb"));
    }

    #[test]
    fn test_restoring_replaces_blocking() {
        let mut doc = Document::new();
        insert_blocking(&mut doc, &endpoints(), "aaa", &VideoMetadata::default());
        insert_restoring(&mut doc);

        assert_eq!(current_kind(&doc), Some(OverlayKind::Restoring));
        assert!(doc.node_by_html_id(THUMB_HTML_ID).is_none());
    }

    #[test]
    fn test_thumbnail_two_step_fallback() {
        let mut doc = Document::new();
        insert_blocking(&mut doc, &endpoints(), "xyz", &VideoMetadata::default());

        assert_eq!(
            handle_thumbnail_error(&mut doc, &endpoints()),
            Some(ThumbStep::Fallback)
        );
        let thumb = doc.node_by_html_id(THUMB_HTML_ID).unwrap();
        assert_eq!(
            doc.attr(thumb, "src"),
            Some("https://i.ytimg.com/vi/xyz/hqdefault.jpg")
        );

        assert_eq!(
            handle_thumbnail_error(&mut doc, &endpoints()),
            Some(ThumbStep::Hidden)
        );
        let thumb = doc.node_by_html_id(THUMB_HTML_ID).unwrap();
        assert_eq!(doc.attr(thumb, "src"), None);
        assert_eq!(doc.attr(thumb, "hidden"), Some("true"));
    }

    #[test]
    fn test_thumbnail_error_without_overlay() {
        let mut doc = Document::new();
        assert_eq!(handle_thumbnail_error(&mut doc, &endpoints()), None);
    }

    #[test]
    fn test_late_metadata_application() {
        let mut doc = Document::new();
        insert_blocking(&mut doc, &endpoints(), "xyz", &VideoMetadata::default());

        apply_title(&mut doc, "Funny cat");
        apply_like_count(&mut doc, "1.2M");

        let title = doc.node_by_html_id(TITLE_HTML_ID).unwrap();
        assert_eq!(doc.node(title).unwrap().text, "Funny cat");
        let likes = doc.node_by_html_id(LIKES_HTML_ID).unwrap();
        assert_eq!(doc.node(likes).unwrap().text, "👍 1.2M");
    }

    #[test]
    fn test_restore_progress_monotonic_and_exact() {
        let total = 5000;
        let mut last = -1.0f64;
        for elapsed in (0..=total).step_by(50) {
            let p = restore_progress(elapsed, total);
            assert!(p >= last, "curve must be monotonic");
            assert!((0.0..=1.0).contains(&p));
            last = p;
        }
        assert_eq!(restore_progress(0, total), 0.0);
        assert_eq!(restore_progress(total, total), 1.0);
        assert_eq!(restore_progress(total + 1000, total), 1.0);
        // Eased: front-loaded slower than linear
        assert!(restore_progress(total / 4, total) < 0.25);
    }

    #[test]
    fn test_remove_overlay() {
        let mut doc = Document::new();
        insert_restoring(&mut doc);
        assert!(remove(&mut doc));
        assert!(current(&doc).is_none());
        assert!(!remove(&mut doc));
    }
}
