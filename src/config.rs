//! Configuration management for the suppression engine.
//!
//! Loads configuration from TOML files and provides runtime defaults. The
//! detection vocabulary, structural tag lists, and endpoint templates are
//! configuration rather than code: the host site's markup drifts, and a
//! drifted selector should be a config edit.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub detection: DetectionConfig,

    #[serde(default)]
    pub endpoints: EndpointsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Quiet period after the last mutation batch before a re-scan
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,

    /// Settling window after enable/navigation before the first full scan
    #[serde(default = "default_stabilize")]
    pub stabilize_ms: u64,

    /// Interval of the stylesheet self-healing check
    #[serde(default = "default_style_heal")]
    pub style_heal_interval_ms: u64,

    /// Interval of the pause/mute re-assertion while playback is blocked
    #[serde(default = "default_media_reassert")]
    pub media_reassert_interval_ms: u64,

    /// Extra re-check delay after every navigation signal
    #[serde(default = "default_post_nav_recheck")]
    pub post_navigation_recheck_ms: u64,

    /// Total duration of the user-initiated restore transition
    #[serde(default = "default_restore_duration")]
    pub restore_duration_ms: u64,

    /// Fade-out of the restoring overlay once restoration completes
    #[serde(default = "default_overlay_fade")]
    pub overlay_fade_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 250,
            stabilize_ms: 1400,
            style_heal_interval_ms: 600,
            media_reassert_interval_ms: 500,
            post_navigation_recheck_ms: 800,
            restore_duration_ms: 5000,
            overlay_fade_ms: 420,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Bilingual vocabulary matched against titles and labels
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,

    /// Hashtag tokens accepted in item text (substring match)
    #[serde(default = "default_hashtags")]
    pub hashtag_tokens: Vec<String>,

    /// Dedicated URL path segment for short-form content
    #[serde(default = "default_shorts_prefix")]
    pub shorts_path_prefix: String,

    /// Tags of single content cards/tiles
    #[serde(default = "default_item_containers")]
    pub item_containers: Vec<String>,

    /// Tags of titled shelf containers
    #[serde(default = "default_shelf_containers")]
    pub shelf_containers: Vec<String>,

    /// Tags of page sections eligible for empty-collapse
    #[serde(default = "default_section_containers")]
    pub section_containers: Vec<String>,

    /// Tags of filter chips/labels
    #[serde(default = "default_chip_containers")]
    pub chip_containers: Vec<String>,

    /// Tags treated as shelf headings
    #[serde(default = "default_heading_tags")]
    pub heading_tags: Vec<String>,

    /// Class names treated as shelf headings
    #[serde(default = "default_heading_classes")]
    pub heading_classes: Vec<String>,

    /// Structurally-reliable surfaces hidden unconditionally by the
    /// stylesheet (zero-latency first line of defense)
    #[serde(default = "default_static_selectors")]
    pub static_hidden_selectors: Vec<String>,

    /// HTML id of the content root the mutation scan is scoped to
    #[serde(default = "default_content_root")]
    pub content_root_id: String,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
            hashtag_tokens: default_hashtags(),
            shorts_path_prefix: default_shorts_prefix(),
            item_containers: default_item_containers(),
            shelf_containers: default_shelf_containers(),
            section_containers: default_section_containers(),
            chip_containers: default_chip_containers(),
            heading_tags: default_heading_tags(),
            heading_classes: default_heading_classes(),
            static_hidden_selectors: default_static_selectors(),
            content_root_id: default_content_root(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointsConfig {
    /// oEmbed-style JSON endpoint returning at least a title
    #[serde(default = "default_oembed_url")]
    pub oembed_url: String,

    /// Normal (non-short-form) playback surface, item id appended
    #[serde(default = "default_watch_url")]
    pub watch_url_base: String,

    /// Canonical short-form URL prefix, item id appended
    #[serde(default = "default_shorts_url")]
    pub shorts_url_base: String,

    /// Platform home page
    #[serde(default = "default_home_url")]
    pub home_url: String,

    /// High-resolution thumbnail template (`{id}` substituted)
    #[serde(default = "default_thumb_primary")]
    pub thumbnail_primary: String,

    /// Guaranteed-available lower-resolution thumbnail template
    #[serde(default = "default_thumb_fallback")]
    pub thumbnail_fallback: String,

    /// Base URL for extension-local assets shown in the overlay
    #[serde(default = "default_asset_base")]
    pub asset_base_url: String,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            oembed_url: default_oembed_url(),
            watch_url_base: default_watch_url(),
            shorts_url_base: default_shorts_url(),
            home_url: default_home_url(),
            thumbnail_primary: default_thumb_primary(),
            thumbnail_fallback: default_thumb_fallback(),
            asset_base_url: default_asset_base(),
        }
    }
}

// Default value functions for serde
fn default_log_level() -> String {
    "info".to_string()
}

fn default_debounce() -> u64 {
    250
}

fn default_stabilize() -> u64 {
    1400
}

fn default_style_heal() -> u64 {
    600
}

fn default_media_reassert() -> u64 {
    500
}

fn default_post_nav_recheck() -> u64 {
    800
}

fn default_restore_duration() -> u64 {
    5000
}

fn default_overlay_fade() -> u64 {
    420
}

fn default_keywords() -> Vec<String> {
    vec!["shorts".to_string(), "ショート".to_string()]
}

fn default_hashtags() -> Vec<String> {
    vec!["#shorts".to_string()]
}

fn default_shorts_prefix() -> String {
    "/shorts/".to_string()
}

fn default_item_containers() -> Vec<String> {
    vec![
        "ytd-video-renderer".to_string(),
        "ytd-grid-video-renderer".to_string(),
        "ytd-compact-video-renderer".to_string(),
        "ytd-rich-item-renderer".to_string(),
        "ytm-shorts-lockup-view-model".to_string(),
        "ytm-shorts-lockup-view-model-v2".to_string(),
    ]
}

fn default_shelf_containers() -> Vec<String> {
    vec![
        "grid-shelf-view-model".to_string(),
        "ytd-grid-shelf-renderer".to_string(),
        "ytd-rich-shelf-renderer".to_string(),
        "ytd-reel-shelf-renderer".to_string(),
        "ytd-horizontal-card-list-renderer".to_string(),
    ]
}

fn default_section_containers() -> Vec<String> {
    vec![
        "ytd-item-section-renderer".to_string(),
        "ytd-rich-section-renderer".to_string(),
    ]
}

fn default_chip_containers() -> Vec<String> {
    vec!["yt-chip-cloud-chip-renderer".to_string()]
}

fn default_heading_tags() -> Vec<String> {
    vec!["h2".to_string()]
}

fn default_heading_classes() -> Vec<String> {
    vec![
        "yt-shelf-header-layout__title".to_string(),
        "yt-core-attributed-string".to_string(),
    ]
}

fn default_static_selectors() -> Vec<String> {
    vec![
        "a[href^=/shorts/]".to_string(),
        "ytd-reel-shelf-renderer".to_string(),
        "ytd-reel-video-renderer".to_string(),
        "ytm-shorts-lockup-view-model".to_string(),
        "ytm-shorts-lockup-view-model-v2".to_string(),
        "ytd-mini-guide-entry-renderer[aria-label*=ショート]".to_string(),
        "ytd-mini-guide-entry-renderer[aria-label*=Shorts]".to_string(),
        "tp-yt-paper-item[title=ショート]".to_string(),
        "tp-yt-paper-item[title=Shorts]".to_string(),
    ]
}

fn default_content_root() -> String {
    "content".to_string()
}

fn default_oembed_url() -> String {
    "https://www.youtube.com/oembed".to_string()
}

fn default_watch_url() -> String {
    "https://www.youtube.com/watch?v=".to_string()
}

fn default_shorts_url() -> String {
    "https://www.youtube.com/shorts/".to_string()
}

fn default_home_url() -> String {
    "https://www.youtube.com/".to_string()
}

fn default_thumb_primary() -> String {
    "https://i.ytimg.com/vi/{id}/maxresdefault.jpg".to_string()
}

fn default_thumb_fallback() -> String {
    "https://i.ytimg.com/vi/{id}/hqdefault.jpg".to_string()
}

fn default_asset_base() -> String {
    "extension://shorts-shield/assets/".to_string()
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Self {
        Self::load_from_path(Self::default_config_path())
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: PathBuf) -> Self {
        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!("Failed to parse config file: {}, using defaults", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("No config file found at {:?}, using defaults", path);
                Self::default()
            }
        }
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("shorts-shield")
            .join("config.toml")
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, path: PathBuf) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;

        std::fs::write(&path, contents)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }
}
