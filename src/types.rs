//! Core types used throughout the suppression engine.
//!
//! This module defines node identity, classification results, the host event
//! surface, and the engine error type.

use crate::dom::NodeSpec;
use serde::{Deserialize, Serialize};

/// Unique identifier for a document node (host-assigned for host content,
/// engine-assigned for injected nodes)
pub type NodeId = u64;

/// What a candidate node was classified as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// A titled container grouping multiple short-form items
    Shelf,
    /// A single short-form content card or tile
    Item,
    /// A filter chip or label pointing at short-form content
    Tag,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Shelf => "shelf",
            Classification::Item => "item",
            Classification::Tag => "tag",
        }
    }
}

/// Navigation signals the host forwards to the engine.
///
/// The host page is a single-page application, so full-page-load events are
/// unreliable; each of these is treated as a potential route change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationSignal {
    /// History entry pushed programmatically
    HistoryPush,
    /// History entry replaced programmatically
    HistoryReplace,
    /// Back/forward traversal
    HistoryPop,
    /// Platform-emitted navigation-lifecycle event
    PlatformNavigate,
    /// Tab became visible again
    VisibilityRegained,
    /// Initial document-ready
    DocumentReady,
}

/// Enable/disable command action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Enable,
    Disable,
}

/// A single DOM mutation reported by the host
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    /// Subtree inserted under `parent` (document body when absent)
    Insert {
        #[serde(default)]
        parent: Option<NodeId>,
        node: NodeSpec,
    },
    /// Node (and its subtree) removed
    Remove { node: NodeId },
    /// Attribute changed on an existing node
    SetAttr {
        node: NodeId,
        name: String,
        value: String,
    },
}

/// Events delivered to the engine from the host side
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    /// Collaborator command (toggle UI, background relay)
    Command {
        action: Action,
        #[serde(default, rename = "userInitiated")]
        user_initiated: bool,
    },
    /// A batch of DOM mutations observed by the host
    Mutations { batch: Vec<Mutation> },
    /// Location changed (or may have changed) with the signal that caused it
    Navigated {
        url: String,
        signal: NavigationSignal,
    },
    /// The overlay thumbnail image failed to load
    ThumbnailError,
}

/// Acknowledgement returned for every command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack {
    pub action: Action,
    pub accepted: bool,
}

/// The per-session page state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PagePhase {
    /// Current location is not a direct short-form page
    Idle,
    /// Current location is a direct short-form page; playback is blocked
    Blocked { video_id: String },
}

/// Errors surfaced by the engine
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("event channel closed")]
    ChannelClosed,

    #[error("malformed host event: {0}")]
    MalformedEvent(String),

    #[error("metadata fetch failed: {0}")]
    Fetch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_as_str() {
        assert_eq!(Classification::Shelf.as_str(), "shelf");
        assert_eq!(Classification::Item.as_str(), "item");
        assert_eq!(Classification::Tag.as_str(), "tag");
    }

    #[test]
    fn test_command_event_json() {
        let json = r#"{"type":"command","action":"disable","userInitiated":true}"#;
        let ev: HostEvent = serde_json::from_str(json).unwrap();
        match ev {
            HostEvent::Command {
                action,
                user_initiated,
            } => {
                assert_eq!(action, Action::Disable);
                assert!(user_initiated);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_command_user_initiated_defaults_false() {
        let json = r#"{"type":"command","action":"enable"}"#;
        let ev: HostEvent = serde_json::from_str(json).unwrap();
        match ev {
            HostEvent::Command { user_initiated, .. } => assert!(!user_initiated),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_navigated_event_json() {
        let json = r#"{"type":"navigated","url":"https://www.youtube.com/shorts/abc","signal":"history_push"}"#;
        let ev: HostEvent = serde_json::from_str(json).unwrap();
        match ev {
            HostEvent::Navigated { url, signal } => {
                assert_eq!(signal, NavigationSignal::HistoryPush);
                assert!(url.ends_with("/shorts/abc"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
