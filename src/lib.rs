//! Shorts Shield - short-form promotion suppression engine
//!
//! This crate hides short-form video promotions on a single-page-application
//! video site and blocks direct playback of short-form pages behind a
//! dismissible overlay. The host mirrors page state into the engine as
//! events (DOM mutation batches, navigation signals, commands); the engine
//! owns a document model and answers with marks, an enforcing stylesheet,
//! and overlay subtrees.
//!
//! # Architecture
//!
//! One event loop owns all mutable state. The matcher classifies candidate
//! nodes, the suppressor marks them and keeps the stylesheet alive, the
//! collapser folds up emptied sections, the scheduler debounces mutation
//! bursts into single scans, and the navigation tracker resets everything
//! across SPA route changes, entering a blocked state with media silencing
//! and a metadata-bearing overlay when the route is a direct short-form
//! page.

pub mod collapser;
pub mod config;
pub mod dom;
pub mod engine;
pub mod matcher;
pub mod metadata;
pub mod navigation;
pub mod overlay;
pub mod scheduler;
pub mod suppressor;
pub mod types;

// Re-export commonly used types
pub use collapser::Collapser;
pub use config::Config;
pub use dom::{Document, MediaState, Node, NodeSpec};
pub use engine::Engine;
pub use matcher::Matcher;
pub use metadata::{HttpMetadataSource, MetadataSource, VideoMetadata};
pub use navigation::NavigationTracker;
pub use overlay::{OverlayKind, ThumbStep, OVERLAY_HTML_ID};
pub use scheduler::MutationScheduler;
pub use suppressor::{Suppressor, HIDDEN_MARK, STYLE_HTML_ID};
pub use types::{
    Ack, Action, Classification, EngineError, HostEvent, Mutation, NavigationSignal, NodeId,
    PagePhase,
};
