//! The suppression engine: one event loop owning the document model and
//! every piece of engine state.
//!
//! All host input arrives as [`HostEvent`]s on a single channel. Timers are
//! deadline fields on the engine, fired from the same loop, so nothing ever
//! races the document; a single teardown routine clears them all. The only
//! spawned tasks are the best-effort metadata fetches, which report back
//! through an internal channel and are epoch-checked before they touch
//! anything.

use crate::collapser::Collapser;
use crate::config::Config;
use crate::dom::Document;
use crate::matcher::Matcher;
use crate::metadata::{self, HttpMetadataSource, MetadataSource, VideoMetadata};
use crate::navigation::NavigationTracker;
use crate::overlay;
use crate::scheduler::MutationScheduler;
use crate::suppressor::Suppressor;
use crate::types::{
    Ack, Action, EngineError, HostEvent, Mutation, NavigationSignal, NodeId, PagePhase,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace};

/// How often the restoring overlay's progress indicator is refreshed
const RESTORE_PROGRESS_TICK: Duration = Duration::from_millis(100);

/// Result of an asynchronous metadata fetch
#[derive(Debug)]
struct MetaEvent {
    epoch: u64,
    video_id: String,
    field: MetaField,
}

#[derive(Debug)]
enum MetaField {
    Title(String),
    LikeCount(String),
}

pub struct Engine {
    config: Config,
    doc: Document,
    matcher: Matcher,
    suppressor: Suppressor,
    collapser: Collapser,
    scheduler: MutationScheduler,
    nav: NavigationTracker,
    meta_source: Arc<dyn MetadataSource>,

    enabled: bool,
    phase: PagePhase,
    /// Bumped on enable, navigation change, and teardown; everything
    /// deferred carries the epoch it was born under and is dropped when
    /// the epochs no longer agree.
    epoch: u64,
    scans_run: u64,

    // Deadlines, all owned here and cleared by one routine
    stabilize_until: Option<Instant>,
    recheck_at: Option<Instant>,
    next_style_heal: Option<Instant>,
    next_media_reassert: Option<Instant>,
    restore_started_at: Option<Instant>,
    restore_done_at: Option<Instant>,
    next_progress_tick: Option<Instant>,
    fade_done_at: Option<Instant>,

    // Metadata fetch plumbing
    meta_tx: mpsc::UnboundedSender<MetaEvent>,
    meta_rx: Option<mpsc::UnboundedReceiver<MetaEvent>>,
    fetch_handles: Vec<JoinHandle<()>>,
}

impl Engine {
    pub fn new(config: Config) -> Self {
        let source = Arc::new(HttpMetadataSource::new(config.endpoints.clone()));
        Self::with_source(config, source)
    }

    /// Construct with an explicit metadata source (tests use a stub)
    pub fn with_source(config: Config, meta_source: Arc<dyn MetadataSource>) -> Self {
        let (meta_tx, meta_rx) = mpsc::unbounded_channel();
        Self {
            matcher: Matcher::new(config.detection.clone()),
            suppressor: Suppressor::new(&config.detection),
            collapser: Collapser::new(&config.detection),
            scheduler: MutationScheduler::new(Duration::from_millis(config.timing.debounce_ms)),
            nav: NavigationTracker::new(&config.detection),
            config,
            doc: Document::new(),
            meta_source,
            enabled: false,
            phase: PagePhase::Idle,
            epoch: 0,
            scans_run: 0,
            stabilize_until: None,
            recheck_at: None,
            next_style_heal: None,
            next_media_reassert: None,
            restore_started_at: None,
            restore_done_at: None,
            next_progress_tick: None,
            fade_done_at: None,
            meta_tx,
            meta_rx: Some(meta_rx),
            fetch_handles: Vec::new(),
        }
    }

    /// Apply the persisted preference once at startup
    pub fn startup(&mut self, enabled_preference: bool) {
        if enabled_preference {
            self.enable();
        }
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    pub fn suppressor(&self) -> &Suppressor {
        &self.suppressor
    }

    pub fn scheduler(&self) -> &MutationScheduler {
        &self.scheduler
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn phase(&self) -> &PagePhase {
        &self.phase
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn scans_run(&self) -> u64 {
        self.scans_run
    }

    fn restoring(&self) -> bool {
        self.restore_done_at.is_some()
    }

    /// Process one host event. Commands produce an acknowledgement.
    pub fn handle_event(&mut self, ev: HostEvent) -> Option<Ack> {
        self.drain_meta();
        match ev {
            HostEvent::Command {
                action,
                user_initiated,
            } => {
                match action {
                    Action::Enable => self.enable(),
                    Action::Disable => self.disable(user_initiated),
                }
                Some(Ack {
                    action,
                    accepted: true,
                })
            }
            HostEvent::Mutations { batch } => {
                self.apply_mutations(batch);
                None
            }
            HostEvent::Navigated { url, signal } => {
                self.handle_navigation(&url, signal);
                None
            }
            HostEvent::ThumbnailError => {
                if self.enabled {
                    overlay::handle_thumbnail_error(&mut self.doc, &self.config.endpoints);
                }
                None
            }
        }
    }

    /// Turn suppression on. A second call while enabled is a no-op.
    pub fn enable(&mut self) {
        if self.enabled {
            debug!("Enable ignored, already enabled");
            return;
        }
        self.enabled = true;
        self.epoch += 1;
        info!("Suppression enabled (epoch {})", self.epoch);

        self.suppressor.ensure_stylesheet(&mut self.doc);
        let now = Instant::now();
        self.next_style_heal =
            Some(now + Duration::from_millis(self.config.timing.style_heal_interval_ms));

        let blocked = self
            .nav
            .current()
            .and_then(|u| self.nav.shorts_video_id(u));
        match blocked {
            Some(id) => self.enter_blocked(id),
            None => {
                self.scheduler.start();
                // Let the page settle under the static stylesheet before the
                // first full scan.
                self.stabilize_until =
                    Some(now + Duration::from_millis(self.config.timing.stabilize_ms));
            }
        }
    }

    /// Turn suppression off. A user-initiated disable runs the timed
    /// restore transition; a passive one tears down silently.
    pub fn disable(&mut self, user_initiated: bool) {
        if !self.enabled {
            debug!("Disable ignored, already disabled");
            return;
        }
        if self.restoring() {
            debug!("Disable ignored, restore transition already running");
            return;
        }
        if user_initiated {
            info!("User-initiated disable, starting restore transition");
            overlay::remove(&mut self.doc);
            overlay::insert_restoring(&mut self.doc);
            let now = Instant::now();
            self.restore_started_at = Some(now);
            self.restore_done_at =
                Some(now + Duration::from_millis(self.config.timing.restore_duration_ms));
            self.next_progress_tick = Some(now + RESTORE_PROGRESS_TICK);
        } else {
            info!("Passive disable, tearing down silently");
            self.teardown();
            overlay::remove(&mut self.doc);
        }
    }

    /// Everything enable started, undone in one place
    fn teardown(&mut self) {
        let was_blocked = matches!(self.phase, PagePhase::Blocked { .. });
        self.suppressor.restore_all(&mut self.doc);
        self.suppressor.remove_stylesheet(&mut self.doc);
        self.scheduler.stop();
        self.stabilize_until = None;
        self.recheck_at = None;
        self.next_style_heal = None;
        self.next_media_reassert = None;
        self.restore_started_at = None;
        self.restore_done_at = None;
        self.next_progress_tick = None;
        self.abort_fetches();
        if was_blocked {
            self.resume_media();
        }
        self.phase = PagePhase::Idle;
        self.enabled = false;
        self.epoch += 1;
        info!("Teardown complete (epoch {})", self.epoch);
    }

    fn finish_restore(&mut self) {
        info!("Restore transition complete");
        overlay::set_restore_progress(&mut self.doc, 1.0);
        self.teardown();
        overlay::start_fade(&mut self.doc);
        self.fade_done_at =
            Some(Instant::now() + Duration::from_millis(self.config.timing.overlay_fade_ms));
    }

    /// Apply a batch of host-observed mutations to the document model and
    /// feed the debounce when they land inside the scan scope.
    pub fn apply_mutations(&mut self, batch: Vec<Mutation>) {
        let scope = self.scope_root();
        let mut inserted_in_scope = false;
        let mut inserted_media = false;
        for m in batch {
            match m {
                Mutation::Insert { parent, node } => {
                    if let Some(id) = self.doc.insert_spec(parent, &node) {
                        if self.doc.is_ancestor(scope, id) {
                            inserted_in_scope = true;
                        }
                        if self.doc.node(id).and_then(|n| n.media).is_some()
                            || self.doc.descendants(id).iter().any(|&d| {
                                self.doc.node(d).and_then(|n| n.media).is_some()
                            })
                        {
                            inserted_media = true;
                        }
                    }
                }
                Mutation::Remove { node } => {
                    let removed = self.doc.remove(node);
                    self.suppressor.prune_processed(&removed);
                }
                Mutation::SetAttr { node, name, value } => {
                    self.doc.set_attr(node, &name, &value);
                }
            }
        }
        if inserted_media && matches!(self.phase, PagePhase::Blocked { .. }) {
            // A player re-added while blocked must not get a frame of audio
            self.block_media();
        }
        if inserted_in_scope
            && self.enabled
            && !self.restoring()
            && self.phase == PagePhase::Idle
            && self.stabilize_until.is_none()
        {
            self.scheduler.note_mutations(Instant::now());
        }
    }

    /// React to a navigation signal. The reset (epoch bump, processed-set
    /// clear, phase decision) is synchronous; any scan it causes is
    /// scheduled, never run inline.
    pub fn handle_navigation(&mut self, url: &str, signal: NavigationSignal) {
        let changed = self.nav.observe(url);
        if !self.enabled {
            return;
        }
        if changed {
            self.epoch += 1;
            self.suppressor.clear_processed();
            info!("Navigation ({:?}) to {}", signal, url);

            // No phase changes mid-restore: the transition ends in the
            // disabled state regardless of where the page goes.
            if !self.restoring() {
                let blocked_id = self.nav.shorts_video_id(url);
                match (blocked_id, self.phase.clone()) {
                    (Some(id), PagePhase::Blocked { video_id }) if video_id == id => {}
                    (Some(id), _) => self.enter_blocked(id),
                    (None, PagePhase::Blocked { .. }) => self.leave_blocked(),
                    (None, PagePhase::Idle) => {}
                }
            }
        }
        if self.phase == PagePhase::Idle && !self.restoring() {
            // Content streams in after the signal fires; look again shortly,
            // independent of the mutation debounce.
            self.recheck_at = Some(
                Instant::now()
                    + Duration::from_millis(self.config.timing.post_navigation_recheck_ms),
            );
        }
    }

    fn enter_blocked(&mut self, video_id: String) {
        info!("Blocking direct short-form playback of {}", video_id);
        self.abort_fetches();
        self.scheduler.stop();
        self.stabilize_until = None;
        self.recheck_at = None;

        // Silence the player before the overlay exists; the host may try to
        // resume it, which the re-assertion tick undoes.
        self.block_media();
        self.next_media_reassert = Some(
            Instant::now()
                + Duration::from_millis(self.config.timing.media_reassert_interval_ms),
        );

        let meta = metadata::extract_from_document(&self.doc);
        overlay::insert_blocking(&mut self.doc, &self.config.endpoints, &video_id, &meta);
        self.phase = PagePhase::Blocked {
            video_id: video_id.clone(),
        };
        self.spawn_fetches(video_id, meta);
    }

    fn leave_blocked(&mut self) {
        info!("Location left the short-form page, unblocking");
        overlay::remove(&mut self.doc);
        self.next_media_reassert = None;
        self.abort_fetches();
        self.phase = PagePhase::Idle;
        self.scheduler.start();
    }

    fn spawn_fetches(&mut self, video_id: String, already: VideoMetadata) {
        if already.title.is_none() {
            let src = Arc::clone(&self.meta_source);
            let tx = self.meta_tx.clone();
            let epoch = self.epoch;
            let vid = video_id.clone();
            self.fetch_handles.push(tokio::spawn(async move {
                if let Some(title) = src.fetch_title(&vid).await {
                    let _ = tx.send(MetaEvent {
                        epoch,
                        video_id: vid,
                        field: MetaField::Title(title),
                    });
                }
            }));
        }
        if already.like_count.is_none() {
            let src = Arc::clone(&self.meta_source);
            let tx = self.meta_tx.clone();
            let epoch = self.epoch;
            self.fetch_handles.push(tokio::spawn(async move {
                if let Some(count) = src.fetch_like_count(&video_id).await {
                    let _ = tx.send(MetaEvent {
                        epoch,
                        video_id,
                        field: MetaField::LikeCount(count),
                    });
                }
            }));
        }
    }

    fn abort_fetches(&mut self) {
        for handle in self.fetch_handles.drain(..) {
            handle.abort();
        }
    }

    fn block_media(&mut self) {
        for id in self.doc.media_nodes() {
            if let Some(node) = self.doc.node_mut(id) {
                if let Some(media) = node.media.as_mut() {
                    media.playing = false;
                    media.muted = true;
                    media.current_time = 0.0;
                }
            }
        }
    }

    fn reassert_media(&mut self) {
        for id in self.doc.media_nodes() {
            if let Some(node) = self.doc.node_mut(id) {
                if let Some(media) = node.media.as_mut() {
                    if media.playing || !media.muted {
                        trace!("Re-asserting pause/mute on media {}", id);
                    }
                    media.playing = false;
                    media.muted = true;
                }
            }
        }
    }

    fn resume_media(&mut self) {
        for id in self.doc.media_nodes() {
            if let Some(node) = self.doc.node_mut(id) {
                if let Some(media) = node.media.as_mut() {
                    media.playing = true;
                    media.muted = false;
                }
            }
        }
    }

    fn scope_root(&self) -> NodeId {
        self.doc
            .node_by_html_id(&self.config.detection.content_root_id)
            .unwrap_or(self.doc.body())
    }

    /// One full detection cycle over the scan scope. Cheap and idempotent;
    /// skipped outright while blocked, restoring, or disabled.
    fn run_scan(&mut self) {
        if !self.enabled || self.restoring() || self.phase != PagePhase::Idle {
            return;
        }
        self.scans_run += 1;
        self.suppressor.ensure_stylesheet(&mut self.doc);

        let scope = self.scope_root();
        let candidates = self.doc.descendants(scope);
        let mut marked = 0usize;

        // Items, links, and chips first so the shelf pass sees their marks
        for pass in 0..2 {
            for &id in &candidates {
                if self.suppressor.is_processed(id) {
                    continue;
                }
                let Some(node) = self.doc.node(id) else { continue };
                let is_grouping = self
                    .config
                    .detection
                    .shelf_containers
                    .iter()
                    .chain(self.config.detection.section_containers.iter())
                    .any(|t| *t == node.tag);
                if (pass == 0) == is_grouping {
                    continue;
                }

                let classification = self
                    .matcher
                    .classify(&self.doc, id, |n| self.suppressor.is_marked(&self.doc, n));
                let Some(class) = classification else { continue };

                let target = if self.doc.node(id).map(|n| n.tag == "a").unwrap_or(false) {
                    self.matcher.enclosing_item_container(&self.doc, id).unwrap_or(id)
                } else {
                    id
                };
                trace!("Classified {} as {}, marking {}", id, class.as_str(), target);
                if self.suppressor.mark(&mut self.doc, target) {
                    marked += 1;
                    self.collapser
                        .collapse_if_empty(&mut self.doc, &mut self.suppressor, target);
                }
            }
        }

        debug!(
            "Scan #{}: {} candidates, {} newly marked",
            self.scans_run,
            candidates.len(),
            marked
        );
    }

    fn drain_meta(&mut self) {
        let mut events = Vec::new();
        if let Some(rx) = self.meta_rx.as_mut() {
            while let Ok(ev) = rx.try_recv() {
                events.push(ev);
            }
        }
        for ev in events {
            self.apply_meta_event(ev);
        }
    }

    fn apply_meta_event(&mut self, ev: MetaEvent) {
        if ev.epoch != self.epoch {
            trace!("Dropping stale metadata for {}", ev.video_id);
            return;
        }
        let PagePhase::Blocked { video_id } = &self.phase else {
            return;
        };
        if *video_id != ev.video_id {
            return;
        }
        match ev.field {
            MetaField::Title(title) => overlay::apply_title(&mut self.doc, &title),
            MetaField::LikeCount(count) => overlay::apply_like_count(&mut self.doc, &count),
        }
    }

    /// The earliest pending deadline, if any
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.scheduler.deadline(),
            self.stabilize_until,
            self.recheck_at,
            self.next_style_heal,
            self.next_media_reassert,
            self.restore_done_at,
            self.next_progress_tick,
            self.fade_done_at,
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Fire every deadline that has come due
    pub fn fire_due(&mut self, now: Instant) {
        self.drain_meta();

        if self.scheduler.fire_if_due(now) {
            self.run_scan();
        }
        if self.stabilize_until.map(|d| now >= d).unwrap_or(false) {
            self.stabilize_until = None;
            self.run_scan();
        }
        if self.recheck_at.map(|d| now >= d).unwrap_or(false) {
            self.recheck_at = None;
            self.run_scan();
        }
        if self.next_style_heal.map(|d| now >= d).unwrap_or(false) {
            if self.enabled {
                if self.suppressor.ensure_stylesheet(&mut self.doc) {
                    debug!("Stylesheet was missing, re-inserted");
                }
                self.next_style_heal = Some(
                    now + Duration::from_millis(self.config.timing.style_heal_interval_ms),
                );
            } else {
                self.next_style_heal = None;
            }
        }
        if self.next_media_reassert.map(|d| now >= d).unwrap_or(false) {
            if matches!(self.phase, PagePhase::Blocked { .. }) {
                self.reassert_media();
                self.next_media_reassert = Some(
                    now + Duration::from_millis(self.config.timing.media_reassert_interval_ms),
                );
            } else {
                self.next_media_reassert = None;
            }
        }
        if self.next_progress_tick.map(|d| now >= d).unwrap_or(false) {
            if let (Some(start), Some(end)) = (self.restore_started_at, self.restore_done_at) {
                let total = end.duration_since(start).as_millis() as u64;
                let elapsed = now.duration_since(start).as_millis() as u64;
                let fraction = overlay::restore_progress(elapsed, total);
                overlay::set_restore_progress(&mut self.doc, fraction);
                self.next_progress_tick = Some(now + RESTORE_PROGRESS_TICK);
            } else {
                self.next_progress_tick = None;
            }
        }
        if self.restore_done_at.map(|d| now >= d).unwrap_or(false) {
            self.finish_restore();
        }
        if self.fade_done_at.map(|d| now >= d).unwrap_or(false) {
            self.fade_done_at = None;
            overlay::remove(&mut self.doc);
        }
    }

    /// Drive the engine until the host event channel closes
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<HostEvent>,
        acks: mpsc::UnboundedSender<Ack>,
    ) -> Result<(), EngineError> {
        let mut meta_rx = self.meta_rx.take().ok_or(EngineError::ChannelClosed)?;
        info!("Engine loop started");
        loop {
            let deadline = self.next_deadline();
            tokio::select! {
                maybe = events.recv() => match maybe {
                    Some(ev) => {
                        if let Some(ack) = self.handle_event(ev) {
                            let _ = acks.send(ack);
                        }
                    }
                    None => {
                        info!("Host event channel closed, engine loop exiting");
                        break;
                    }
                },
                maybe = meta_rx.recv() => {
                    if let Some(ev) = maybe {
                        self.apply_meta_event(ev);
                    }
                },
                _ = wait_until(deadline) => {
                    self.fire_due(Instant::now());
                }
            }
        }
        Ok(())
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending().await,
    }
}
