//! The editing session: sole owner of the poster, the active gesture, the
//! generation jobs and the notices shown to the user.
//!
//! Everything here runs on the window thread. Generation calls go to worker
//! threads and come back as [`JobEvent`]s through a channel that
//! [`EditorSession::poll`] drains once per frame.

use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

use chrono::NaiveDate;
use image::RgbaImage;

use crate::api::{self, Generator};
use crate::assets::{self, AssetCache, AssetLoader, ImageResolver};
use crate::error::{ApiError, AssetError, ExportError, LayoutError};
use crate::export;
use crate::hit::{self, Bounds, Hit};
use crate::inpaint;
use crate::interaction::{BoundsPolicy, InteractionController};
use crate::layout::{Element, ElementId, ElementPatch, ImageStylePatch, LayoutModel, Style, StylePatch, TextStylePatch, DecorationStylePatch};
use crate::persist::{Snapshot, SnapshotStore};
use crate::render;
use crate::viewport::{ScreenPoint, ViewportScaler};

pub const LOGO_ID: &str = "logo";
pub const PROVERB_ID: &str = "proverb";

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub policy: BoundsPolicy,
    pub padding: f32,
    pub asset_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            policy: BoundsPolicy::Free,
            padding: crate::viewport::DEFAULT_PADDING,
            asset_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Background,
    Quote,
}

/// A finished generation call, tagged with the sequence number it was issued under.
#[derive(Debug)]
pub struct JobEvent {
    pub kind: JobKind,
    pub seq: u64,
    pub result: Result<String, ApiError>,
}

/// Request bookkeeping for one kind of generation call.
#[derive(Debug, Default, Clone, Copy)]
struct JobSlot {
    issued: u64,
    loading: bool,
}

impl JobSlot {
    fn issue(&mut self) -> u64 {
        self.issued += 1;
        self.loading = true;
        self.issued
    }

    /// Whether a response with `seq` is the one we're waiting for.
    fn accept(&mut self, seq: u64) -> bool {
        if seq != self.issued {
            return false;
        }
        self.loading = false;
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// A banner that stays up until dismissed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

pub struct EditorSession {
    snapshot: Snapshot,
    controller: InteractionController,
    viewport: ViewportScaler,
    store: SnapshotStore,
    generator: Arc<dyn Generator>,
    tx: Sender<JobEvent>,
    rx: Receiver<JobEvent>,
    background_job: JobSlot,
    quote_job: JobSlot,
    stale_responses: u64,
    notices: VecDeque<Notice>,
    assets: AssetCache,
    loader: AssetLoader,
    selected: Option<ElementId>,
    revision: u64,
}

impl EditorSession {
    /// Restore from `store`, or start from the built-in poster dated `today`.
    pub fn new(
        options: SessionOptions,
        store: SnapshotStore,
        generator: Arc<dyn Generator>,
        today: NaiveDate,
    ) -> Self {
        let snapshot = store.load().unwrap_or_else(|| {
            tracing::info!(path = %store.path().display(), "no stored state, starting fresh");
            Snapshot::fresh(today)
        });
        let (tx, rx) = mpsc::channel();
        let mut session = Self {
            snapshot,
            controller: InteractionController::new(options.policy),
            viewport: ViewportScaler::new(options.padding),
            store,
            generator,
            tx,
            rx,
            background_job: JobSlot::default(),
            quote_job: JobSlot::default(),
            stale_responses: 0,
            notices: VecDeque::new(),
            assets: AssetCache::new(),
            loader: AssetLoader::new(options.asset_timeout),
            selected: None,
            revision: 0,
        };
        session.request_assets();
        session
    }

    pub fn model(&self) -> &LayoutModel {
        &self.snapshot.elements
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn controller(&self) -> &InteractionController {
        &self.controller
    }

    pub fn viewport(&self) -> &ViewportScaler {
        &self.viewport
    }

    pub fn selected(&self) -> Option<&ElementId> {
        self.selected.as_ref()
    }

    /// Bumps whenever anything visible on the poster changes.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_loading(&self, kind: JobKind) -> bool {
        match kind {
            JobKind::Background => self.background_job.loading,
            JobKind::Quote => self.quote_job.loading,
        }
    }

    pub fn assets_loading(&self) -> bool {
        self.loader.is_loading()
    }

    /// Responses that arrived after a newer request of the same kind was issued.
    pub fn stale_responses(&self) -> u64 {
        self.stale_responses
    }

    pub fn notices(&self) -> impl Iterator<Item = &Notice> {
        self.notices.iter()
    }

    pub fn dismiss_notice(&mut self) -> Option<Notice> {
        self.notices.pop_front()
    }

    fn notify(&mut self, level: NoticeLevel, message: String) {
        match level {
            NoticeLevel::Error => tracing::error!("{message}"),
            NoticeLevel::Info => tracing::info!("{message}"),
        }
        self.notices.push_back(Notice { level, message });
    }

    fn changed(&mut self) {
        self.revision += 1;
        if let Err(e) = self.store.save(&self.snapshot) {
            tracing::error!(path = %self.store.path().display(), error = %e, "failed to save state");
        }
    }

    /* ---------------- viewport + pointer ---------------- */

    pub fn resize_viewport(&mut self, width: usize, height: usize) -> bool {
        self.viewport.observe(width, height)
    }

    fn image_aspect(&self, element: &Element) -> Option<f32> {
        element.content.as_deref().and_then(|c| self.assets.aspect(c))
    }

    /// Unrotated logical box of an element plus its rotation, for outlines.
    pub fn bounds_of(&self, id: &ElementId) -> Option<(Bounds, f32)> {
        let element = self.model().get(id)?;
        let bounds = hit::element_bounds(element, self.image_aspect(element))?;
        Some((bounds, element.style.rotation()))
    }

    /// Topmost element under a screen point.
    pub fn hit_at(&self, at: ScreenPoint) -> Option<Hit> {
        let logical = self.viewport.transform().to_logical(at);
        hit::hit_test(self.model(), logical, |e| self.image_aspect(e))
    }

    /// Start a drag/resize if something is under the pointer.
    pub fn pointer_down(&mut self, at: ScreenPoint) -> Option<Hit> {
        let hit = self.hit_at(at)?;
        if !self.controller.pointer_down(&self.snapshot.elements, &hit, at) {
            return None;
        }
        self.selected = Some(hit.id.clone());
        Some(hit)
    }

    pub fn pointer_move(&mut self, at: ScreenPoint) -> Result<Option<ElementId>, LayoutError> {
        let scale = self.viewport.scale();
        let moved = self.controller.pointer_move(&mut self.snapshot.elements, at, scale)?;
        if moved.is_some() {
            self.changed();
        }
        Ok(moved)
    }

    pub fn pointer_up(&mut self) {
        self.controller.pointer_up();
    }

    /* ---------------- direct edits ---------------- */

    pub fn update_element(&mut self, id: &ElementId, patch: ElementPatch) -> Result<(), LayoutError> {
        self.snapshot.elements.update(id, patch)?;
        self.changed();
        Ok(())
    }

    pub fn set_text(&mut self, id: &ElementId, text: &str) -> Result<(), LayoutError> {
        self.update_element(id, ElementPatch::content(Some(text.to_string())))
    }

    /// Load a local image as the logo. Stored inline as a data URL.
    pub fn set_logo(&mut self, path: &Path) -> Result<(), AssetError> {
        let url = assets::file_to_data_url(path)?;
        if let Err(e) = self.update_element(&ElementId::from(LOGO_ID), ElementPatch::content(Some(url))) {
            tracing::warn!(error = %e, "poster has no logo slot");
            return Ok(());
        }
        self.request_assets();
        Ok(())
    }

    /// Clear the logo; its position and width stay for the next upload.
    pub fn remove_logo(&mut self) -> Result<(), LayoutError> {
        self.update_element(&ElementId::from(LOGO_ID), ElementPatch::content(None))
    }

    /// Turn an element by `degrees`, whatever its kind.
    pub fn rotate(&mut self, id: &ElementId, degrees: f32) -> Result<(), LayoutError> {
        let element = self.model().get(id).ok_or_else(|| LayoutError::UnknownElement(id.to_string()))?;
        let value = (element.style.rotation() + degrees).rem_euclid(360.0);
        let patch = match element.style {
            Style::Text(_) => StylePatch::Text(TextStylePatch { rotation: Some(value), ..Default::default() }),
            Style::Image(_) => StylePatch::Image(ImageStylePatch { rotation: Some(value), ..Default::default() }),
            Style::Decoration(_) => {
                StylePatch::Decoration(DecorationStylePatch { rotation: Some(value), ..Default::default() })
            }
        };
        self.update_element(id, ElementPatch::style(patch))
    }

    /* ---------------- generation jobs ---------------- */

    /// Ask for a new background. The inpainter runs on the worker before posting.
    pub fn request_background(&mut self) -> u64 {
        let seq = self.background_job.issue();
        let prompt = api::background_prompt(&mut rand::thread_rng());
        let generator = Arc::clone(&self.generator);
        let tx = self.tx.clone();
        tracing::info!(seq, "background requested");
        thread::spawn(move || {
            let result = generator.background(&prompt).map(|url| inpaint::remove_watermark_data_url(&url));
            let _ = tx.send(JobEvent { kind: JobKind::Background, seq, result });
        });
        seq
    }

    pub fn request_quote(&mut self) -> u64 {
        let seq = self.quote_job.issue();
        let prompt = api::quote_prompt(&mut rand::thread_rng());
        let generator = Arc::clone(&self.generator);
        let tx = self.tx.clone();
        tracing::info!(seq, "quote requested");
        thread::spawn(move || {
            let result = generator.quote(&prompt);
            let _ = tx.send(JobEvent { kind: JobKind::Quote, seq, result });
        });
        seq
    }

    /// Apply one finished job. Stale or failed responses never touch the poster.
    pub fn apply_event(&mut self, event: JobEvent) {
        let JobEvent { kind, seq, result } = event;
        let slot = match kind {
            JobKind::Background => &mut self.background_job,
            JobKind::Quote => &mut self.quote_job,
        };
        if !slot.accept(seq) {
            self.stale_responses += 1;
            tracing::debug!(?kind, seq, latest = slot.issued, "dropping stale response");
            return;
        }

        match (kind, result) {
            (JobKind::Background, Ok(url)) => {
                tracing::info!(seq, source = %assets::short(&url), "background ready");
                self.snapshot.background = url;
                self.request_assets();
                self.changed();
            }
            (JobKind::Quote, Ok(content)) => {
                tracing::info!(seq, "quote ready");
                if let Err(e) = self.set_text(&ElementId::from(PROVERB_ID), &content) {
                    self.notify(NoticeLevel::Error, format!("Quote could not be placed: {e}"));
                }
            }
            (JobKind::Background, Err(e)) => {
                self.notify(NoticeLevel::Error, format!("Background generation failed: {e}"));
            }
            (JobKind::Quote, Err(e)) => {
                self.notify(NoticeLevel::Error, format!("Quote generation failed: {e}"));
            }
        }
    }

    /// Drain finished jobs and image loads. Call once per frame.
    pub fn poll(&mut self) {
        while let Ok(event) = self.rx.try_recv() {
            self.apply_event(event);
        }
        if self.loader.poll(&mut self.assets) > 0 {
            self.revision += 1;
        }
    }

    /* ---------------- images, render, export ---------------- */

    fn referenced_sources(&self) -> Vec<String> {
        let mut sources: Vec<String> = self
            .model()
            .iter()
            .filter(|e| matches!(e.style, Style::Image(_)))
            .filter_map(|e| e.content.clone())
            .collect();
        sources.push(self.snapshot.background.clone());
        sources.retain(|s| !s.is_empty());
        sources
    }

    /// Start loading whatever the poster references and forget what it no longer does.
    fn request_assets(&mut self) {
        let sources = self.referenced_sources();
        let keep: HashSet<&str> = sources.iter().map(String::as_str).collect();
        self.assets.retain_sources(&keep);
        for source in &sources {
            self.loader.request(source, &self.assets);
        }
    }

    /// Block until every referenced image has been tried (CLI paths).
    pub fn load_assets_blocking(&mut self, timeout: Duration) {
        for source in self.referenced_sources() {
            self.assets.load_blocking(&source, timeout);
        }
        self.revision += 1;
    }

    fn background_image(&self) -> Option<&RgbaImage> {
        self.assets.resolve(&self.snapshot.background)
    }

    /// The poster at full logical resolution.
    pub fn render(&self) -> RgbaImage {
        render::render_poster(self.model(), self.background_image(), &self.assets)
    }

    /// Export to `path`. Failures also become a notice.
    pub fn export(&mut self, path: &Path) -> Result<usize, ExportError> {
        let background = Some(self.snapshot.background.as_str()).filter(|b| !b.is_empty());
        match export::export_png(self.model(), background, &self.assets, path) {
            Ok(bytes) => {
                self.notify(NoticeLevel::Info, format!("Saved {}", path.display()));
                Ok(bytes)
            }
            Err(e) => {
                self.notify(NoticeLevel::Error, format!("Export failed: {e}"));
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Position;
    use std::sync::Mutex;
    use std::time::Instant;

    /// Replies in call order; each reply waits for its gate to open.
    struct Gated {
        replies: Mutex<VecDeque<(Receiver<()>, Result<String, ApiError>)>>,
        started: Mutex<Sender<()>>,
    }

    impl Gated {
        fn next(&self) -> Result<String, ApiError> {
            let (gate, reply) = self.replies.lock().unwrap().pop_front().expect("unexpected call");
            self.started.lock().unwrap().send(()).unwrap();
            let _ = gate.recv();
            reply
        }
    }

    impl Generator for Gated {
        fn background(&self, _prompt: &str) -> Result<String, ApiError> {
            self.next()
        }
        fn quote(&self, _prompt: &str) -> Result<String, ApiError> {
            self.next()
        }
    }

    fn session_with(
        replies: Vec<Result<String, ApiError>>,
    ) -> (EditorSession, Vec<Sender<()>>, Receiver<()>, tempfile::TempDir) {
        let mut queue = VecDeque::new();
        let mut gates = Vec::new();
        for reply in replies {
            let (tx, rx) = mpsc::channel();
            gates.push(tx);
            queue.push_back((rx, reply));
        }
        let (started_tx, started_rx) = mpsc::channel();
        let generator = Arc::new(Gated { replies: Mutex::new(queue), started: Mutex::new(started_tx) });
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("state.json"));
        let today = NaiveDate::from_ymd_opt(2025, 1, 7).unwrap();
        // empty background keeps tests off the network
        let start = Snapshot { background: String::new(), elements: LayoutModel::default_poster(today) };
        store.save(&start).unwrap();
        let mut session = EditorSession::new(SessionOptions::default(), store, generator, today);
        session.resize_viewport(740, 1300); // scale 1.0, offset (10, 10)
        (session, gates, started_rx, dir)
    }

    fn poll_until(session: &mut EditorSession, mut done: impl FnMut(&EditorSession) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done(session) {
            assert!(Instant::now() < deadline, "timed out");
            session.poll();
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn proverb(session: &EditorSession) -> String {
        session.model().get(&PROVERB_ID.into()).unwrap().content.clone().unwrap_or_default()
    }

    #[test]
    fn slow_older_quote_never_overwrites_newer_one() {
        let (mut s, gates, started, _dir) = session_with(vec![Ok("old".into()), Ok("new".into())]);
        s.request_quote();
        started.recv().unwrap();
        s.request_quote();
        started.recv().unwrap();

        gates[1].send(()).unwrap();
        poll_until(&mut s, |s| !s.is_loading(JobKind::Quote));
        assert_eq!(proverb(&s), "new");

        gates[0].send(()).unwrap();
        poll_until(&mut s, |s| s.stale_responses() == 1);
        assert_eq!(proverb(&s), "new");
    }

    #[test]
    fn failure_becomes_a_notice_and_clears_loading() {
        let (mut s, gates, started, _dir) =
            session_with(vec![Err(ApiError::Status { status: 500, body: "boom".into() })]);
        let before = proverb(&s);
        s.request_quote();
        assert!(s.is_loading(JobKind::Quote));
        started.recv().unwrap();
        gates[0].send(()).unwrap();
        poll_until(&mut s, |s| !s.is_loading(JobKind::Quote));
        assert_eq!(proverb(&s), before);
        let notice = s.dismiss_notice().unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert!(notice.message.contains("HTTP 500 boom"), "{}", notice.message);
        assert!(s.dismiss_notice().is_none());
    }

    #[test]
    fn generated_background_is_cleaned_and_stored() {
        let img = RgbaImage::from_pixel(50, 80, image::Rgba([10, 200, 30, 255]));
        let png = export::encode_png(&img).unwrap();
        let url = assets::encode_data_url("image/png", &png);
        let (mut s, gates, started, _dir) = session_with(vec![Ok(url)]);
        s.request_background();
        started.recv().unwrap();
        gates[0].send(()).unwrap();
        poll_until(&mut s, |s| !s.is_loading(JobKind::Background));
        assert!(s.snapshot().background.starts_with("data:image/png;base64,"));
        let stored = s.store.load().unwrap();
        assert_eq!(stored.background, s.snapshot().background);
        poll_until(&mut s, |s| s.background_image().is_some());
    }

    #[test]
    fn drag_through_the_viewport_is_written_through() {
        let (mut s, _gates, _started, _dir) = session_with(vec![]);
        // sun sits at (520,1020), size 180; grab it above the proverb block
        let grab = ScreenPoint::new(10.0 + 600.0, 10.0 + 1030.0);
        let hit = s.pointer_down(grab).unwrap();
        assert_eq!(hit.id.as_str(), "sun");
        s.pointer_move(ScreenPoint::new(grab.x - 100.0, grab.y - 20.0)).unwrap();
        s.pointer_up();
        let sun = s.model().get(&"sun".into()).unwrap();
        assert_eq!(sun.position, Position::new(420.0, 1000.0));
        let stored = s.store.load().unwrap();
        assert_eq!(stored.elements.get(&"sun".into()).unwrap().position, Position::new(420.0, 1000.0));
        assert_eq!(s.selected().map(ElementId::as_str), Some("sun"));
    }

    #[test]
    fn logo_upload_and_removal() {
        let (mut s, _gates, _started, dir) = session_with(vec![]);
        let path = dir.path().join("logo.png");
        RgbaImage::from_pixel(4, 2, image::Rgba([0, 0, 0, 255])).save(&path).unwrap();
        s.set_logo(&path).unwrap();
        let logo = s.model().get(&LOGO_ID.into()).unwrap();
        assert!(logo.content.as_deref().unwrap().starts_with("data:image/png"));
        s.remove_logo().unwrap();
        let logo = s.model().get(&LOGO_ID.into()).unwrap();
        assert!(logo.content.is_none());
        assert_eq!(logo.position, Position::new(400.0, 40.0));
    }

    #[test]
    fn rotate_wraps_around() {
        let (mut s, _gates, _started, _dir) = session_with(vec![]);
        let id = ElementId::from("sun");
        s.rotate(&id, -15.0).unwrap();
        assert_eq!(s.model().get(&id).unwrap().style.rotation(), 345.0);
        assert!(matches!(s.rotate(&"ghost".into(), 1.0), Err(LayoutError::UnknownElement(_))));
    }
}
