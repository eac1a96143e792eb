//! The viewer session: sole owner of the current recognition cycle.
//!
//! All derived state (view state, rendered surfaces, zoom modal) lives in one
//! [`Cycle`] that is replaced wholesale under the write lock, so no reader can
//! observe overlays of a previous image next to a new result.

use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::RenderConfig;
use crate::error::{ErrorKind, ViewerError};
use crate::geometry::Size;
use crate::modal::{self, ModalOverlay, ModalShell, SurfaceReadiness, ZoomModal, ZoomSource};
use crate::schema::{ActiveView, RecognitionResult, ViewState};
use crate::threshold;
use crate::view::{self, Rendered, Transition};

/// One recognition cycle and everything derived from it.
#[derive(Debug)]
pub struct Cycle {
    pub result: RecognitionResult,
    pub state: ViewState,
    pub inline_display: Option<Size>,
    pub rendered: Rendered,
    pub modal: Option<ZoomModal>,
}

impl Cycle {
    fn new(result: RecognitionResult, render: &RenderConfig) -> Self {
        let state = ViewState::default();
        let rendered = view::render(&result, &state, None, render);
        Self {
            result,
            state,
            inline_display: None,
            rendered,
            modal: None,
        }
    }

    fn rerender(&mut self, render: &RenderConfig) {
        self.rendered = view::render(&self.result, &self.state, self.inline_display, render);
        if let Some(views) = self.rendered.views() {
            self.state.active_view = views.active_view;
        }
    }
}

/// Transient user message.
#[derive(Debug, Clone, Serialize)]
pub struct Notice {
    pub message: String,
    pub kind: ErrorKind,
    #[serde(skip)]
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct Session {
    cycle: Option<Cycle>,
    busy: bool,
    notice: Option<Notice>,
}

/// Shared handle to the session.
#[derive(Debug, Clone)]
pub struct SessionStore {
    inner: Arc<RwLock<Session>>,
    render: Arc<RenderConfig>,
    notice_ttl: Duration,
}

/// Clears the busy indicator when dropped, whichever way the request ends.
#[derive(Debug)]
pub struct BusyGuard {
    inner: Arc<RwLock<Session>>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .busy = false;
        debug!("Busy indicator cleared");
    }
}

/// Serializable view of the session for API clients.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub busy: bool,
    pub notice: Option<Notice>,
    pub result: Option<ResultSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultSnapshot {
    pub id: String,
    pub item_count: usize,
    pub boxed_count: usize,
    pub image_width: Option<f64>,
    pub image_height: Option<f64>,
    pub threshold_percent: u8,
    pub markers: Vec<threshold::Marker>,
    pub views: Rendered,
    pub zoom: Option<ModalShell>,
}

impl SessionStore {
    pub fn new(render: RenderConfig, notice_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Session::default())),
            render: Arc::new(render),
            notice_ttl,
        }
    }

    pub fn render_config(&self) -> &RenderConfig {
        &self.render
    }

    fn read(&self) -> RwLockReadGuard<'_, Session> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Session> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark a recognition request as in flight. Fails while another one is.
    pub fn begin_recognition(&self) -> Result<BusyGuard, ViewerError> {
        let mut session = self.write();
        if session.busy {
            return Err(ViewerError::Busy);
        }
        session.busy = true;
        session.notice = None;
        Ok(BusyGuard {
            inner: self.inner.clone(),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.read().busy
    }

    /// Replace the current cycle, purging every previous surface and modal.
    pub fn replace(&self, result: RecognitionResult) -> Snapshot {
        let cycle = Cycle::new(result, &self.render);
        info!(
            "New recognition cycle {} ({} items, {} boxed)",
            cycle.result.id,
            cycle.result.items.len(),
            cycle.result.boxed_count()
        );
        let mut session = self.write();
        session.cycle = Some(cycle);
        self.snapshot_of(&session)
    }

    /// Drop the current result ("change image").
    pub fn reset(&self) {
        let mut session = self.write();
        session.cycle = None;
        session.notice = None;
    }

    pub fn notify(&self, error: &ViewerError) {
        self.write().notice = Some(Notice {
            message: error.to_string(),
            kind: error.kind(),
            expires_at: Instant::now() + self.notice_ttl,
        });
    }

    /// The current notice, unless it has expired.
    pub fn notice(&self) -> Option<Notice> {
        self.read()
            .notice
            .as_ref()
            .filter(|n| n.expires_at > Instant::now())
            .cloned()
    }

    pub fn set_threshold(&self, percent: i64) -> Result<String, ViewerError> {
        let t = threshold::from_percent(percent);
        let mut session = self.write();
        let cycle = session.cycle.as_mut().ok_or(ViewerError::NoResult)?;
        cycle.state.threshold = t;
        let items = &cycle.result.items;
        let text = match cycle.rendered.views_mut() {
            Some(views) => {
                threshold::apply_threshold(views, items, t);
                debug!("Threshold set to {:.2}, visible {:?}", t, views.visible_counts());
                views.text.clone()
            }
            None => String::new(),
        };
        Ok(text)
    }

    pub fn toggle(&self, requested: ActiveView) -> Result<Transition, ViewerError> {
        let mut session = self.write();
        let cycle = session.cycle.as_mut().ok_or(ViewerError::NoResult)?;
        let Some(layout_enabled) = cycle.rendered.views().map(|v| v.layout.enabled) else {
            return Ok(Transition::Refused);
        };
        let outcome = view::transition(&mut cycle.state, requested, layout_enabled);
        if outcome == Transition::Changed {
            if let Some(views) = cycle.rendered.views_mut() {
                views.active_view = cycle.state.active_view;
            }
        }
        Ok(outcome)
    }

    /// The inline image was (re)laid out at `size`; remap the overlay.
    pub fn set_inline_size(&self, size: Size) -> Result<(), ViewerError> {
        let mut session = self.write();
        let cycle = session.cycle.as_mut().ok_or(ViewerError::NoResult)?;
        cycle.inline_display = size.is_known().then_some(size);
        cycle.rerender(&self.render);
        Ok(())
    }

    /// Derived text of the visible items.
    pub fn text(&self) -> Result<String, ViewerError> {
        let session = self.read();
        let cycle = session.cycle.as_ref().ok_or(ViewerError::NoResult)?;
        Ok(cycle
            .rendered
            .views()
            .map(|v| v.text.clone())
            .unwrap_or_default())
    }

    pub fn open_zoom(&self, source: ZoomSource) -> Result<ModalShell, ViewerError> {
        let mut session = self.write();
        let cycle = session.cycle.as_mut().ok_or(ViewerError::NoResult)?;
        let views = cycle
            .rendered
            .views()
            .ok_or_else(|| ViewerError::Zoom("nothing to zoom".to_string()))?;
        modal::check_trigger(source, views)?;

        let modal = ZoomModal::open(source, &cycle.result, &self.render);
        let shell = modal.shell();
        info!("Opened zoom modal {} ({:?})", shell.id, source);
        cycle.modal = Some(modal);
        Ok(shell)
    }

    pub fn zoom_rendered(&self, size: Size) -> Result<(), ViewerError> {
        if !size.is_known() {
            return Err(ViewerError::Zoom(format!(
                "rendered size {}x{} is not usable",
                size.width, size.height
            )));
        }
        let session = self.read();
        let modal = open_modal(&session)?;
        modal.mark_rendered(size);
        Ok(())
    }

    /// Wait for the modal to render, then build its overlay.
    ///
    /// The session lock is not held while waiting.
    pub async fn zoom_overlay(&self, timeout: Duration) -> Result<ModalOverlay, ViewerError> {
        let (modal_id, readiness): (String, SurfaceReadiness) = {
            let session = self.read();
            let modal = open_modal(&session)?;
            (modal.id.clone(), modal.readiness())
        };

        let size = readiness.wait(timeout).await?;

        let mut session = self.write();
        let cycle = session.cycle.as_mut().ok_or(ViewerError::NoResult)?;
        let Cycle {
            result,
            rendered,
            modal,
            ..
        } = cycle;
        let modal = modal
            .as_mut()
            .filter(|m| m.id == modal_id)
            .ok_or_else(|| ViewerError::Zoom("zoom view was closed".to_string()))?;
        let views = rendered
            .views()
            .ok_or_else(|| ViewerError::Zoom("nothing to zoom".to_string()))?;
        Ok(modal.populate(result, views, size, &self.render).clone())
    }

    /// Close the modal, discarding its annotation clones.
    pub fn close_zoom(&self) -> bool {
        let mut session = self.write();
        match session.cycle.as_mut().and_then(|c| c.modal.take()) {
            Some(modal) => {
                let clones = modal.overlay().map_or(0, |o| o.annotations.len());
                debug!("Zoom modal {} closed, {} annotations discarded", modal.id, clones);
                true
            }
            None => false,
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        let session = self.read();
        self.snapshot_of(&session)
    }

    fn snapshot_of(&self, session: &Session) -> Snapshot {
        Snapshot {
            busy: session.busy,
            notice: session
                .notice
                .as_ref()
                .filter(|n| n.expires_at > Instant::now())
                .cloned(),
            result: session.cycle.as_ref().map(|c| ResultSnapshot {
                id: c.result.id.clone(),
                item_count: c.result.items.len(),
                boxed_count: c.result.boxed_count(),
                image_width: c.result.image_width,
                image_height: c.result.image_height,
                threshold_percent: threshold::to_percent(c.state.threshold),
                markers: threshold::markers(&self.render.threshold_presets, c.state.threshold),
                views: c.rendered.clone(),
                zoom: c.modal.as_ref().map(|m| m.shell()),
            }),
        }
    }

    /// Run `f` against the current cycle under the read lock.
    pub fn with_cycle<R>(&self, f: impl FnOnce(&Cycle) -> R) -> Option<R> {
        self.read().cycle.as_ref().map(f)
    }
}

fn open_modal(session: &Session) -> Result<&ZoomModal, ViewerError> {
    session
        .cycle
        .as_ref()
        .ok_or(ViewerError::NoResult)?
        .modal
        .as_ref()
        .ok_or_else(|| ViewerError::Zoom("no zoom view is open".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{BoundingBox, RecognizedItem};

    fn store() -> SessionStore {
        SessionStore::new(RenderConfig::default(), Duration::from_secs(5))
    }

    fn boxed(n: usize) -> RecognitionResult {
        let items = (0..n)
            .map(|i| {
                let x = i as f64 * 10.0;
                RecognizedItem::new(
                    format!("line {}", i),
                    if i % 2 == 0 { 0.95 } else { 0.6 },
                    BoundingBox::new(x, 0.0, x + 8.0, 8.0),
                )
            })
            .collect();
        RecognitionResult::new(items, String::new(), Some(100.0), Some(100.0))
    }

    #[test]
    fn test_busy_guard_clears_on_drop() {
        let store = store();
        let guard = store.begin_recognition().unwrap();
        assert!(store.is_busy());
        assert!(matches!(store.begin_recognition(), Err(ViewerError::Busy)));
        drop(guard);
        assert!(!store.is_busy());
        assert!(store.begin_recognition().is_ok());
    }

    #[test]
    fn test_replace_resets_view_state_and_modal() {
        let store = store();
        store.replace(boxed(6));
        store.set_threshold(70).unwrap();
        store.toggle(ActiveView::Layout).unwrap();
        store.open_zoom(ZoomSource::Inline).unwrap();

        let snapshot = store.replace(boxed(2));
        let result = snapshot.result.unwrap();
        assert_eq!(result.threshold_percent, 0);
        assert!(result.zoom.is_none());
        let views = result.views;
        let views = views.views().unwrap();
        assert_eq!(views.active_view, ActiveView::List);
        assert_eq!(views.visible_counts(), (2, 2, 2));
    }

    #[test]
    fn test_threshold_updates_text() {
        let store = store();
        store.replace(boxed(3));
        let text = store.set_threshold(70).unwrap();
        assert_eq!(text, "line 0\nline 2");
        assert_eq!(store.text().unwrap(), "line 0\nline 2");
        assert_eq!(store.set_threshold(0).unwrap(), "line 0\nline 1\nline 2");
    }

    #[test]
    fn test_actions_without_result() {
        let store = store();
        assert!(matches!(store.text(), Err(ViewerError::NoResult)));
        assert!(matches!(store.set_threshold(10), Err(ViewerError::NoResult)));
        assert!(matches!(store.open_zoom(ZoomSource::Layout), Err(ViewerError::NoResult)));
        assert!(!store.close_zoom());
    }

    #[test]
    fn test_inline_resize_remaps_boxes() {
        let store = store();
        store.replace(boxed(1));
        store.set_inline_size(Size::new(50.0, 50.0)).unwrap();
        let rect = store
            .with_cycle(|c| c.rendered.views().unwrap().inline.boxes[0].placement)
            .flatten()
            .unwrap();
        assert_eq!(rect.width, 4.0);
    }

    #[test]
    fn test_notice_expires() {
        let store = SessionStore::new(RenderConfig::default(), Duration::from_millis(0));
        store.notify(&ViewerError::invalid("bad file"));
        assert!(store.notice().is_none());

        let store = self::store();
        store.notify(&ViewerError::Engine(2));
        let notice = store.notice().unwrap();
        assert_eq!(notice.kind, ErrorKind::Engine);
    }

    #[tokio::test]
    async fn test_zoom_lifecycle() {
        let store = store();
        store.replace(boxed(5));
        let shell = store.open_zoom(ZoomSource::Inline).unwrap();
        assert_eq!(shell.source, ZoomSource::Inline);

        store.zoom_rendered(Size::new(200.0, 200.0)).unwrap();
        let overlay = store.zoom_overlay(Duration::from_secs(1)).await.unwrap();
        assert_eq!(overlay.modal_id, shell.id);
        assert_eq!(overlay.annotations.len(), 5);
        assert_eq!(overlay.annotations[0].rect.width, 16.0);

        assert!(store.close_zoom());
        assert!(store.with_cycle(|c| c.modal.is_none()).unwrap());

        // Reopening starts without clones.
        store.open_zoom(ZoomSource::Inline).unwrap();
        assert!(store
            .with_cycle(|c| c.modal.as_ref().unwrap().overlay().is_none())
            .unwrap());
    }

    #[tokio::test]
    async fn test_zoom_rendered_rejects_unusable_size() {
        let store = store();
        store.replace(boxed(5));
        store.open_zoom(ZoomSource::Inline).unwrap();

        for size in [Size::new(0.0, 0.0), Size::new(f64::NAN, 120.0)] {
            assert!(matches!(store.zoom_rendered(size), Err(ViewerError::Zoom(_))));
        }
        assert!(matches!(
            store.zoom_overlay(Duration::from_millis(20)).await,
            Err(ViewerError::ZoomTimeout)
        ));

        store.zoom_rendered(Size::new(100.0, 100.0)).unwrap();
        let overlay = store.zoom_overlay(Duration::from_secs(1)).await.unwrap();
        assert!(overlay.annotations.iter().all(|a| a.rect.width > 0.0));
    }

    #[test]
    fn test_snapshot_after_guard_dropped_is_idle() {
        let store = store();
        let guard = store.begin_recognition().unwrap();
        store.replace(boxed(1));
        drop(guard);
        assert!(!store.snapshot().busy);
    }

    #[tokio::test]
    async fn test_zoom_overlay_waits_without_holding_lock() {
        let store = store();
        store.replace(boxed(5));
        store.open_zoom(ZoomSource::Layout).unwrap();

        let waiting = {
            let store = store.clone();
            tokio::spawn(async move { store.zoom_overlay(Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.set_threshold(90).unwrap();
        store.zoom_rendered(Size::new(300.0, 300.0)).unwrap();

        let overlay = waiting.await.unwrap().unwrap();
        let visible = overlay.annotations.iter().filter(|a| a.visible).count();
        assert_eq!(visible, 3);
    }

    #[test]
    fn test_inline_zoom_refused_below_five_boxes() {
        let store = store();
        store.replace(boxed(4));
        assert!(matches!(
            store.open_zoom(ZoomSource::Inline),
            Err(ViewerError::Zoom(_))
        ));
        assert!(store.open_zoom(ZoomSource::Layout).is_ok());
    }
}
