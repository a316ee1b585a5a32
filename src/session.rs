//! One editing session: base image, overlays, drag state and compositing.
//!
//! ```text
//!   Empty ──select──► BaseSelected ──edit──► Editing ──composite──► Composited
//!     ▲                    ▲                    ▲                       │
//!     │                    └──── select ────────┴────────── select ─────┤
//!     │                                         └──────── edit ─────────┤
//!     └──────────────────────────── reset ──────────────────────────────┘
//! ```
//!
//! All methods run on the caller's thread except rasterization, which is
//! handed to the session's [`CompositeWorker`].

use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::collection::OverlayCollection;
use crate::compositor::{CompositeResult, Compositor};
use crate::error::CompositeError;
use crate::geometry::{Rect, Size};
use crate::overlay::{OverlayId, OverlayPatch, TextOverlay};
use crate::placement::{DragController, DragResponse, PointerEvent};
use crate::source::BaseImage;
use crate::text::TextRasterizer;
use crate::worker::{CompositeRequest, CompositeTicket, CompositeWorker};

pub const MAX_UNDO: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Empty,
    BaseSelected,
    Editing,
    Composited,
}

/// A composite request in flight, tied to the session epoch it was made in.
pub struct PendingComposite {
    ticket: CompositeTicket,
    epoch: u64,
}

pub struct EditorSession {
    state: SessionState,
    base: Option<BaseImage>,
    overlays: OverlayCollection,
    canvas: Option<Rect>,
    drag: DragController,
    drag_snapshot: Option<OverlayCollection>,
    undo: VecDeque<OverlayCollection>,
    redo: Vec<OverlayCollection>,
    epoch: u64,
    rasterizer: Arc<dyn TextRasterizer>,
    worker: CompositeWorker,
}

impl EditorSession {
    pub fn new(compositor: Compositor) -> Result<Self> {
        let rasterizer = Arc::clone(compositor.rasterizer());
        let worker = CompositeWorker::spawn(compositor)?;
        Ok(Self {
            state: SessionState::Empty,
            base: None,
            overlays: OverlayCollection::new(),
            canvas: None,
            drag: DragController::new(),
            drag_snapshot: None,
            undo: VecDeque::new(),
            redo: Vec::new(),
            epoch: 0,
            rasterizer,
            worker,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn base_image(&self) -> Option<&BaseImage> {
        self.base.as_ref()
    }

    pub fn overlays(&self) -> &OverlayCollection {
        &self.overlays
    }

    pub fn canvas(&self) -> Option<Rect> {
        self.canvas
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_dragging()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Sets the on-screen container the overlays are placed in, in client
    /// coordinates. Drags are ignored until this is known.
    pub fn set_canvas(&mut self, canvas: Rect) {
        self.canvas = Some(canvas);
    }

    /// Measured bounding box of an overlay's text.
    pub fn overlay_size(&self, overlay: &TextOverlay) -> Size {
        self.rasterizer.measure(&overlay.text, overlay.font_px())
    }

    /// Fixes the base image and starts over with no overlays. Any pending
    /// composite or drag from the previous image is abandoned.
    pub fn select_base_image(&mut self, base: impl Into<BaseImage>) -> SessionState {
        let base = base.into();
        info!(source = %base.source().label(), "base image selected");
        self.abandon_in_flight();
        self.base = Some(base);
        self.overlays = OverlayCollection::new();
        self.state = SessionState::BaseSelected;
        self.state
    }

    /// Discards the base image, overlays and history.
    pub fn reset(&mut self) -> SessionState {
        debug!("session reset");
        self.abandon_in_flight();
        self.base = None;
        self.overlays = OverlayCollection::new();
        self.state = SessionState::Empty;
        self.state
    }

    pub fn add_overlay(&mut self) -> SessionState {
        if self.base.is_none() {
            debug!("add_overlay ignored without a base image");
            return self.state;
        }
        let (next, id) = self.overlays.add_default();
        debug!(overlay = %id, "overlay added");
        self.commit(next);
        self.state
    }

    pub fn remove_overlay(&mut self, id: &OverlayId) -> SessionState {
        if self.drag.active_overlay() == Some(id) {
            self.end_drag();
        }
        let next = self.overlays.remove(id);
        self.commit(next);
        self.state
    }

    /// Applies `patch` to one overlay. A new position is clamped so the
    /// overlay stays inside the canvas.
    pub fn update_overlay(&mut self, id: &OverlayId, patch: &OverlayPatch) -> SessionState {
        if patch.is_empty() {
            return self.state;
        }
        let mut next = self.overlays.apply_patch(id, patch);
        if patch.position.is_some() {
            next = self.clamp_into_canvas(next, id);
        }
        self.commit(next);
        self.state
    }

    pub fn begin_drag(&mut self, id: &OverlayId, event: PointerEvent) -> DragResponse {
        let ignored = DragResponse {
            update: None,
            suppress_default: false,
        };
        if self.base.is_none() || self.drag.is_dragging() {
            return ignored;
        }
        let Some(canvas) = self.canvas else {
            debug!("drag ignored: canvas bounds unknown");
            return ignored;
        };
        let Some(overlay) = self.overlays.get(id) else {
            return ignored;
        };

        let size = self.overlay_size(overlay);
        let response = self
            .drag
            .begin(id.clone(), overlay.position, size, canvas, event);
        if self.drag.is_dragging() {
            self.drag_snapshot = Some(self.overlays.clone());
        }
        response
    }

    pub fn continue_drag(&mut self, event: PointerEvent) -> DragResponse {
        let response = self.drag.update(event);
        if let Some((id, position)) = &response.update {
            let next = self.overlays.update_position(id, *position);
            if next != self.overlays {
                self.overlays = next;
                self.state = SessionState::Editing;
            }
        }
        response
    }

    /// Finishes the drag. The whole gesture becomes one undo step.
    pub fn end_drag(&mut self) -> SessionState {
        if self.drag.end().is_some() {
            if let Some(before) = self.drag_snapshot.take() {
                if before != self.overlays {
                    self.push_undo(before);
                    self.redo.clear();
                }
            }
        }
        self.state
    }

    pub fn undo(&mut self) -> SessionState {
        self.end_drag();
        if let Some(previous) = self.undo.pop_back() {
            let current = std::mem::replace(&mut self.overlays, previous);
            self.redo.push(current);
            self.state = SessionState::Editing;
        }
        self.state
    }

    pub fn redo(&mut self) -> SessionState {
        self.end_drag();
        if let Some(next) = self.redo.pop() {
            let current = std::mem::replace(&mut self.overlays, next);
            self.push_undo(current);
            self.state = SessionState::Editing;
        }
        self.state
    }

    /// Hands the current base image and overlays to the worker. Any earlier
    /// request still in flight is cancelled.
    pub fn request_composite(&mut self, width: u32, height: u32) -> Result<PendingComposite, CompositeError> {
        let base = self.base.clone().ok_or(CompositeError::NoBaseImage)?;
        let ticket = self.worker.submit(CompositeRequest {
            base,
            overlays: self.overlays.clone(),
            width,
            height,
        });
        Ok(PendingComposite {
            ticket,
            epoch: self.epoch,
        })
    }

    /// Blocks until `pending` finishes. On success the session moves to
    /// `Composited`; on failure nothing changes.
    pub fn await_composite(&mut self, pending: PendingComposite) -> Result<CompositeResult, CompositeError> {
        let epoch = pending.epoch;
        let reply = pending.ticket.wait();
        self.settle(epoch, reply)
    }

    /// Non-blocking form of [`await_composite`](Self::await_composite).
    /// Hands `pending` back while the worker is still busy.
    pub fn poll_composite(
        &mut self,
        pending: PendingComposite,
    ) -> std::result::Result<Result<CompositeResult, CompositeError>, PendingComposite> {
        match pending.ticket.try_wait() {
            Some(reply) => Ok(self.settle(pending.epoch, reply)),
            None => Err(pending),
        }
    }

    pub fn composite(&mut self, width: u32, height: u32) -> Result<CompositeResult, CompositeError> {
        let pending = self.request_composite(width, height)?;
        self.await_composite(pending)
    }

    fn settle(
        &mut self,
        epoch: u64,
        reply: Result<CompositeResult, CompositeError>,
    ) -> Result<CompositeResult, CompositeError> {
        if epoch != self.epoch {
            debug!("dropping composite from a superseded session");
            return Err(CompositeError::Cancelled);
        }
        match reply {
            Ok(result) => {
                info!(
                    width = result.width(),
                    height = result.height(),
                    bytes = result.png_bytes().len(),
                    "composite ready"
                );
                self.state = SessionState::Composited;
                Ok(result)
            }
            Err(error) => {
                warn!(code = error.code(), "composite failed: {error}");
                Err(error)
            }
        }
    }

    fn commit(&mut self, next: OverlayCollection) {
        if next == self.overlays {
            return;
        }
        let previous = std::mem::replace(&mut self.overlays, next);
        self.push_undo(previous);
        self.redo.clear();
        self.state = SessionState::Editing;
    }

    fn push_undo(&mut self, snapshot: OverlayCollection) {
        self.undo.push_back(snapshot);
        while self.undo.len() > MAX_UNDO {
            self.undo.pop_front();
        }
    }

    fn clamp_into_canvas(&self, collection: OverlayCollection, id: &OverlayId) -> OverlayCollection {
        let (Some(canvas), Some(overlay)) = (self.canvas, collection.get(id)) else {
            return collection;
        };
        let clamped = canvas.clamp_box(overlay.position, self.overlay_size(overlay));
        collection.update_position(id, clamped)
    }

    fn abandon_in_flight(&mut self) {
        self.worker.cancel_pending();
        self.epoch += 1;
        self.drag.end();
        self.drag_snapshot = None;
        self.undo.clear();
        self.redo.clear();
    }
}
