//! Pointer-drag placement of overlays.
//!
//! The controller owns a single active-drag slot. While a drag is active
//! every further drag-start is ignored, and move events from any pointer
//! other than the one that started the drag are dropped. Each accepted move
//! yields the clamped canvas-space position the caller should write into the
//! overlay collection; there is no separate commit on release.

use crate::geometry::{Point, Rect, Size};
use crate::overlay::OverlayId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    Mouse,
    Pen,
    Touch,
}

/// A pointer sample in client (window) coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub pointer_id: u64,
    pub kind: PointerKind,
    pub client: Point,
}

impl PointerEvent {
    pub fn mouse(x: f32, y: f32) -> Self {
        Self {
            pointer_id: 1,
            kind: PointerKind::Mouse,
            client: Point::new(x, y),
        }
    }

    pub fn touch(pointer_id: u64, x: f32, y: f32) -> Self {
        Self {
            pointer_id,
            kind: PointerKind::Touch,
            client: Point::new(x, y),
        }
    }
}

/// What the shell must do with the platform event that produced a drag call.
#[derive(Debug, Clone, PartialEq)]
pub struct DragResponse {
    /// New canvas-space position for the dragged overlay, if any.
    pub update: Option<(OverlayId, Point)>,
    /// Cancel the platform's default gesture (scroll, pull-to-refresh).
    pub suppress_default: bool,
}

impl DragResponse {
    fn ignored() -> Self {
        Self {
            update: None,
            suppress_default: false,
        }
    }

    fn captured(update: Option<(OverlayId, Point)>) -> Self {
        Self {
            update,
            suppress_default: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct ActiveDrag {
    overlay: OverlayId,
    pointer_id: u64,
    kind: PointerKind,
    grab_offset: Point,
    container: Rect,
    overlay_size: Size,
}

#[derive(Debug, Clone, Default)]
pub struct DragController {
    active: Option<ActiveDrag>,
}

impl DragController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_dragging(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_overlay(&self) -> Option<&OverlayId> {
        self.active.as_ref().map(|drag| &drag.overlay)
    }

    pub fn active_pointer_kind(&self) -> Option<PointerKind> {
        self.active.as_ref().map(|drag| drag.kind)
    }

    /// Starts dragging `overlay`, currently at canvas-space `position` with
    /// measured `overlay_size`, inside `container` (client coordinates).
    /// Ignored while another drag is active.
    pub fn begin(
        &mut self,
        overlay: OverlayId,
        position: Point,
        overlay_size: Size,
        container: Rect,
        event: PointerEvent,
    ) -> DragResponse {
        if self.active.is_some() {
            return DragResponse::ignored();
        }

        let top_left_client = Point::new(
            container.origin.x + position.x,
            container.origin.y + position.y,
        );
        let grab_offset = Point::new(
            event.client.x - top_left_client.x,
            event.client.y - top_left_client.y,
        );
        self.active = Some(ActiveDrag {
            overlay,
            pointer_id: event.pointer_id,
            kind: event.kind,
            grab_offset,
            container,
            overlay_size,
        });
        DragResponse::captured(None)
    }

    pub fn update(&mut self, event: PointerEvent) -> DragResponse {
        let Some(drag) = &self.active else {
            return DragResponse::ignored();
        };
        if drag.pointer_id != event.pointer_id {
            return DragResponse::ignored();
        }

        let candidate = Point::new(
            event.client.x - drag.grab_offset.x - drag.container.origin.x,
            event.client.y - drag.grab_offset.y - drag.container.origin.y,
        );
        let clamped = drag.container.clamp_box(candidate, drag.overlay_size);
        DragResponse::captured(Some((drag.overlay.clone(), clamped)))
    }

    /// Ends the active drag and returns the overlay that was being dragged.
    pub fn end(&mut self) -> Option<OverlayId> {
        self.active.take().map(|drag| drag.overlay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container() -> Rect {
        Rect::new(100.0, 200.0, 400.0, 300.0)
    }

    #[test]
    fn move_follows_pointer_minus_grab_offset() {
        let mut controller = DragController::new();
        let id = OverlayId::new("a");
        // overlay top-left in client space is (150, 250); grab 10px in.
        let start = controller.begin(
            id.clone(),
            Point::new(50.0, 50.0),
            Size::new(80.0, 30.0),
            container(),
            PointerEvent::mouse(160.0, 260.0),
        );
        assert!(start.suppress_default);
        assert_eq!(start.update, None);

        let moved = controller.update(PointerEvent::mouse(210.0, 300.0));
        assert_eq!(moved.update, Some((id, Point::new(100.0, 90.0))));
    }

    #[test]
    fn move_is_clamped_to_container() {
        let mut controller = DragController::new();
        let id = OverlayId::new("a");
        controller.begin(
            id.clone(),
            Point::new(0.0, 0.0),
            Size::new(80.0, 30.0),
            container(),
            PointerEvent::mouse(100.0, 200.0),
        );

        let far = controller.update(PointerEvent::mouse(5000.0, 5000.0));
        assert_eq!(far.update, Some((id.clone(), Point::new(320.0, 270.0))));
        let behind = controller.update(PointerEvent::mouse(-5000.0, 0.0));
        assert_eq!(behind.update, Some((id, Point::new(0.0, 0.0))));
    }

    #[test]
    fn second_begin_is_ignored_until_end() {
        let mut controller = DragController::new();
        let first = OverlayId::new("first");
        let second = OverlayId::new("second");
        controller.begin(first.clone(), Point::default(), Size::default(), container(), PointerEvent::mouse(100.0, 200.0));
        let ignored = controller.begin(second.clone(), Point::default(), Size::default(), container(), PointerEvent::touch(7, 100.0, 200.0));
        assert!(!ignored.suppress_default);
        assert_eq!(controller.active_overlay(), Some(&first));

        assert_eq!(controller.end(), Some(first));
        controller.begin(second.clone(), Point::default(), Size::default(), container(), PointerEvent::touch(7, 100.0, 200.0));
        assert_eq!(controller.active_overlay(), Some(&second));
        assert_eq!(controller.active_pointer_kind(), Some(PointerKind::Touch));
    }

    #[test]
    fn foreign_pointer_moves_are_dropped() {
        let mut controller = DragController::new();
        controller.begin(OverlayId::new("a"), Point::default(), Size::default(), container(), PointerEvent::touch(1, 100.0, 200.0));
        let other = controller.update(PointerEvent::touch(2, 300.0, 300.0));
        assert_eq!(other, DragResponse::ignored());
    }

    #[test]
    fn events_after_end_are_ignored() {
        let mut controller = DragController::new();
        controller.begin(OverlayId::new("a"), Point::default(), Size::default(), container(), PointerEvent::mouse(100.0, 200.0));
        controller.end();
        assert!(!controller.is_dragging());
        assert_eq!(controller.update(PointerEvent::mouse(150.0, 250.0)), DragResponse::ignored());
        assert_eq!(controller.end(), None);
    }
}
