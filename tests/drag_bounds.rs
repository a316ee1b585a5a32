mod common;

use common::{block_compositor, solid_source};
use memetrue::geometry::{Point, Rect};
use memetrue::placement::{PointerEvent, PointerKind};
use memetrue::session::{EditorSession, SessionState};

const CANVAS: Rect = Rect::new(100.0, 200.0, 400.0, 300.0);
// "Add text here" at 24px with the block rasterizer.
const OVERLAY_W: f32 = 156.0;
const OVERLAY_H: f32 = 24.0;

struct Lcg(u64);

impl Lcg {
    fn next_f32(&mut self, span: f32) -> f32 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((self.0 >> 33) as f32 / (1u64 << 31) as f32) * span
    }
}

fn editing_session() -> EditorSession {
    let mut session = EditorSession::new(block_compositor()).unwrap();
    session.set_canvas(CANVAS);
    session.select_base_image(solid_source(8, 8, [0, 0, 0, 255]));
    session.add_overlay();
    session
}

#[test]
fn drag_keeps_overlay_inside_canvas_for_any_pointer_path() {
    for seed in [1_u64, 7, 42, 1234, 99_999] {
        let mut rng = Lcg(seed);
        let mut session = editing_session();
        let id = session.overlays().last().unwrap().id.clone();

        // Grab the overlay 5px inside its top-left corner.
        let start = session.begin_drag(&id, PointerEvent::mouse(155.0, 255.0));
        assert!(start.suppress_default);

        for _ in 0..200 {
            let x = rng.next_f32(1200.0) - 400.0;
            let y = rng.next_f32(1200.0) - 400.0;
            let response = session.continue_drag(PointerEvent::mouse(x, y));
            assert!(response.suppress_default);

            let position = session.overlays().get(&id).unwrap().position;
            assert!(position.x >= 0.0 && position.x <= CANVAS.size.width - OVERLAY_W, "{position:?}");
            assert!(position.y >= 0.0 && position.y <= CANVAS.size.height - OVERLAY_H, "{position:?}");
        }
        session.end_drag();
        assert!(!session.is_dragging());
    }
}

#[test]
fn drag_tracks_pointer_minus_grab_offset() {
    let mut session = editing_session();
    let id = session.overlays().last().unwrap().id.clone();

    session.begin_drag(&id, PointerEvent::mouse(160.0, 260.0));
    let response = session.continue_drag(PointerEvent::mouse(210.0, 300.0));
    assert_eq!(response.update, Some((id.clone(), Point::new(100.0, 90.0))));
    assert_eq!(session.overlays().get(&id).unwrap().position, Point::new(100.0, 90.0));
    assert_eq!(session.state(), SessionState::Editing);
}

#[test]
fn touch_drags_ignore_other_fingers() {
    let mut session = editing_session();
    let id = session.overlays().last().unwrap().id.clone();

    let start = session.begin_drag(&id, PointerEvent::touch(3, 160.0, 260.0));
    assert!(start.suppress_default);

    let foreign = session.continue_drag(PointerEvent::touch(4, 400.0, 400.0));
    assert_eq!(foreign.update, None);
    assert_eq!(session.overlays().get(&id).unwrap().position, Point::new(50.0, 50.0));

    let own = session.continue_drag(PointerEvent::touch(3, 170.0, 270.0));
    assert_eq!(own.update, Some((id.clone(), Point::new(60.0, 60.0))));
    assert_eq!(PointerEvent::touch(3, 0.0, 0.0).kind, PointerKind::Touch);
}

#[test]
fn whole_drag_is_one_undo_step() {
    let mut session = editing_session();
    let id = session.overlays().last().unwrap().id.clone();

    session.begin_drag(&id, PointerEvent::mouse(160.0, 260.0));
    for step in 1..=10 {
        session.continue_drag(PointerEvent::mouse(160.0 + step as f32 * 5.0, 260.0));
    }
    session.end_drag();
    assert_eq!(session.overlays().get(&id).unwrap().position, Point::new(100.0, 50.0));

    session.undo();
    assert_eq!(session.overlays().get(&id).unwrap().position, Point::new(50.0, 50.0));
    assert_eq!(session.overlays().len(), 1);
}

#[test]
fn moves_after_the_drag_ends_are_ignored() {
    let mut session = editing_session();
    let id = session.overlays().last().unwrap().id.clone();

    session.begin_drag(&id, PointerEvent::mouse(160.0, 260.0));
    session.end_drag();
    let response = session.continue_drag(PointerEvent::mouse(300.0, 300.0));
    assert_eq!(response.update, None);
    assert!(!response.suppress_default);
    assert_eq!(session.overlays().get(&id).unwrap().position, Point::new(50.0, 50.0));
}

#[test]
fn drags_need_known_canvas_bounds() {
    let mut session = EditorSession::new(block_compositor()).unwrap();
    session.select_base_image(solid_source(8, 8, [0, 0, 0, 255]));
    session.add_overlay();
    let id = session.overlays().last().unwrap().id.clone();

    let response = session.begin_drag(&id, PointerEvent::mouse(10.0, 10.0));
    assert!(!response.suppress_default);
    assert!(!session.is_dragging());
}
