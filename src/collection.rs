use crate::color::Rgba;
use crate::geometry::Point;
use crate::overlay::{clamp_font_size, FontSizeStep, OverlayId, OverlayPatch, TextOverlay};

/// Ordered overlays for one editing session. Index order is paint order.
///
/// Every operation takes `&self` and returns a new collection, so a caller
/// holding an earlier value (an undo stack, an in-flight composite) never
/// observes later edits.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlayCollection {
    overlays: Vec<TextOverlay>,
    next_sequence: u64,
}

impl OverlayCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.overlays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overlays.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TextOverlay> {
        self.overlays.iter()
    }

    pub fn as_slice(&self) -> &[TextOverlay] {
        &self.overlays
    }

    pub fn get(&self, id: &OverlayId) -> Option<&TextOverlay> {
        self.overlays.iter().find(|overlay| &overlay.id == id)
    }

    pub fn contains(&self, id: &OverlayId) -> bool {
        self.get(id).is_some()
    }

    pub fn last(&self) -> Option<&TextOverlay> {
        self.overlays.last()
    }

    /// Id the next [`add_default`](Self::add_default) would assign.
    pub fn peek_next_id(&self) -> OverlayId {
        OverlayId::generated(self.free_sequence())
    }

    /// Appends `overlay`. An id that is already taken is swapped for a
    /// generated one so ids stay unique.
    #[must_use]
    pub fn add(&self, mut overlay: TextOverlay) -> Self {
        let mut next = self.clone();
        if next.contains(&overlay.id) {
            overlay.id = next.allocate_id();
        }
        overlay.font_size = clamp_font_size(overlay.font_size);
        overlay.position = overlay.position.non_negative();
        next.overlays.push(overlay);
        next
    }

    /// Appends an overlay with the editor defaults and a generated id.
    #[must_use]
    pub fn add_default(&self) -> (Self, OverlayId) {
        let mut next = self.clone();
        let id = next.allocate_id();
        next.overlays.push(TextOverlay::new(id.clone()));
        (next, id)
    }

    #[must_use]
    pub fn remove(&self, id: &OverlayId) -> Self {
        let mut next = self.clone();
        next.overlays.retain(|overlay| &overlay.id != id);
        next
    }

    #[must_use]
    pub fn update_text(&self, id: &OverlayId, text: impl Into<String>) -> Self {
        let text = text.into();
        self.map_one(id, |overlay| overlay.text = text)
    }

    #[must_use]
    pub fn update_font_size(&self, id: &OverlayId, step: FontSizeStep) -> Self {
        self.map_one(id, |overlay| overlay.font_size = step.apply(overlay.font_size))
    }

    #[must_use]
    pub fn set_font_size(&self, id: &OverlayId, px: u32) -> Self {
        self.map_one(id, |overlay| overlay.font_size = clamp_font_size(px))
    }

    #[must_use]
    pub fn update_color(&self, id: &OverlayId, color: Rgba) -> Self {
        self.map_one(id, |overlay| overlay.color = color)
    }

    /// Negative coordinates are clamped to zero. The upper bound depends on
    /// the canvas and is applied by the session.
    #[must_use]
    pub fn update_position(&self, id: &OverlayId, position: Point) -> Self {
        self.map_one(id, |overlay| overlay.position = position.non_negative())
    }

    #[must_use]
    pub fn apply_patch(&self, id: &OverlayId, patch: &OverlayPatch) -> Self {
        let mut next = self.clone();
        if let Some(text) = &patch.text {
            next = next.update_text(id, text.clone());
        }
        if let Some(px) = patch.font_size {
            next = next.set_font_size(id, px);
        }
        if let Some(step) = patch.font_step {
            next = next.update_font_size(id, step);
        }
        if let Some(color) = patch.color {
            next = next.update_color(id, color);
        }
        if let Some(position) = patch.position {
            next = next.update_position(id, position);
        }
        next
    }

    fn map_one(&self, id: &OverlayId, f: impl FnOnce(&mut TextOverlay)) -> Self {
        let mut next = self.clone();
        if let Some(overlay) = next.overlays.iter_mut().find(|overlay| &overlay.id == id) {
            f(overlay);
        }
        next
    }

    fn free_sequence(&self) -> u64 {
        let mut sequence = self.next_sequence;
        while self.contains(&OverlayId::generated(sequence)) {
            sequence += 1;
        }
        sequence
    }

    fn allocate_id(&mut self) -> OverlayId {
        let sequence = self.free_sequence();
        self.next_sequence = sequence + 1;
        OverlayId::generated(sequence)
    }
}

impl<'a> IntoIterator for &'a OverlayCollection {
    type Item = &'a TextOverlay;
    type IntoIter = std::slice::Iter<'a, TextOverlay>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
