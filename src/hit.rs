//! Which element (and which part of it) is under a logical point.

use crate::font;
use crate::layout::{Element, LayoutModel, Position, Style};

/// Side of the square corner handle, logical units.
pub const HANDLE_SIZE: f32 = 24.0;
/// How far the handle pokes out past the element's bottom-right corner.
pub const HANDLE_OVERHANG: f32 = 6.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Bounds {
    pub fn contains(&self, p: Position) -> bool {
        p.x >= self.x && p.y >= self.y && p.x < self.x + self.w && p.y < self.y + self.h
    }

    pub fn center(&self) -> Position {
        Position::new(self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    /// The resize handle box, unrotated.
    pub fn handle(&self) -> Bounds {
        Bounds {
            x: self.x + self.w + HANDLE_OVERHANG - HANDLE_SIZE,
            y: self.y + self.h + HANDLE_OVERHANG - HANDLE_SIZE,
            w: HANDLE_SIZE,
            h: HANDLE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitPart {
    Body,
    ResizeHandle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub id: crate::layout::ElementId,
    pub part: HitPart,
}

/// Unrotated box of an element in logical units.
/// `image_aspect` is height/width of the referenced image, if known.
pub fn element_bounds(element: &Element, image_aspect: Option<f32>) -> Option<Bounds> {
    if !element.is_visible() {
        return None;
    }
    let Position { x, y } = element.position;
    let (w, h) = match &element.style {
        Style::Text(t) => {
            let text = element.content.as_deref().unwrap_or("");
            font::measure_text(text, t.font_size, t.line_height)
        }
        Style::Image(i) => (i.width, i.width * image_aspect.unwrap_or(1.0)),
        Style::Decoration(d) => (d.size, d.size),
    };
    Some(Bounds { x, y, w, h })
}

/// Rotate `p` by `-degrees` around `center`, i.e. into the element's own frame.
fn unrotate(p: Position, center: Position, degrees: f32) -> Position {
    if degrees == 0.0 {
        return p;
    }
    let (sin, cos) = (-degrees.to_radians()).sin_cos();
    let (dx, dy) = (p.x - center.x, p.y - center.y);
    Position::new(center.x + dx * cos - dy * sin, center.y + dx * sin + dy * cos)
}

/// Topmost element under `p`; its handle wins over its body.
pub fn hit_test<F>(model: &LayoutModel, p: Position, image_aspect: F) -> Option<Hit>
where
    F: Fn(&Element) -> Option<f32>,
{
    for element in model.paint_order().into_iter().rev() {
        let Some(bounds) = element_bounds(element, image_aspect(element)) else { continue };
        let local = unrotate(p, bounds.center(), element.style.rotation());
        if bounds.handle().contains(local) {
            return Some(Hit { id: element.id.clone(), part: HitPart::ResizeHandle });
        }
        if bounds.contains(local) {
            return Some(Hit { id: element.id.clone(), part: HitPart::Body });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{DecorationStyle, ElementId, ImageStyle};
    use crate::types::Color;

    fn square(id: &str, x: f32, y: f32, size: f32, z: i32) -> Element {
        Element {
            id: ElementId::from(id),
            content: Some("sun".into()),
            position: Position::new(x, y),
            z_index: z,
            style: Style::Decoration(DecorationStyle { size, color: Color::WHITE, opacity: 1.0, rotation: 0.0 }),
        }
    }

    #[test]
    fn topmost_element_wins() {
        let mut m = LayoutModel::new();
        m.insert(square("low", 0.0, 0.0, 100.0, 1));
        m.insert(square("high", 50.0, 50.0, 100.0, 5));
        let hit = hit_test(&m, Position::new(60.0, 60.0), |_| None).unwrap();
        assert_eq!(hit.id.as_str(), "high");
        assert_eq!(hit.part, HitPart::Body);
        let hit = hit_test(&m, Position::new(10.0, 10.0), |_| None).unwrap();
        assert_eq!(hit.id.as_str(), "low");
        assert!(hit_test(&m, Position::new(500.0, 500.0), |_| None).is_none());
    }

    #[test]
    fn corner_handle_overhangs_the_box() {
        let mut m = LayoutModel::new();
        m.insert(square("sun", 0.0, 0.0, 100.0, 1));
        let hit = hit_test(&m, Position::new(104.0, 104.0), |_| None).unwrap();
        assert_eq!(hit.part, HitPart::ResizeHandle);
        let hit = hit_test(&m, Position::new(90.0, 90.0), |_| None).unwrap();
        assert_eq!(hit.part, HitPart::ResizeHandle);
        let hit = hit_test(&m, Position::new(50.0, 50.0), |_| None).unwrap();
        assert_eq!(hit.part, HitPart::Body);
    }

    #[test]
    fn empty_logo_is_not_grabbable_and_aspect_sets_height() {
        let mut logo = Element {
            id: ElementId::from("logo"),
            content: None,
            position: Position::new(0.0, 0.0),
            z_index: 1,
            style: Style::Image(ImageStyle { width: 200.0, rotation: 0.0 }),
        };
        assert!(element_bounds(&logo, Some(0.5)).is_none());
        logo.content = Some("logo.png".into());
        let b = element_bounds(&logo, Some(0.5)).unwrap();
        assert_eq!((b.w, b.h), (200.0, 100.0));
    }

    #[test]
    fn rotated_element_is_hit_in_its_own_frame() {
        let mut m = LayoutModel::new();
        let mut el = square("sun", 0.0, 0.0, 100.0, 1);
        if let Style::Decoration(d) = &mut el.style {
            d.rotation = 180.0;
        }
        m.insert(el);
        // bottom-right handle now sits at the top-left on screen
        let hit = hit_test(&m, Position::new(2.0, 2.0), |_| None).unwrap();
        assert_eq!(hit.part, HitPart::ResizeHandle);
    }
}
