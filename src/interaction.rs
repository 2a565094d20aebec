//! Pointer gestures -> layout mutations.
//!
//! One optional [`Gesture`] is the whole state machine: `None` is idle, a
//! move gesture is dragging, a resize gesture is resizing. A new gesture can
//! only start from idle, so at most one is ever active.

use crate::error::LayoutError;
use crate::hit::{Hit, HitPart};
use crate::layout::{ElementId, ElementPatch, LayoutModel, POSTER_HEIGHT, POSTER_WIDTH, Position, ResizeAxis};
use crate::viewport::ScreenPoint;

/// Resize never goes below this many logical units.
pub const MIN_SIZE_SCALAR: f32 = 10.0;

/// What dragging does at the canvas edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoundsPolicy {
    /// Elements may leave the canvas entirely.
    #[default]
    Free,
    /// The element's origin stays on the canvas.
    Clamped,
}

impl BoundsPolicy {
    fn apply(self, p: Position) -> Position {
        match self {
            BoundsPolicy::Free => p,
            BoundsPolicy::Clamped => Position::new(
                p.x.clamp(0.0, POSTER_WIDTH as f32),
                p.y.clamp(0.0, POSTER_HEIGHT as f32),
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureKind {
    Move { origin: Position },
    Resize { axis: ResizeAxis, origin_value: f32 },
}

/// One drag or resize, from pointer-down to pointer-up.
#[derive(Debug, Clone, PartialEq)]
pub struct Gesture {
    pub target: ElementId,
    pub origin_pointer: ScreenPoint,
    pub kind: GestureKind,
}

/// Read-only view of the state machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InteractionState<'a> {
    Idle,
    Dragging(&'a ElementId),
    Resizing(&'a ElementId, ResizeAxis),
}

#[derive(Debug, Default)]
pub struct InteractionController {
    gesture: Option<Gesture>,
    policy: BoundsPolicy,
}

impl InteractionController {
    pub fn new(policy: BoundsPolicy) -> Self {
        Self { gesture: None, policy }
    }

    pub fn state(&self) -> InteractionState<'_> {
        match &self.gesture {
            None => InteractionState::Idle,
            Some(Gesture { target, kind: GestureKind::Move { .. }, .. }) => InteractionState::Dragging(target),
            Some(Gesture { target, kind: GestureKind::Resize { axis, .. }, .. }) => {
                InteractionState::Resizing(target, *axis)
            }
        }
    }

    pub fn gesture(&self) -> Option<&Gesture> {
        self.gesture.as_ref()
    }

    /// Start a gesture on `hit`. Ignored (returns false) while another gesture
    /// owns the pointer or if the element is gone.
    pub fn pointer_down(&mut self, model: &LayoutModel, hit: &Hit, at: ScreenPoint) -> bool {
        if self.gesture.is_some() {
            tracing::trace!(target_id = %hit.id, "pointer-down ignored, gesture in progress");
            return false;
        }
        let Some(element) = model.get(&hit.id) else {
            return false;
        };
        let kind = match hit.part {
            HitPart::Body => GestureKind::Move { origin: element.position },
            HitPart::ResizeHandle => GestureKind::Resize {
                axis: element.style.resize_axis(),
                origin_value: element.style.size_scalar(),
            },
        };
        tracing::debug!(target_id = %hit.id, ?kind, "gesture started");
        self.gesture = Some(Gesture { target: hit.id.clone(), origin_pointer: at, kind });
        true
    }

    /// Apply the pointer's current screen position. Returns the mutated id, if any.
    pub fn pointer_move(
        &mut self,
        model: &mut LayoutModel,
        at: ScreenPoint,
        scale: f32,
    ) -> Result<Option<ElementId>, LayoutError> {
        let Some(gesture) = &self.gesture else {
            return Ok(None);
        };
        let dx = (at.x - gesture.origin_pointer.x) / scale;
        let dy = (at.y - gesture.origin_pointer.y) / scale;

        let patch = match gesture.kind {
            GestureKind::Move { origin } => {
                ElementPatch::position(self.policy.apply(Position::new(origin.x + dx, origin.y + dy)))
            }
            GestureKind::Resize { origin_value, .. } => {
                // the single corner handle collapses the drag onto the horizontal axis
                let value = (origin_value + dx).max(MIN_SIZE_SCALAR);
                let element = model
                    .get(&gesture.target)
                    .ok_or_else(|| LayoutError::UnknownElement(gesture.target.to_string()))?;
                ElementPatch::style(element.style.size_patch(value))
            }
        };
        model.update(&gesture.target, patch)?;
        Ok(Some(gesture.target.clone()))
    }

    /// End whatever gesture is active and hand it back.
    pub fn pointer_up(&mut self) -> Option<Gesture> {
        let ended = self.gesture.take();
        if let Some(g) = &ended {
            tracing::debug!(target_id = %g.target, "gesture ended");
        }
        ended
    }
}
