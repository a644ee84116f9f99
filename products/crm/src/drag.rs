//! Drag-and-drop geometry and the drag state machine.
//!
//! Columns and cards register their on-screen rectangles in a [`DropLayout`].
//! While a card is dragged its translated rectangle is compared against every
//! registered zone with the closest-corners rule; the winning zone becomes
//! the drop target.

use uuid::Uuid;

use crate::model::{Deal, Stage};

/// Pointer travel needed before a press turns into a drag.
pub const ACTIVATION_DISTANCE: f64 = 5.0;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Top-left, top-right, bottom-left, bottom-right.
    pub fn corners(&self) -> [Point; 4] {
        [
            Point::new(self.x, self.y),
            Point::new(self.right(), self.y),
            Point::new(self.x, self.bottom()),
            Point::new(self.right(), self.bottom()),
        ]
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.right() && p.y >= self.y && p.y <= self.bottom()
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    pub fn translated(&self, dx: f64, dy: f64) -> Rect {
        Rect::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    pub fn moved_to(&self, origin: Point) -> Rect {
        Rect::new(origin.x, origin.y, self.width, self.height)
    }

    fn corner_distance(&self, other: &Rect) -> f64 {
        self.corners()
            .iter()
            .zip(other.corners().iter())
            .map(|(a, b)| a.distance(*b))
            .sum::<f64>()
            / 4.0
    }
}

/// Something a card can be dropped on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DropTarget {
    Stage(Uuid),
    Deal(Uuid),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DropZone {
    pub target: DropTarget,
    pub rect: Rect,
}

/// Registered drop zones in registration order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DropLayout {
    zones: Vec<DropZone>,
}

impl DropLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or moves a zone. Re-registering keeps the original slot so
    /// tie-breaking stays stable.
    pub fn register(&mut self, target: DropTarget, rect: Rect) {
        match self.zones.iter_mut().find(|z| z.target == target) {
            Some(zone) => zone.rect = rect,
            None => self.zones.push(DropZone { target, rect }),
        }
    }

    pub fn zones(&self) -> &[DropZone] {
        &self.zones
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn rect_of(&self, target: DropTarget) -> Option<Rect> {
        self.zones
            .iter()
            .find(|z| z.target == target)
            .map(|z| z.rect)
    }

    /// Closest-corners collision.
    ///
    /// Zones are candidates when they overlap `dragged` or contain `pointer`.
    /// The candidate with the smallest mean distance between matching
    /// corners wins; ties go to the zone registered first. No candidate means
    /// the card is over empty space.
    pub fn closest_corners(&self, dragged: Rect, pointer: Option<Point>) -> Option<DropTarget> {
        self.zones
            .iter()
            .enumerate()
            .filter(|(_, z)| {
                z.rect.intersects(&dragged) || pointer.is_some_and(|p| z.rect.contains(p))
            })
            .map(|(slot, z)| (z.rect.corner_distance(&dragged), slot, z.target))
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
            .map(|(_, _, target)| target)
    }

    /// Nearest zone whose centre lies in `direction` from `from`.
    fn step(&self, from: Point, direction: Direction) -> Option<&DropZone> {
        const MIN_TRAVEL: f64 = 1.0;
        self.zones
            .iter()
            .filter(|z| {
                let c = z.rect.center();
                match direction {
                    Direction::Left => c.x < from.x - MIN_TRAVEL,
                    Direction::Right => c.x > from.x + MIN_TRAVEL,
                    Direction::Up => {
                        c.y < from.y - MIN_TRAVEL && from.x >= z.rect.x && from.x <= z.rect.right()
                    }
                    Direction::Down => {
                        c.y > from.y + MIN_TRAVEL && from.x >= z.rect.x && from.x <= z.rect.right()
                    }
                }
            })
            .enumerate()
            .min_by(|(ia, a), (ib, b)| {
                a.rect
                    .center()
                    .distance(from)
                    .total_cmp(&b.rect.center().distance(from))
                    .then(ia.cmp(ib))
            })
            .map(|(_, z)| z)
    }
}

/// Which stage a drop resolves to.
///
/// Dropping on a column means that column; dropping on a card means the
/// card's column. Unknown targets resolve to nothing.
pub fn resolve_target_stage(target: DropTarget, deals: &[Deal], stages: &[Stage]) -> Option<Uuid> {
    let stage_id = match target {
        DropTarget::Stage(stage_id) => stage_id,
        DropTarget::Deal(deal_id) => deals.iter().find(|d| d.id == deal_id)?.stage_id?,
    };
    stages.iter().any(|s| s.id == stage_id).then_some(stage_id)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DragInput {
    Pointer,
    Keyboard,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ActiveDrag {
    /// Snapshot of the card as it was when the drag started.
    pub deal: Deal,
    pub input: DragInput,
    pub origin: Point,
    pub initial_rect: Rect,
    pub rect: Rect,
    pub over: Option<DropTarget>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum DragState {
    #[default]
    Idle,
    Pressed {
        deal_id: Uuid,
        origin: Point,
    },
    Dragging(ActiveDrag),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Gesture {
    PointerDown { deal_id: Uuid, at: Point },
    PointerMove { at: Point },
    PointerUp { at: Point },
    KeyPickUp { deal_id: Uuid },
    KeyMove(Direction),
    KeyDrop,
    Cancel,
}

#[derive(Clone, Debug, PartialEq)]
pub enum DragSignal {
    None,
    Started(Uuid),
    Over(Option<DropTarget>),
    Dropped {
        deal: Deal,
        target: Option<DropTarget>,
    },
    Cancelled,
}

#[derive(Debug)]
pub struct DragController {
    state: DragState,
    activation_distance: f64,
}

impl Default for DragController {
    fn default() -> Self {
        Self {
            state: DragState::Idle,
            activation_distance: ACTIVATION_DISTANCE,
        }
    }
}

impl DragController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    pub fn active(&self) -> Option<&ActiveDrag> {
        match &self.state {
            DragState::Dragging(drag) => Some(drag),
            _ => None,
        }
    }

    pub fn handle(&mut self, gesture: Gesture, deals: &[Deal], layout: &DropLayout) -> DragSignal {
        let state = std::mem::take(&mut self.state);
        let (next, signal) = match (state, gesture) {
            (DragState::Idle, Gesture::PointerDown { deal_id, at }) => (
                DragState::Pressed {
                    deal_id,
                    origin: at,
                },
                DragSignal::None,
            ),
            (DragState::Pressed { deal_id, origin }, Gesture::PointerMove { at }) => {
                if origin.distance(at) < self.activation_distance {
                    (DragState::Pressed { deal_id, origin }, DragSignal::None)
                } else {
                    match begin(deal_id, DragInput::Pointer, origin, deals, layout) {
                        Some(mut drag) => {
                            drag.rect = drag.initial_rect.translated(at.x - origin.x, at.y - origin.y);
                            drag.over = layout.closest_corners(drag.rect, Some(at));
                            (DragState::Dragging(drag), DragSignal::Started(deal_id))
                        }
                        None => (DragState::Idle, DragSignal::None),
                    }
                }
            }
            (DragState::Pressed { .. }, Gesture::PointerUp { .. } | Gesture::Cancel) => {
                (DragState::Idle, DragSignal::None)
            }
            (DragState::Dragging(mut drag), Gesture::PointerMove { at })
                if drag.input == DragInput::Pointer =>
            {
                let over = track(&mut drag, at, layout);
                let signal = if over != drag.over {
                    DragSignal::Over(over)
                } else {
                    DragSignal::None
                };
                drag.over = over;
                (DragState::Dragging(drag), signal)
            }
            (DragState::Dragging(mut drag), Gesture::PointerUp { at })
                if drag.input == DragInput::Pointer =>
            {
                let target = track(&mut drag, at, layout);
                (
                    DragState::Idle,
                    DragSignal::Dropped {
                        deal: drag.deal,
                        target,
                    },
                )
            }
            (DragState::Idle, Gesture::KeyPickUp { deal_id }) => {
                match begin(deal_id, DragInput::Keyboard, Point::default(), deals, layout) {
                    Some(mut drag) => {
                        drag.origin = drag.rect.center();
                        drag.over = layout.closest_corners(drag.rect, Some(drag.origin));
                        (DragState::Dragging(drag), DragSignal::Started(deal_id))
                    }
                    None => (DragState::Idle, DragSignal::None),
                }
            }
            (DragState::Dragging(mut drag), Gesture::KeyMove(direction))
                if drag.input == DragInput::Keyboard =>
            {
                match layout.step(drag.rect.center(), direction) {
                    Some(zone) => {
                        drag.rect = drag.rect.moved_to(zone.rect.origin());
                        let over = layout.closest_corners(drag.rect, Some(drag.rect.center()));
                        let signal = if over != drag.over {
                            DragSignal::Over(over)
                        } else {
                            DragSignal::None
                        };
                        drag.over = over;
                        (DragState::Dragging(drag), signal)
                    }
                    None => (DragState::Dragging(drag), DragSignal::None),
                }
            }
            (DragState::Dragging(drag), Gesture::KeyDrop) if drag.input == DragInput::Keyboard => (
                DragState::Idle,
                DragSignal::Dropped {
                    target: drag.over,
                    deal: drag.deal,
                },
            ),
            (DragState::Dragging(_), Gesture::Cancel) => (DragState::Idle, DragSignal::Cancelled),
            (state, _) => (state, DragSignal::None),
        };
        self.state = next;
        signal
    }
}

fn begin(
    deal_id: Uuid,
    input: DragInput,
    origin: Point,
    deals: &[Deal],
    layout: &DropLayout,
) -> Option<ActiveDrag> {
    let deal = deals.iter().find(|d| d.id == deal_id)?.clone();
    let initial_rect = layout
        .rect_of(DropTarget::Deal(deal_id))
        .unwrap_or_else(|| Rect::new(origin.x, origin.y, 0.0, 0.0));
    Some(ActiveDrag {
        deal,
        input,
        origin,
        initial_rect,
        rect: initial_rect,
        over: None,
    })
}

fn track(drag: &mut ActiveDrag, at: Point, layout: &DropLayout) -> Option<DropTarget> {
    drag.rect = drag
        .initial_rect
        .translated(at.x - drag.origin.x, at.y - drag.origin.y);
    layout.closest_corners(drag.rect, Some(at))
}
