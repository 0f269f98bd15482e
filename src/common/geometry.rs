use serde::{Deserialize, Serialize};

/// How far (in view pixels) a click may be from a waypoint to grab it.
pub const POINT_CLICK_DISTANCE: f32 = 25.0;
/// How far (in view pixels) a click may be from a segment to hit it.
pub const LINE_CLICK_DISTANCE: f32 = 30.0;
/// Largest coordinate magnitude a loaded document may use.
pub const MAX_COORDINATE: i32 = 1 << 24;

/// Position on the model plane. Model coordinates are whole units.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Add,
    derive_more::Sub,
    derive_more::AddAssign,
    derive_more::SubAssign,
    derive_more::Neg,
)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const ZERO: Self = Self { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn to_pos2(self) -> egui::Pos2 {
        egui::Pos2::new(self.x as f32, self.y as f32)
    }

    pub fn rounded(p: egui::Pos2) -> Self {
        Self::new(p.x.round() as i32, p.y.round() as i32)
    }

    /// Drops the fractional part, the way screen deltas become model deltas.
    pub fn truncated(v: egui::Vec2) -> Self {
        Self::new(v.x as i32, v.y as i32)
    }

    pub fn min(self, other: Self) -> Self {
        Self::new(self.x.min(other.x), self.y.min(other.y))
    }

    pub fn max(self, other: Self) -> Self {
        Self::new(self.x.max(other.x), self.y.max(other.y))
    }

    pub fn saturating_add(self, other: Self) -> Self {
        Self::new(self.x.saturating_add(other.x), self.y.saturating_add(other.y))
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        Self::new(self.x.saturating_sub(other.x), self.y.saturating_sub(other.y))
    }

    pub fn in_bounds(self) -> bool {
        self.x.abs() <= MAX_COORDINATE && self.y.abs() <= MAX_COORDINATE
    }

    /// Clamps both coordinates into `-MAX_COORDINATE..=MAX_COORDINATE`.
    pub fn clamped(self) -> Self {
        Self::new(
            self.x.clamp(-MAX_COORDINATE, MAX_COORDINATE),
            self.y.clamp(-MAX_COORDINATE, MAX_COORDINATE),
        )
    }
}

pub fn is_same_point(a: egui::Pos2, b: egui::Pos2, distance: f32) -> bool {
    a.distance(b) <= distance
}

/// Whether `p` lies on the segment `p1`..`p2`, within [`LINE_CLICK_DISTANCE`].
///
/// The projection parameter runs from 0 at `p1` to -1 at `p2`; anything
/// outside of that is off the segment regardless of distance.
pub fn is_on_line(p: egui::Pos2, p1: egui::Pos2, p2: egui::Pos2) -> bool {
    let a = p1 - p2;
    let length_sq = a.length_sq();
    if length_sq == 0.0 {
        return is_same_point(p, p1, LINE_CLICK_DISTANCE);
    }
    let t = a.dot(p - p1) / length_sq;
    if !(-1.0..=0.0).contains(&t) {
        return false;
    }
    let foot = p1 + a * t;
    is_same_point(foot, p, LINE_CLICK_DISTANCE)
}

/// Point containment with the border excluded.
pub fn strictly_contains(rect: egui::Rect, p: egui::Pos2) -> bool {
    rect.min.x < p.x && p.x < rect.max.x && rect.min.y < p.y && p.y < rect.max.y
}
