use crate::common::canvas::DiagramCanvas;

use super::erm_models::{Cardinality, ObjectKind};

/// Shape geometry and drawing for one diagram notation.
///
/// `area` is both the visual extent and the clickable box of a shape; the
/// editing surface never computes shape geometry on its own.
pub trait NotationStyle: Send + Sync {
    fn font_size(&self) -> f32;
    fn set_font_size(&mut self, size: f32);

    fn area(&self, kind: ObjectKind, center: egui::Pos2, zoom: f32) -> egui::Rect;

    fn draw_entity(
        &self,
        canvas: &mut dyn DiagramCanvas,
        center: egui::Pos2,
        zoom: f32,
        name: &str,
        selected: bool,
    );
    fn draw_attribute(
        &self,
        canvas: &mut dyn DiagramCanvas,
        center: egui::Pos2,
        zoom: f32,
        name: &str,
        primary: bool,
        selected: bool,
    );
    fn draw_relation(
        &self,
        canvas: &mut dyn DiagramCanvas,
        center: egui::Pos2,
        zoom: f32,
        name: &str,
        selected: bool,
    );
    fn draw_generalization(
        &self,
        canvas: &mut dyn DiagramCanvas,
        center: egui::Pos2,
        zoom: f32,
        selected: bool,
    );

    fn draw_line(&self, canvas: &mut dyn DiagramCanvas, points: &[egui::Pos2]);
    fn draw_cardinality_line(
        &self,
        canvas: &mut dyn DiagramCanvas,
        points: &[egui::Pos2],
        zoom: f32,
        cardinality: Cardinality,
    );
}

const FILL: egui::Color32 = egui::Color32::from_rgb(253, 254, 85);
const ATTRIBUTE_FILL: egui::Color32 = egui::Color32::from_rgb(254, 254, 166);
const SELECTED_FILL: egui::Color32 = egui::Color32::from_rgb(255, 190, 85);
const INK: egui::Color32 = egui::Color32::BLACK;

const SELECTED_WIDTH: f32 = 3.0;
const NORMAL_WIDTH: f32 = 1.0;

const ENTITY_SIZE: egui::Vec2 = egui::Vec2::new(200.0, 60.0);
const ATTRIBUTE_SIZE: egui::Vec2 = egui::Vec2::new(200.0, 30.0);
const GENERALIZATION_SIDE: f32 = 40.0;
const CARDINALITY_OFFSET: f32 = 20.0;

/// Chen notation: rectangles, ellipses, diamonds and an ISA triangle.
#[derive(Clone, Debug)]
pub struct ChenNotation {
    font_size: f32,
}

impl ChenNotation {
    pub fn new(font_size: f32) -> Self {
        Self { font_size }
    }

    fn style(selected: bool, normal: egui::Color32) -> (egui::Color32, egui::Stroke) {
        if selected {
            (SELECTED_FILL, egui::Stroke::new(SELECTED_WIDTH, INK))
        } else {
            (normal, egui::Stroke::new(NORMAL_WIDTH, INK))
        }
    }

    /// Half extents are whole pixels so shapes line up with the hit boxes.
    fn half_extent(size: egui::Vec2, zoom: f32) -> egui::Vec2 {
        egui::Vec2::new(
            (size.x * zoom / 2.0).trunc(),
            (size.y * zoom / 2.0).trunc(),
        )
    }

    fn generalization_half_extent(zoom: f32) -> egui::Vec2 {
        let half_side = GENERALIZATION_SIDE * zoom / 2.0;
        egui::Vec2::new(
            half_side.trunc(),
            (3.0f32.sqrt() / 2.0 * half_side).trunc(),
        )
    }
}

impl Default for ChenNotation {
    fn default() -> Self {
        Self::new(12.0)
    }
}

impl NotationStyle for ChenNotation {
    fn font_size(&self) -> f32 {
        self.font_size
    }

    fn set_font_size(&mut self, size: f32) {
        self.font_size = size;
    }

    fn area(&self, kind: ObjectKind, center: egui::Pos2, zoom: f32) -> egui::Rect {
        let half = match kind {
            ObjectKind::Entity | ObjectKind::Relation => Self::half_extent(ENTITY_SIZE, zoom),
            ObjectKind::Attribute => Self::half_extent(ATTRIBUTE_SIZE, zoom),
            ObjectKind::Generalization => Self::generalization_half_extent(zoom),
        };
        egui::Rect::from_min_max(center - half, center + half)
    }

    fn draw_entity(
        &self,
        canvas: &mut dyn DiagramCanvas,
        center: egui::Pos2,
        zoom: f32,
        name: &str,
        selected: bool,
    ) {
        let (fill, stroke) = Self::style(selected, FILL);
        canvas.draw_rectangle(
            self.area(ObjectKind::Entity, center, zoom),
            egui::CornerRadius::ZERO,
            fill,
            stroke,
        );
        if !name.is_empty() {
            canvas.draw_text(
                center,
                egui::Align2::CENTER_CENTER,
                name,
                self.font_size * zoom,
                INK,
            );
        }
    }

    fn draw_attribute(
        &self,
        canvas: &mut dyn DiagramCanvas,
        center: egui::Pos2,
        zoom: f32,
        name: &str,
        primary: bool,
        selected: bool,
    ) {
        let (fill, stroke) = Self::style(selected, ATTRIBUTE_FILL);
        canvas.draw_ellipse(
            center,
            Self::half_extent(ATTRIBUTE_SIZE, zoom),
            fill,
            stroke,
        );
        if name.is_empty() {
            return;
        }
        let font_size = self.font_size * zoom * 2.0 / 3.0;
        canvas.draw_text(center, egui::Align2::CENTER_CENTER, name, font_size, INK);
        if primary {
            let r = canvas.measure_text(center, egui::Align2::CENTER_CENTER, name, font_size);
            canvas.draw_line(
                [r.left_bottom(), r.right_bottom()],
                egui::Stroke::new(NORMAL_WIDTH, INK),
            );
        }
    }

    fn draw_relation(
        &self,
        canvas: &mut dyn DiagramCanvas,
        center: egui::Pos2,
        zoom: f32,
        name: &str,
        selected: bool,
    ) {
        let (fill, stroke) = Self::style(selected, FILL);
        let half = Self::half_extent(ENTITY_SIZE, zoom);
        canvas.draw_polygon(
            vec![
                center - egui::Vec2::new(0.0, half.y),
                center + egui::Vec2::new(half.x, 0.0),
                center + egui::Vec2::new(0.0, half.y),
                center - egui::Vec2::new(half.x, 0.0),
            ],
            fill,
            stroke,
        );
        if !name.is_empty() {
            canvas.draw_text(
                center,
                egui::Align2::CENTER_CENTER,
                name,
                self.font_size * zoom,
                INK,
            );
        }
    }

    fn draw_generalization(
        &self,
        canvas: &mut dyn DiagramCanvas,
        center: egui::Pos2,
        zoom: f32,
        selected: bool,
    ) {
        let (fill, stroke) = Self::style(selected, FILL);
        let half = Self::generalization_half_extent(zoom);
        canvas.draw_polygon(
            vec![
                center - egui::Vec2::new(0.0, half.y),
                center + half,
                center + egui::Vec2::new(-half.x, half.y),
            ],
            fill,
            stroke,
        );
    }

    fn draw_line(&self, canvas: &mut dyn DiagramCanvas, points: &[egui::Pos2]) {
        canvas.draw_polyline(points, egui::Stroke::new(NORMAL_WIDTH, INK));
    }

    fn draw_cardinality_line(
        &self,
        canvas: &mut dyn DiagramCanvas,
        points: &[egui::Pos2],
        zoom: f32,
        cardinality: Cardinality,
    ) {
        self.draw_line(canvas, points);
        let [begin, end, ..] = points else {
            return;
        };
        let mid = begin.lerp(*end, 0.5);
        let d = *end - *begin;
        let length = d.length();
        let label_at = if length > 0.0 {
            mid + egui::Vec2::new(-d.y, d.x) / length * CARDINALITY_OFFSET * zoom
        } else {
            mid
        };
        canvas.draw_text(
            label_at,
            egui::Align2::CENTER_CENTER,
            cardinality.label(),
            self.font_size * zoom,
            INK,
        );
    }
}
