use std::fmt::Write as _;

/// Average glyph advance relative to the font size, used where no font
/// backend is available to measure text.
const AVERAGE_GLYPH_WIDTH: f32 = 0.6;
const LINE_HEIGHT: f32 = 1.2;

/// Estimates the rectangle a text would cover without laying it out.
pub fn approximate_text_rect(
    position: egui::Pos2,
    anchor: egui::Align2,
    text: &str,
    font_size: f32,
) -> egui::Rect {
    let lines = text.split('\n');
    let (count, longest) = lines.fold((0usize, 0usize), |(c, l), e| {
        (c + 1, l.max(e.chars().count()))
    });
    let size = egui::Vec2::new(
        longest as f32 * font_size * AVERAGE_GLYPH_WIDTH,
        count as f32 * font_size * LINE_HEIGHT,
    );
    anchor.anchor_size(position, size)
}

/// Drawing target for diagrams. All coordinates are in view space.
pub trait DiagramCanvas {
    fn draw_line(&mut self, points: [egui::Pos2; 2], stroke: egui::Stroke);
    fn draw_polyline(&mut self, points: &[egui::Pos2], stroke: egui::Stroke) {
        for w in points.windows(2) {
            self.draw_line([w[0], w[1]], stroke);
        }
    }
    fn draw_rectangle(
        &mut self,
        rect: egui::Rect,
        corner_radius: egui::CornerRadius,
        color: egui::Color32,
        stroke: egui::Stroke,
    );
    fn draw_ellipse(
        &mut self,
        position: egui::Pos2,
        radius: egui::Vec2,
        color: egui::Color32,
        stroke: egui::Stroke,
    );
    fn draw_polygon(
        &mut self,
        vertices: Vec<egui::Pos2>,
        color: egui::Color32,
        stroke: egui::Stroke,
    );

    fn measure_text(
        &mut self,
        position: egui::Pos2,
        anchor: egui::Align2,
        text: &str,
        font_size: f32,
    ) -> egui::Rect;
    fn draw_text(
        &mut self,
        position: egui::Pos2,
        anchor: egui::Align2,
        text: &str,
        font_size: f32,
        text_color: egui::Color32,
    );
}

/// Accumulates the bounds of everything drawn on it.
pub struct MeasuringCanvas {
    bounds: egui::Rect,
}

impl MeasuringCanvas {
    pub fn new() -> Self {
        Self {
            bounds: egui::Rect::NOTHING,
        }
    }

    pub fn bounds(&self) -> egui::Rect {
        self.bounds
    }
}

impl Default for MeasuringCanvas {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagramCanvas for MeasuringCanvas {
    fn draw_line(&mut self, points: [egui::Pos2; 2], _stroke: egui::Stroke) {
        self.bounds.extend_with(points[0]);
        self.bounds.extend_with(points[1]);
    }

    fn draw_rectangle(
        &mut self,
        rect: egui::Rect,
        _corner_radius: egui::CornerRadius,
        _color: egui::Color32,
        _stroke: egui::Stroke,
    ) {
        self.bounds = self.bounds.union(rect);
    }

    fn draw_ellipse(
        &mut self,
        position: egui::Pos2,
        radius: egui::Vec2,
        _color: egui::Color32,
        _stroke: egui::Stroke,
    ) {
        let rect = egui::Rect::from_center_size(position, 2.0 * radius);
        self.bounds = self.bounds.union(rect);
    }

    fn draw_polygon(
        &mut self,
        vertices: Vec<egui::Pos2>,
        _color: egui::Color32,
        _stroke: egui::Stroke,
    ) {
        for p in vertices {
            self.bounds.extend_with(p);
        }
    }

    fn measure_text(
        &mut self,
        position: egui::Pos2,
        anchor: egui::Align2,
        text: &str,
        font_size: f32,
    ) -> egui::Rect {
        approximate_text_rect(position, anchor, text, font_size)
    }
    fn draw_text(
        &mut self,
        position: egui::Pos2,
        anchor: egui::Align2,
        text: &str,
        font_size: f32,
        _text_color: egui::Color32,
    ) {
        let rect = self.measure_text(position, anchor, text, font_size);
        self.bounds = self.bounds.union(rect);
    }
}

/// Renders into an SVG document.
pub struct SvgCanvas {
    camera_offset: egui::Vec2,
    export_size: egui::Vec2,
    element_buffer: Vec<String>,
}

impl SvgCanvas {
    pub fn new(offset: egui::Vec2, size: egui::Vec2) -> Self {
        Self {
            camera_offset: offset,
            export_size: size,
            element_buffer: Vec::new(),
        }
    }

    pub fn element_count(&self) -> usize {
        self.element_buffer.len()
    }

    pub fn finish(&self) -> String {
        let mut out = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<svg width="{}" height="{}" xmlns="http://www.w3.org/2000/svg">
"#,
            self.export_size.x, self.export_size.y
        );
        for e in &self.element_buffer {
            out += e;
        }
        out += "</svg>\n";
        out
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        std::fs::write(path, self.finish())
    }

    fn x(&self, x: f32) -> f32 {
        x + self.camera_offset.x
    }
    fn y(&self, y: f32) -> f32 {
        y + self.camera_offset.y
    }
}

impl DiagramCanvas for SvgCanvas {
    fn draw_line(&mut self, points: [egui::Pos2; 2], stroke: egui::Stroke) {
        self.element_buffer.push(format!(
            r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="{}"/>
"#,
            self.x(points[0].x),
            self.y(points[0].y),
            self.x(points[1].x),
            self.y(points[1].y),
            stroke.color.to_hex(),
            stroke.width,
        ));
    }

    fn draw_polyline(&mut self, points: &[egui::Pos2], stroke: egui::Stroke) {
        let mut polyline_points = String::new();
        for p in points {
            let _ = write!(polyline_points, "{},{} ", self.x(p.x), self.y(p.y));
        }
        self.element_buffer.push(format!(
            r#"<polyline points="{}" fill="none" stroke="{}" stroke-width="{}"/>
"#,
            polyline_points.trim_end(),
            stroke.color.to_hex(),
            stroke.width,
        ));
    }

    fn draw_rectangle(
        &mut self,
        rect: egui::Rect,
        _corner_radius: egui::CornerRadius,
        color: egui::Color32,
        stroke: egui::Stroke,
    ) {
        let top_left = rect.left_top();
        self.element_buffer.push(format!(
            r#"<rect x="{}" y="{}" width="{}" height="{}" fill="{}" stroke="{}" stroke-width="{}"/>
"#,
            self.x(top_left.x),
            self.y(top_left.y),
            rect.width(),
            rect.height(),
            color.to_hex(),
            stroke.color.to_hex(),
            stroke.width,
        ));
    }

    fn draw_ellipse(
        &mut self,
        position: egui::Pos2,
        radius: egui::Vec2,
        color: egui::Color32,
        stroke: egui::Stroke,
    ) {
        self.element_buffer.push(format!(
            r#"<ellipse cx="{}" cy="{}" rx="{}" ry="{}" fill="{}" stroke="{}" stroke-width="{}"/>
"#,
            self.x(position.x),
            self.y(position.y),
            radius.x,
            radius.y,
            color.to_hex(),
            stroke.color.to_hex(),
            stroke.width,
        ));
    }

    fn draw_polygon(
        &mut self,
        vertices: Vec<egui::Pos2>,
        color: egui::Color32,
        stroke: egui::Stroke,
    ) {
        let polygon_points = vertices
            .iter()
            .map(|p| format!("{},{}", self.x(p.x), self.y(p.y)))
            .collect::<Vec<_>>()
            .join(" ");
        self.element_buffer.push(format!(
            r#"<polygon points="{}" fill="{}" stroke="{}" stroke-width="{}"/>
"#,
            polygon_points,
            color.to_hex(),
            stroke.color.to_hex(),
            stroke.width,
        ));
    }

    fn measure_text(
        &mut self,
        position: egui::Pos2,
        anchor: egui::Align2,
        text: &str,
        font_size: f32,
    ) -> egui::Rect {
        approximate_text_rect(position, anchor, text, font_size)
    }
    fn draw_text(
        &mut self,
        position: egui::Pos2,
        anchor: egui::Align2,
        text: &str,
        font_size: f32,
        text_color: egui::Color32,
    ) {
        let rect = self.measure_text(position, anchor, text, font_size);
        let escaped = quick_xml::escape::escape(text);
        self.element_buffer.push(format!(
            r#"<text x="{}" y="{}" font-size="{}" fill="{}" text-anchor="middle" dominant-baseline="middle">{}</text>
"#,
            self.x(rect.center().x),
            self.y(rect.center().y),
            font_size,
            text_color.to_hex(),
            escaped
        ));
    }
}
