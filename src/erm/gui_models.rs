use std::collections::BTreeMap;

use crate::common::command::{Command, Reversible};
use crate::common::geometry::{self, Point};
use crate::common::uuid::{LineUuid, NodeUuid};

use super::erm_controllers::GuiModel;
use super::erm_models::{ErmEdit, ErmError, ObjectKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GuiObject {
    pub kind: ObjectKind,
    pub position: Point,
}

/// Presentation of an edge. Only the interior waypoints are stored, the
/// endpoints are the live positions of `origin` and `destination`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuiLine {
    pub origin: NodeUuid,
    pub destination: NodeUuid,
    waypoints: Vec<Point>,
}

impl GuiLine {
    pub fn new(origin: NodeUuid, destination: NodeUuid) -> Self {
        Self {
            origin,
            destination,
            waypoints: Vec::new(),
        }
    }

    pub fn with_waypoints(self, waypoints: Vec<Point>) -> Self {
        Self { waypoints, ..self }
    }

    pub fn waypoints(&self) -> &[Point] {
        &self.waypoints
    }
}

/// Point indices count the origin endpoint as 0, so waypoints are `1..=n`.
#[derive(Clone, Debug)]
pub enum GuiEdit {
    InsertObject {
        uuid: NodeUuid,
        object: GuiObject,
    },
    RemoveObject {
        uuid: NodeUuid,
        object: GuiObject,
    },
    InsertLine {
        uuid: LineUuid,
        line: GuiLine,
    },
    RemoveLine {
        uuid: LineUuid,
        line: GuiLine,
    },
    ShiftObject {
        uuid: NodeUuid,
        delta: Point,
    },
    InsertPoint {
        line: LineUuid,
        index: usize,
        point: Point,
    },
    RemovePoint {
        line: LineUuid,
        index: usize,
        point: Point,
    },
    SetPoint {
        line: LineUuid,
        index: usize,
        before: Point,
        after: Point,
    },
    ShiftPoints {
        line: LineUuid,
        delta: Point,
    },
}

pub type GuiCommand = Command<GuiEdit>;

/// Positions and waypoints, keyed like the semantic graph.
#[derive(Clone, Debug, Default)]
pub struct GuiGraph {
    objects: BTreeMap<NodeUuid, GuiObject>,
    lines: BTreeMap<LineUuid, GuiLine>,
}

impl GuiGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object(&self, uuid: &NodeUuid) -> Option<&GuiObject> {
        self.objects.get(uuid)
    }
    pub fn position(&self, uuid: &NodeUuid) -> Option<Point> {
        self.objects.get(uuid).map(|o| o.position)
    }
    pub fn line(&self, uuid: &LineUuid) -> Option<&GuiLine> {
        self.lines.get(uuid)
    }
    pub fn objects(&self) -> impl Iterator<Item = (&NodeUuid, &GuiObject)> {
        self.objects.iter()
    }
    pub fn lines(&self) -> impl Iterator<Item = (&LineUuid, &GuiLine)> {
        self.lines.iter()
    }

    /// Full point list of a line, endpoints included.
    pub fn points(&self, uuid: &LineUuid) -> Option<Vec<Point>> {
        let line = self.lines.get(uuid)?;
        let start = self.position(&line.origin)?;
        let end = self.position(&line.destination)?;
        let mut points = Vec::with_capacity(line.waypoints.len() + 2);
        points.push(start);
        points.extend_from_slice(&line.waypoints);
        points.push(end);
        Some(points)
    }

    fn apply(&mut self, edit: GuiEdit) -> GuiCommand {
        edit.redo(self);
        Command::Edit(edit)
    }

    pub fn insert_object(&mut self, uuid: NodeUuid, kind: ObjectKind, position: Point) -> GuiCommand {
        self.apply(GuiEdit::InsertObject {
            uuid,
            object: GuiObject { kind, position },
        })
    }

    pub fn remove_object(&mut self, uuid: &NodeUuid) -> Option<GuiCommand> {
        let object = *self.objects.get(uuid)?;
        Some(self.apply(GuiEdit::RemoveObject { uuid: *uuid, object }))
    }

    pub fn insert_line(&mut self, uuid: LineUuid, line: GuiLine) -> GuiCommand {
        self.apply(GuiEdit::InsertLine { uuid, line })
    }

    pub fn remove_line(&mut self, uuid: &LineUuid) -> Option<GuiCommand> {
        let line = self.lines.get(uuid)?.clone();
        Some(self.apply(GuiEdit::RemoveLine { uuid: *uuid, line }))
    }

    pub fn shift_object(&mut self, uuid: &NodeUuid, delta: Point) -> GuiCommand {
        self.apply(GuiEdit::ShiftObject { uuid: *uuid, delta })
    }

    fn waypoint_count(&self, line: &LineUuid) -> Result<usize, ErmError> {
        self.lines
            .get(line)
            .map(|l| l.waypoints.len())
            .ok_or(ErmError::UnknownLine(*line))
    }

    /// Inserts before the point currently at `index`; `index` may be one past
    /// the last waypoint, i.e. the destination endpoint.
    pub fn insert_point(&mut self, line: &LineUuid, index: usize, point: Point) -> Result<GuiCommand, ErmError> {
        let n = self.waypoint_count(line)?;
        if index == 0 || index > n + 1 {
            return Err(ErmError::NoSuchPoint { line: *line, index });
        }
        Ok(self.apply(GuiEdit::InsertPoint {
            line: *line,
            index,
            point,
        }))
    }

    pub fn remove_point(&mut self, line: &LineUuid, index: usize) -> Result<GuiCommand, ErmError> {
        let n = self.waypoint_count(line)?;
        if index == 0 || index > n {
            return Err(ErmError::NoSuchPoint { line: *line, index });
        }
        let point = self.lines[line].waypoints[index - 1];
        Ok(self.apply(GuiEdit::RemovePoint {
            line: *line,
            index,
            point,
        }))
    }

    pub fn set_point(&mut self, line: &LineUuid, index: usize, point: Point) -> Result<GuiCommand, ErmError> {
        let n = self.waypoint_count(line)?;
        if index == 0 || index > n {
            return Err(ErmError::NoSuchPoint { line: *line, index });
        }
        let before = self.lines[line].waypoints[index - 1];
        Ok(self.apply(GuiEdit::SetPoint {
            line: *line,
            index,
            before,
            after: point,
        }))
    }

    /// Moves the waypoints only; endpoints follow their objects anyway.
    pub fn shift_points(&mut self, line: &LineUuid, delta: Point) -> Option<GuiCommand> {
        if self.lines.get(line)?.waypoints.is_empty() {
            return None;
        }
        Some(self.apply(GuiEdit::ShiftPoints { line: *line, delta }))
    }

    /// Drops the first waypoint if it lies on the segment between its
    /// neighbours, otherwise the last one under the same condition.
    pub fn check_end_points(&mut self, line: &LineUuid) -> Option<GuiCommand> {
        let points: Vec<egui::Pos2> = self
            .points(line)?
            .into_iter()
            .map(Point::to_pos2)
            .collect();
        let n = points.len();
        let index = if n > 2 && geometry::is_on_line(points[1], points[0], points[2]) {
            1
        } else if n > 3 && geometry::is_on_line(points[n - 2], points[n - 3], points[n - 1]) {
            n - 2
        } else {
            return None;
        };
        self.remove_point(line, index).ok()
    }
}

impl Reversible for GuiEdit {
    type Target = GuiGraph;

    fn redo(&self, graph: &mut GuiGraph) {
        match self {
            GuiEdit::InsertObject { uuid, object } => {
                graph.objects.insert(*uuid, *object);
            }
            GuiEdit::RemoveObject { uuid, .. } => {
                graph.objects.remove(uuid);
            }
            GuiEdit::InsertLine { uuid, line } => {
                graph.lines.insert(*uuid, line.clone());
            }
            GuiEdit::RemoveLine { uuid, .. } => {
                graph.lines.remove(uuid);
            }
            GuiEdit::ShiftObject { uuid, delta } => {
                if let Some(o) = graph.objects.get_mut(uuid) {
                    o.position = o.position.saturating_add(*delta);
                }
            }
            GuiEdit::InsertPoint { line, index, point } => {
                if let Some(l) = graph.lines.get_mut(line) {
                    l.waypoints.insert(index - 1, *point);
                }
            }
            GuiEdit::RemovePoint { line, index, .. } => {
                if let Some(l) = graph.lines.get_mut(line) {
                    l.waypoints.remove(index - 1);
                }
            }
            GuiEdit::SetPoint {
                line, index, after, ..
            } => {
                if let Some(l) = graph.lines.get_mut(line) {
                    l.waypoints[index - 1] = *after;
                }
            }
            GuiEdit::ShiftPoints { line, delta } => {
                if let Some(l) = graph.lines.get_mut(line) {
                    for p in l.waypoints.iter_mut() {
                        *p = p.saturating_add(*delta);
                    }
                }
            }
        }
    }

    fn undo(&self, graph: &mut GuiGraph) {
        match self {
            GuiEdit::InsertObject { uuid, .. } => {
                graph.objects.remove(uuid);
            }
            GuiEdit::RemoveObject { uuid, object } => {
                graph.objects.insert(*uuid, *object);
            }
            GuiEdit::InsertLine { uuid, .. } => {
                graph.lines.remove(uuid);
            }
            GuiEdit::RemoveLine { uuid, line } => {
                graph.lines.insert(*uuid, line.clone());
            }
            GuiEdit::ShiftObject { uuid, delta } => {
                if let Some(o) = graph.objects.get_mut(uuid) {
                    o.position = o.position.saturating_sub(*delta);
                }
            }
            GuiEdit::InsertPoint { line, index, .. } => {
                if let Some(l) = graph.lines.get_mut(line) {
                    l.waypoints.remove(index - 1);
                }
            }
            GuiEdit::RemovePoint { line, index, point } => {
                if let Some(l) = graph.lines.get_mut(line) {
                    l.waypoints.insert(index - 1, *point);
                }
            }
            GuiEdit::SetPoint {
                line, index, before, ..
            } => {
                if let Some(l) = graph.lines.get_mut(line) {
                    l.waypoints[index - 1] = *before;
                }
            }
            GuiEdit::ShiftPoints { line, delta } => {
                if let Some(l) = graph.lines.get_mut(line) {
                    for p in l.waypoints.iter_mut() {
                        *p = p.saturating_sub(*delta);
                    }
                }
            }
        }
    }
}

/// One step on either layer of a diagram.
#[derive(Clone, Debug, derive_more::From)]
pub enum DiagramEdit {
    Erm(ErmEdit),
    Gui(GuiEdit),
}

pub type DiagramCommand = Command<DiagramEdit>;

impl Reversible for DiagramEdit {
    type Target = GuiModel;

    fn redo(&self, model: &mut GuiModel) {
        match self {
            DiagramEdit::Erm(e) => e.redo(&mut model.erm),
            DiagramEdit::Gui(e) => e.redo(&mut model.gui),
        }
    }

    fn undo(&self, model: &mut GuiModel) {
        match self {
            DiagramEdit::Erm(e) => e.undo(&mut model.erm),
            DiagramEdit::Gui(e) => e.undo(&mut model.gui),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn two_objects(graph: &mut GuiGraph, a: Point, b: Point) -> (NodeUuid, NodeUuid, LineUuid) {
        let (ua, ub, l) = (NodeUuid::now_v7(), NodeUuid::now_v7(), LineUuid::now_v7());
        graph.insert_object(ua, ObjectKind::Relation, a);
        graph.insert_object(ub, ObjectKind::Entity, b);
        graph.insert_line(l, GuiLine::new(ua, ub));
        (ua, ub, l)
    }

    #[test]
    fn test_endpoints_follow_objects() {
        let mut graph = GuiGraph::new();
        let (a, _, l) = two_objects(&mut graph, Point::new(0, 0), Point::new(100, 0));
        graph.insert_point(&l, 1, Point::new(50, 50)).unwrap();

        let shift = graph.shift_object(&a, Point::new(-10, 5));
        assert_eq!(
            graph.points(&l).unwrap(),
            vec![Point::new(-10, 5), Point::new(50, 50), Point::new(100, 0)]
        );
        shift.undo(&mut graph);
        assert_eq!(graph.points(&l).unwrap()[0], Point::new(0, 0));
    }

    #[test]
    fn test_point_edits_undo() {
        let mut graph = GuiGraph::new();
        let (_, _, l) = two_objects(&mut graph, Point::new(0, 0), Point::new(300, 0));
        let p1 = Point::new(100, 100);
        let p2 = Point::new(200, 100);
        graph.insert_point(&l, 1, p1).unwrap();
        let insert = graph.insert_point(&l, 2, p2).unwrap();
        assert_eq!(graph.line(&l).unwrap().waypoints(), &[p1, p2]);

        let set = graph.set_point(&l, 1, Point::new(0, 200)).unwrap();
        set.undo(&mut graph);
        assert_eq!(graph.line(&l).unwrap().waypoints(), &[p1, p2]);

        let remove = graph.remove_point(&l, 1).unwrap();
        assert_eq!(graph.line(&l).unwrap().waypoints(), &[p2]);
        remove.undo(&mut graph);
        insert.undo(&mut graph);
        assert_eq!(graph.line(&l).unwrap().waypoints(), &[p1]);

        let shift = graph.shift_points(&l, Point::new(1, 1)).unwrap();
        assert_eq!(graph.line(&l).unwrap().waypoints(), &[Point::new(101, 101)]);
        shift.undo(&mut graph);

        assert_eq!(
            graph.remove_point(&l, 0).unwrap_err(),
            ErmError::NoSuchPoint { line: l, index: 0 }
        );
        assert_eq!(
            graph.set_point(&l, 2, p1).unwrap_err(),
            ErmError::NoSuchPoint { line: l, index: 2 }
        );
        assert!(graph.insert_point(&l, 2, p2).is_ok());
        assert!(graph.insert_point(&l, 4, p2).is_err());
    }

    #[test]
    fn test_check_end_points_drops_first_collinear() {
        let mut graph = GuiGraph::new();
        let (_, _, l) = two_objects(&mut graph, Point::new(0, 0), Point::new(200, 0));
        graph.insert_point(&l, 1, Point::new(100, 5)).unwrap();

        let check = graph.check_end_points(&l).unwrap();
        assert!(graph.line(&l).unwrap().waypoints().is_empty());
        check.undo(&mut graph);
        assert_eq!(graph.line(&l).unwrap().waypoints(), &[Point::new(100, 5)]);
    }

    #[test]
    fn test_check_end_points_drops_last_collinear() {
        let mut graph = GuiGraph::new();
        let (_, _, l) = two_objects(&mut graph, Point::new(0, 0), Point::new(400, 400));
        graph.insert_point(&l, 1, Point::new(0, 400)).unwrap();
        graph.insert_point(&l, 2, Point::new(200, 400)).unwrap();

        assert!(graph.check_end_points(&l).is_some());
        assert_eq!(graph.line(&l).unwrap().waypoints(), &[Point::new(0, 400)]);
        assert!(graph.check_end_points(&l).is_none());
    }

    #[test]
    fn test_remove_and_restore_line() {
        let mut graph = GuiGraph::new();
        let (a, _, l) = two_objects(&mut graph, Point::new(0, 0), Point::new(10, 0));
        graph.insert_point(&l, 1, Point::new(5, 5)).unwrap();
        let remove = graph.remove_line(&l).unwrap();
        assert!(graph.line(&l).is_none());
        assert!(graph.remove_line(&l).is_none());
        remove.undo(&mut graph);
        assert_eq!(graph.line(&l).unwrap().waypoints(), &[Point::new(5, 5)]);

        let remove = graph.remove_object(&a).unwrap();
        assert!(graph.points(&l).is_none());
        remove.undo(&mut graph);
        assert_eq!(graph.object(&a).unwrap().kind, ObjectKind::Relation);
    }
}
