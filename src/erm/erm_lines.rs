use crate::common::geometry::{is_on_line, is_same_point, POINT_CLICK_DISTANCE};
use crate::common::observer::SelectionCheck;
use crate::common::uuid::{LineUuid, NodeUuid};

use super::erm_controllers::GuiModel;
use super::erm_models::{ErmError, ObjectKind};
use super::gui_models::DiagramCommand;

/// A grabbed line point, in view coordinates at the time it was picked.
///
/// `index` counts the full point list, origin endpoint included. For a new
/// point `n1` and `n2` are the ends of the segment it splits; for an
/// existing point they are its neighbours. `far1`/`far2` are the points
/// one step further out, if any.
#[derive(Clone, Debug, PartialEq)]
pub struct PointInfo {
    pub line: LineUuid,
    pub index: usize,
    pub new_point: bool,
    pub far1: Option<egui::Pos2>,
    pub n1: egui::Pos2,
    pub n2: egui::Pos2,
    pub far2: Option<egui::Pos2>,
}

fn pick_on(line: LineUuid, points: &[egui::Pos2], at: egui::Pos2) -> Option<PointInfo> {
    for i in 1..points.len() {
        let p1 = points[i - 1];
        let cur = points[i];
        let far1 = i.checked_sub(2).map(|j| points[j]);
        if let Some(p2) = points.get(i + 1).copied() {
            if is_same_point(at, cur, POINT_CLICK_DISTANCE) {
                return Some(PointInfo {
                    line,
                    index: i,
                    new_point: false,
                    far1,
                    n1: p1,
                    n2: p2,
                    far2: points.get(i + 2).copied(),
                });
            }
        }
        if is_on_line(at, p1, cur) {
            return Some(PointInfo {
                line,
                index: i,
                new_point: true,
                far1,
                n1: p1,
                n2: cur,
                far2: points.get(i + 1).copied(),
            });
        }
    }
    None
}

impl GuiModel {
    /// Lines in picking order: generalizations first, then entity
    /// attributes, then relation connections and attributes.
    fn lines_in_pick_order(&self) -> Vec<LineUuid> {
        let mut lines = Vec::new();
        let attribute_lines =
            |owner: &NodeUuid| self.erm.attributes_of(owner).into_iter().map(|(l, _)| l);
        for (g, _) in self.erm.objects_of_kind(ObjectKind::Generalization) {
            lines.extend(self.erm.superline(&g).map(|(l, _)| l));
            lines.extend(self.erm.connections(&g).into_iter().map(|(l, _, _)| l));
        }
        for (e, _) in self.erm.objects_of_kind(ObjectKind::Entity) {
            lines.extend(attribute_lines(&e));
        }
        for (r, _) in self.erm.objects_of_kind(ObjectKind::Relation) {
            lines.extend(self.erm.connections(&r).into_iter().map(|(l, _, _)| l));
            lines.extend(attribute_lines(&r));
        }
        lines
    }

    /// The waypoint under `at`, or the segment position where a new one
    /// would be inserted.
    pub fn get_selected_point(&self, at: egui::Pos2) -> Option<PointInfo> {
        self.lines_in_pick_order().into_iter().find_map(|line| {
            let points: Vec<egui::Pos2> = self
                .gui
                .points(&line)?
                .into_iter()
                .map(|p| self.view_point(p))
                .collect();
            pick_on(line, &points, at)
        })
    }

    /// Drops a grabbed point at `at`. Moving an existing point prunes its
    /// outer neighbours when they become collinear, and removes the point
    /// itself if it lands on or between its neighbours. A new point is only
    /// added when it would not be redundant.
    pub fn release_point(
        &mut self,
        info: &PointInfo,
        at: egui::Pos2,
    ) -> Result<Option<DiagramCommand>, ErmError> {
        let redundant = is_same_point(at, info.n1, POINT_CLICK_DISTANCE)
            || is_same_point(at, info.n2, POINT_CLICK_DISTANCE)
            || is_on_line(at, info.n1, info.n2);

        if info.new_point {
            if redundant {
                self.notifier().notify_draw(false, false);
                return Ok(None);
            }
            return self.add_point(&info.line, at, info.index).map(Some);
        }

        let model_at = self.model_point(at);
        let steps = self.transaction(|m, steps| {
            let mut index = info.index;
            if info.far1.is_some_and(|far1| is_on_line(info.n1, far1, at)) {
                steps.push(m.gui.remove_point(&info.line, index - 1)?.lift());
                index -= 1;
            }
            if info.far2.is_some_and(|far2| is_on_line(info.n2, at, far2)) {
                steps.push(m.gui.remove_point(&info.line, index + 1)?.lift());
            }
            let step = if redundant {
                m.gui.remove_point(&info.line, index)?
            } else {
                m.gui.set_point(&info.line, index, model_at)?
            };
            steps.push(step.lift());
            Ok(())
        })?;
        tracing::debug!(
            line = %info.line,
            index = info.index,
            steps = steps.len(),
            "released point"
        );
        Ok(Some(self.finish(steps, false, SelectionCheck::Never)))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::common::geometry::Point;
    use crate::erm::erm_controllers::test::{entity_at, plain_model, pos};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    fn relation_line(model: &mut GuiModel, waypoints: &[Point], entity_at_x: f32) -> LineUuid {
        let e = entity_at(model, "E", entity_at_x, 0.0);
        model
            .new_relation("R", pos(0.0, 0.0), &BTreeSet::from([e]))
            .unwrap();
        let r = model.last_created().unwrap();
        let (line, _, _) = model.erm().connections(&r)[0];
        for (i, p) in waypoints.iter().enumerate() {
            model.gui.insert_point(&line, i + 1, *p).unwrap();
        }
        line
    }

    #[test]
    fn test_pick_existing_and_new_points() {
        let mut model = plain_model();
        let line = relation_line(&mut model, &[Point::new(100, 100), Point::new(200, 200)], 300.0);

        let existing = model.get_selected_point(pos(205.0, 195.0)).unwrap();
        assert_eq!(
            existing,
            PointInfo {
                line,
                index: 2,
                new_point: false,
                far1: Some(pos(0.0, 0.0)),
                n1: pos(100.0, 100.0),
                n2: pos(300.0, 0.0),
                far2: None,
            }
        );

        let split = model.get_selected_point(pos(50.0, 50.0)).unwrap();
        assert!(split.new_point);
        assert_eq!(split.index, 1);
        assert_eq!(split.far1, None);
        assert_eq!((split.n1, split.n2), (pos(0.0, 0.0), pos(100.0, 100.0)));
        assert_eq!(split.far2, Some(pos(200.0, 200.0)));

        assert!(model.get_selected_point(pos(0.0, 300.0)).is_none());
    }

    #[test]
    fn test_endpoints_are_not_grabbed() {
        let mut model = plain_model();
        relation_line(&mut model, &[], 300.0);
        let info = model.get_selected_point(pos(300.0, 0.0)).unwrap();
        assert!(info.new_point);
        assert_eq!(info.index, 1);
    }

    #[test]
    fn test_release_collinear_point_is_removed() {
        // [A, B, C, D] with C dragged onto the segment B-D
        let mut model = plain_model();
        let line = relation_line(&mut model, &[Point::new(100, 100), Point::new(200, 200)], 300.0);
        let info = model.get_selected_point(pos(200.0, 200.0)).unwrap();
        let command = model.release_point(&info, pos(200.0, 50.0)).unwrap().unwrap();
        assert_eq!(
            model.gui().points(&line).unwrap(),
            vec![Point::new(0, 0), Point::new(100, 100), Point::new(300, 0)]
        );
        command.undo(&mut model);
        assert_eq!(
            model.gui().line(&line).unwrap().waypoints(),
            &[Point::new(100, 100), Point::new(200, 200)]
        );
    }

    #[test]
    fn test_release_single_waypoint_onto_segment() {
        // [A, B, C] with B dragged between A and C
        let mut model = plain_model();
        let line = relation_line(&mut model, &[Point::new(100, 100)], 200.0);
        let info = model.get_selected_point(pos(100.0, 100.0)).unwrap();
        model.release_point(&info, pos(100.0, 10.0)).unwrap().unwrap();
        assert_eq!(
            model.gui().points(&line).unwrap(),
            vec![Point::new(0, 0), Point::new(200, 0)]
        );
    }

    #[test]
    fn test_release_prunes_outer_neighbour() {
        // moving C makes B redundant on the way from A
        let mut model = plain_model();
        let line = relation_line(
            &mut model,
            &[Point::new(100, 45), Point::new(200, 200)],
            400.0,
        );
        let info = model.get_selected_point(pos(200.0, 200.0)).unwrap();
        assert_eq!(info.index, 2);
        model.release_point(&info, pos(200.0, 100.0)).unwrap().unwrap();
        assert_eq!(
            model.gui().points(&line).unwrap(),
            vec![Point::new(0, 0), Point::new(200, 100), Point::new(400, 0)]
        );
    }

    #[test]
    fn test_release_moves_point() {
        let mut model = plain_model();
        let line = relation_line(&mut model, &[Point::new(100, 100)], 200.0);
        let info = model.get_selected_point(pos(100.0, 100.0)).unwrap();
        model.release_point(&info, pos(100.0, 300.0)).unwrap().unwrap();
        assert_eq!(model.gui().line(&line).unwrap().waypoints(), &[Point::new(100, 300)]);
    }

    #[test]
    fn test_new_point_only_when_useful() {
        let mut model = plain_model();
        let line = relation_line(&mut model, &[], 400.0);
        let info = model.get_selected_point(pos(200.0, 0.0)).unwrap();
        assert!(info.new_point);

        assert!(model.release_point(&info, pos(200.0, 5.0)).unwrap().is_none());
        assert!(model.release_point(&info, pos(10.0, 10.0)).unwrap().is_none());
        assert!(model.gui().line(&line).unwrap().waypoints().is_empty());

        let command = model.release_point(&info, pos(200.0, 150.0)).unwrap().unwrap();
        assert_eq!(model.gui().line(&line).unwrap().waypoints(), &[Point::new(200, 150)]);
        command.undo(&mut model);
        assert!(model.gui().line(&line).unwrap().waypoints().is_empty());
    }

    #[test]
    fn test_point_edit_through_phantom() {
        let mut model = plain_model();
        let line = relation_line(&mut model, &[Point::new(100, 100)], 200.0);
        let info = model.get_selected_point(pos(100.0, 100.0)).unwrap();
        model.begin_point_edit(info, pos(100.0, 100.0));
        model.move_phantom(pos(120.0, 250.0));
        let command = model.commit_phantom(&BTreeSet::new()).unwrap();
        assert!(command.is_some());
        assert_eq!(model.gui().line(&line).unwrap().waypoints(), &[Point::new(120, 250)]);
    }

    #[test]
    fn test_attribute_lines_are_pickable() {
        let mut model = plain_model();
        let e = entity_at(&mut model, "E", 0.0, 0.0);
        model.new_attribute("a", &e, pos(0.0, 300.0)).unwrap();
        let (line, _) = model.erm().attributes_of(&e)[0];
        let info = model.get_selected_point(pos(0.0, 150.0)).unwrap();
        assert_eq!(info.line, line);
        assert!(info.new_point);
    }
}
