use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use crate::common::canvas::{DiagramCanvas, MeasuringCanvas, SvgCanvas};
use crate::common::command::Command;
use crate::common::config::{
    EditorSettings, FONT_SIZE_STEP, MAX_FONT_SIZE, MAX_ZOOM, MIN_FONT_SIZE, MIN_ZOOM,
};
use crate::common::geometry::{self, Point};
use crate::common::history::CommandHistory;
use crate::common::observer::{DiagramObserver, RedrawHook, SelectionCheck, SurfaceNotifier};
use crate::common::uuid::{LineUuid, NodeUuid};

use super::chen_notation::NotationStyle;
use super::erm_lines::PointInfo;
use super::erm_models::{
    Cardinality, ErmAttribute, ErmEntity, ErmError, ErmGeneralization, ErmGraph, ErmObject,
    ErmRelation, ObjectKind,
};
use super::gui_models::{DiagramCommand, DiagramEdit, GuiGraph, GuiLine};

pub type DiagramHistory = CommandHistory<DiagramEdit>;

/// Padding around waypoints when computing the view bounds.
const WAYPOINT_PADDING: Point = Point::new(20, 20);
const SVG_MARGIN: f32 = 10.0;
const GRID_COLOR: egui::Color32 = egui::Color32::LIGHT_GRAY;

/// Preview that follows the cursor until it is committed or cancelled.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Phantom {
    #[default]
    Idle,
    Placing {
        kind: ObjectKind,
        at: egui::Pos2,
    },
    EditingPoint {
        info: PointInfo,
        at: egui::Pos2,
    },
}

/// The editing surface of one diagram: both graph layers, the view
/// transform and the pending phantom. All positions passed in or out are
/// in view space unless stated otherwise.
pub struct GuiModel {
    pub(crate) erm: ErmGraph,
    pub(crate) gui: GuiGraph,
    notation: Box<dyn NotationStyle>,
    settings: EditorSettings,
    last_created: Option<NodeUuid>,
    view_dimension: (Point, Point),
    zoom: f32,
    zoomed: bool,
    grid_size: i32,
    grid_show: bool,
    font_size: u32,
    pub(crate) phantom: Phantom,
    notifier: SurfaceNotifier,
}

impl GuiModel {
    pub fn new(mut notation: Box<dyn NotationStyle>, settings: EditorSettings) -> Self {
        notation.set_font_size(settings.font_size as f32);
        Self {
            erm: ErmGraph::new(),
            gui: GuiGraph::new(),
            notation,
            last_created: None,
            view_dimension: (Point::ZERO, Point::ZERO),
            zoom: settings.zoom.clamp(MIN_ZOOM, MAX_ZOOM),
            zoomed: false,
            grid_size: settings.grid_size,
            grid_show: settings.grid_show,
            font_size: settings.font_size,
            phantom: Phantom::Idle,
            notifier: SurfaceNotifier::default(),
            settings,
        }
    }

    pub fn erm(&self) -> &ErmGraph {
        &self.erm
    }
    pub fn gui(&self) -> &GuiGraph {
        &self.gui
    }
    pub fn settings(&self) -> &EditorSettings {
        &self.settings
    }
    pub fn notation(&self) -> &dyn NotationStyle {
        self.notation.as_ref()
    }
    pub fn set_notation(&mut self, mut notation: Box<dyn NotationStyle>) {
        notation.set_font_size(self.font_size as f32);
        self.notation = notation;
        self.notifier.notify_draw(false, false);
    }
    pub fn last_created(&self) -> Option<NodeUuid> {
        self.last_created
    }
    pub fn exists(&self, uuid: &NodeUuid) -> bool {
        self.erm.contains(uuid)
    }
    pub fn phantom(&self) -> &Phantom {
        &self.phantom
    }

    // Observers

    pub fn register_observer(&self, observer: Arc<RwLock<dyn DiagramObserver>>) {
        self.notifier.register_observer(observer);
    }
    pub fn unregister_observer(&self, observer: &Arc<RwLock<dyn DiagramObserver>>) {
        self.notifier.unregister_observer(observer);
    }
    pub fn notifier(&self) -> &SurfaceNotifier {
        &self.notifier
    }

    // Transforms

    pub fn view_origin(&self) -> Point {
        self.view_dimension.0
    }
    pub fn view_dimension(&self) -> (Point, Point) {
        self.view_dimension
    }

    pub fn to_model(&self, view: egui::Pos2) -> egui::Pos2 {
        self.view_origin().to_pos2() + view.to_vec2() / self.zoom
    }
    pub fn to_view(&self, model: egui::Pos2) -> egui::Pos2 {
        ((model - self.view_origin().to_pos2()) * self.zoom).to_pos2()
    }
    pub fn model_point(&self, view: egui::Pos2) -> Point {
        Point::rounded(self.to_model(view))
    }
    pub fn view_point(&self, model: Point) -> egui::Pos2 {
        self.to_view(model.to_pos2())
    }

    /// Recomputes the model-space bounds of everything on the board,
    /// padded by the shape extents. The origin never lies right or below
    /// of the model origin.
    pub fn calc_view_dimension(&mut self) -> (Point, Point) {
        let mut min = Point::ZERO;
        let mut max = Point::new(i32::MIN, i32::MIN);
        let mut extend = |p: Point, pad: Point| {
            min = min.min(p.saturating_sub(pad));
            max = max.max(p.saturating_add(pad));
        };
        for (_, o) in self.gui.objects() {
            let area = self.notation.area(o.kind, egui::Pos2::ZERO, 1.0);
            extend(
                o.position,
                Point::new(area.width().abs() as i32, area.height().abs() as i32),
            );
        }
        for (_, l) in self.gui.lines() {
            for p in l.waypoints() {
                extend(*p, WAYPOINT_PADDING);
            }
        }
        if min.x > max.x {
            min.x = 0;
            max.x = 0;
        }
        if min.y > max.y {
            min.y = 0;
            max.y = 0;
        }
        self.view_dimension = (min, max);
        self.view_dimension
    }

    // Zoom

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    /// Zooming in divides by `factor`, zooming out multiplies.
    pub fn change_zoom(&mut self, zoom_in: bool, factor: f32) -> bool {
        if (zoom_in && self.zoom >= MAX_ZOOM - 0.005) || (!zoom_in && self.zoom <= MIN_ZOOM + 0.005)
        {
            return false;
        }
        let next = if zoom_in {
            self.zoom / factor
        } else {
            self.zoom * factor
        };
        self.zoom = next.clamp(MIN_ZOOM, MAX_ZOOM);
        self.zoomed = true;
        self.notifier.notify_draw(false, false);
        true
    }

    pub fn zoom_in(&mut self) -> bool {
        self.change_zoom(true, self.settings.zoom_factor)
    }
    pub fn zoom_out(&mut self) -> bool {
        self.change_zoom(false, self.settings.zoom_factor)
    }

    pub fn fit_zoom(&mut self, width: f32, height: f32) {
        let (min, max) = self.calc_view_dimension();
        let fit = (width / (max.x - min.x) as f32).min(height / (max.y - min.y) as f32);
        self.zoom = if fit.is_nan() {
            MAX_ZOOM
        } else {
            fit.clamp(MIN_ZOOM, MAX_ZOOM)
        };
        self.zoomed = true;
        self.notifier.notify_draw(false, false);
    }

    /// Whether the zoom changed since the last call.
    pub fn has_zoomed(&mut self) -> bool {
        std::mem::take(&mut self.zoomed)
    }

    // Grid and font

    pub fn grid_size(&self) -> i32 {
        self.grid_size
    }
    pub fn grid_shown(&self) -> bool {
        self.grid_show
    }
    pub fn show_grid(&mut self, show: bool) {
        self.grid_show = show;
        self.notifier.notify_draw(false, false);
    }

    pub fn snap_to_grid(&self, view: egui::Pos2) -> egui::Pos2 {
        let grid = self.grid_size as f32;
        let model = self.to_model(view);
        self.to_view(egui::Pos2::new(
            (model.x / grid).round() * grid,
            (model.y / grid).round() * grid,
        ))
    }

    pub fn font_size(&self) -> u32 {
        self.font_size
    }

    pub fn increase_font_size(&mut self) -> bool {
        self.set_font_size((self.font_size + FONT_SIZE_STEP).min(MAX_FONT_SIZE))
    }

    pub fn decrease_font_size(&mut self) -> bool {
        self.set_font_size(self.font_size.saturating_sub(FONT_SIZE_STEP).max(MIN_FONT_SIZE))
    }

    pub(crate) fn set_font_size(&mut self, size: u32) -> bool {
        let size = size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE);
        if size == self.font_size {
            return false;
        }
        self.font_size = size;
        self.notation.set_font_size(size as f32);
        self.notifier.notify_draw(false, false);
        true
    }

    // Hit testing

    fn hit(&self, uuid: &NodeUuid, at: egui::Pos2) -> Option<egui::Vec2> {
        let object = self.gui.object(uuid)?;
        let area = self
            .notation
            .area(object.kind, self.view_point(object.position), self.zoom);
        geometry::strictly_contains(area, at).then(|| area.center() - at)
    }

    fn first_hit(
        &self,
        candidates: impl IntoIterator<Item = NodeUuid>,
        at: egui::Pos2,
    ) -> Option<(NodeUuid, egui::Vec2)> {
        candidates
            .into_iter()
            .find_map(|uuid| self.hit(&uuid, at).map(|snap| (uuid, snap)))
    }

    fn uuids_of_kind(&self, kind: ObjectKind) -> Vec<NodeUuid> {
        self.erm.objects_of_kind(kind).map(|(uuid, _)| uuid).collect()
    }

    fn attributes_of_kind(&self, kind: ObjectKind) -> Vec<NodeUuid> {
        self.erm
            .objects_of_kind(kind)
            .flat_map(|(owner, _)| self.erm.attributes_of(&owner))
            .map(|(_, attribute)| attribute)
            .collect()
    }

    /// Object under `at` with the offset from the click to the shape centre.
    /// With `filter_entities` only entities are considered.
    pub fn get_selected(
        &self,
        at: egui::Pos2,
        filter_entities: bool,
    ) -> Option<(NodeUuid, egui::Vec2)> {
        if !filter_entities {
            let attributes = self
                .attributes_of_kind(ObjectKind::Relation)
                .into_iter()
                .chain(self.attributes_of_kind(ObjectKind::Entity));
            if let Some(hit) = self.first_hit(attributes, at) {
                return Some(hit);
            }
        }
        if let Some(hit) = self.first_hit(self.uuids_of_kind(ObjectKind::Entity), at) {
            return Some(hit);
        }
        if filter_entities {
            return None;
        }
        self.first_hit(self.uuids_of_kind(ObjectKind::Relation), at)
            .or_else(|| self.first_hit(self.uuids_of_kind(ObjectKind::Generalization), at))
    }

    /// Objects whose position lies within the rectangle, borders included.
    /// With `filter_entities` only entities and their attributes are kept.
    pub fn get_selected_in(&self, rect: egui::Rect, filter_entities: bool) -> BTreeSet<NodeUuid> {
        let area = egui::Rect::from_two_pos(self.to_model(rect.min), self.to_model(rect.max));
        self.gui
            .objects()
            .filter(|(uuid, _)| {
                !filter_entities
                    || match self.erm.kind(uuid) {
                        Some(ObjectKind::Entity) => true,
                        Some(ObjectKind::Attribute) => self
                            .erm
                            .attribute_owner(uuid)
                            .and_then(|o| self.erm.kind(&o))
                            == Some(ObjectKind::Entity),
                        _ => false,
                    }
            })
            .filter(|(_, o)| area.contains(o.position.to_pos2()))
            .map(|(uuid, _)| *uuid)
            .collect()
    }

    // Command plumbing

    /// Runs `f`, reverting whatever it applied if it fails.
    pub(crate) fn transaction(
        &mut self,
        f: impl FnOnce(&mut Self, &mut Vec<DiagramCommand>) -> Result<(), ErmError>,
    ) -> Result<Vec<DiagramCommand>, ErmError> {
        let mut steps = Vec::new();
        match f(self, &mut steps) {
            Ok(()) => Ok(steps),
            Err(e) => {
                Command::from_applied(steps).undo(self);
                Err(e)
            }
        }
    }

    /// Bundles applied steps into one command that asks observers to
    /// redraw on undo/redo, and notifies once for the initial application.
    pub(crate) fn finish(
        &self,
        steps: Vec<DiagramCommand>,
        update_properties: bool,
        check_selection: SelectionCheck,
    ) -> DiagramCommand {
        let hook = RedrawHook::new(self.notifier.clone(), update_properties, check_selection);
        self.notifier.notify_draw(
            update_properties,
            check_selection == SelectionCheck::OnRedo,
        );
        Command::from_applied(steps).hooked(hook)
    }

    fn expect_kind(
        &self,
        uuid: &NodeUuid,
        kinds: &[ObjectKind],
        expected: &'static str,
    ) -> Result<ObjectKind, ErmError> {
        let kind = self.erm.kind(uuid).ok_or(ErmError::UnknownObject(*uuid))?;
        if kinds.contains(&kind) {
            Ok(kind)
        } else {
            Err(ErmError::WrongKind {
                uuid: *uuid,
                expected,
            })
        }
    }

    fn insert_node(
        &mut self,
        uuid: NodeUuid,
        object: impl Into<ErmObject>,
        position: Point,
        steps: &mut Vec<DiagramCommand>,
    ) {
        let object = object.into();
        let kind = object.kind();
        steps.push(self.erm.insert_object(uuid, object).lift());
        steps.push(self.gui.insert_object(uuid, kind, position).lift());
    }

    /// Connects one entity. Generalizations skip entities that already are
    /// subtypes and demote their supertype onto the existing line.
    fn connect(
        &mut self,
        connection: &NodeUuid,
        entity: &NodeUuid,
        steps: &mut Vec<DiagramCommand>,
    ) -> Result<(), ErmError> {
        let cardinality = self.settings.default_cardinality;
        if self.erm.kind(connection) == Some(ObjectKind::Generalization) {
            if self.erm.has_connection(connection, entity) {
                return Ok(());
            }
            if let Some((line, e)) = self.erm.superline(connection) {
                if e == *entity {
                    steps.push(self.erm.add_connection(connection, line, entity, cardinality)?.lift());
                    return Ok(());
                }
            }
        }
        let line = LineUuid::now_v7();
        steps.push(self.erm.add_connection(connection, line, entity, cardinality)?.lift());
        steps.push(
            self.gui
                .insert_line(line, GuiLine::new(*connection, *entity))
                .lift(),
        );
        Ok(())
    }

    fn selected_of_kind<'a>(
        &'a self,
        selection: &'a BTreeSet<NodeUuid>,
        kinds: &'a [ObjectKind],
    ) -> impl Iterator<Item = NodeUuid> + 'a {
        selection
            .iter()
            .filter(move |u| self.erm.kind(u).is_some_and(|k| kinds.contains(&k)))
            .copied()
    }

    // Creation

    pub fn new_entity(&mut self, name: &str, at: egui::Pos2) -> DiagramCommand {
        let uuid = NodeUuid::now_v7();
        let mut steps = Vec::new();
        self.insert_node(uuid, ErmEntity::new(name), self.model_point(at), &mut steps);
        self.last_created = Some(uuid);
        tracing::debug!(%uuid, name, "new entity");
        self.finish(steps, true, SelectionCheck::OnUndo)
    }

    /// New entity connected to every relation and generalization in the
    /// selection; falls back to [`Self::new_entity`] if there is none.
    pub fn new_entity_connected(
        &mut self,
        name: &str,
        at: egui::Pos2,
        selection: &BTreeSet<NodeUuid>,
    ) -> Result<DiagramCommand, ErmError> {
        let connections: Vec<NodeUuid> = self
            .selected_of_kind(selection, &[ObjectKind::Relation, ObjectKind::Generalization])
            .collect();
        if connections.is_empty() {
            return Ok(self.new_entity(name, at));
        }
        let uuid = NodeUuid::now_v7();
        let position = self.model_point(at);
        let steps = self.transaction(|m, steps| {
            m.insert_node(uuid, ErmEntity::new(name), position, steps);
            for c in &connections {
                m.connect(c, &uuid, steps)?;
            }
            Ok(())
        })?;
        self.last_created = Some(uuid);
        tracing::debug!(%uuid, name, connections = connections.len(), "new connected entity");
        Ok(self.finish(steps, true, SelectionCheck::OnUndo))
    }

    pub fn new_attribute(
        &mut self,
        name: &str,
        owner: &NodeUuid,
        at: egui::Pos2,
    ) -> Result<DiagramCommand, ErmError> {
        self.expect_kind(
            owner,
            &[ObjectKind::Entity, ObjectKind::Relation],
            "an entity or relation",
        )?;
        let uuid = NodeUuid::now_v7();
        let line = LineUuid::now_v7();
        let position = self.model_point(at);
        let steps = self.transaction(|m, steps| {
            m.insert_node(uuid, ErmAttribute::new(name, *owner), position, steps);
            steps.push(m.erm.add_attribute(owner, line, &uuid)?.lift());
            steps.push(m.gui.insert_line(line, GuiLine::new(*owner, uuid)).lift());
            Ok(())
        })?;
        self.last_created = Some(uuid);
        tracing::debug!(%uuid, %owner, name, "new attribute");
        Ok(self.finish(steps, true, SelectionCheck::OnUndo))
    }

    /// New relation connected to every entity in the selection.
    pub fn new_relation(
        &mut self,
        name: &str,
        at: egui::Pos2,
        selection: &BTreeSet<NodeUuid>,
    ) -> Result<DiagramCommand, ErmError> {
        self.new_connection(ErmRelation::new(name).into(), at, selection)
    }

    /// New generalization with every entity in the selection as a subtype.
    pub fn new_generalization(
        &mut self,
        at: egui::Pos2,
        selection: &BTreeSet<NodeUuid>,
    ) -> Result<DiagramCommand, ErmError> {
        self.new_connection(ErmGeneralization::new().into(), at, selection)
    }

    fn new_connection(
        &mut self,
        object: ErmObject,
        at: egui::Pos2,
        selection: &BTreeSet<NodeUuid>,
    ) -> Result<DiagramCommand, ErmError> {
        let entities: Vec<NodeUuid> = self
            .selected_of_kind(selection, &[ObjectKind::Entity])
            .collect();
        let uuid = NodeUuid::now_v7();
        let kind = object.kind();
        let position = self.model_point(at);
        let steps = self.transaction(|m, steps| {
            m.insert_node(uuid, object, position, steps);
            for e in &entities {
                m.connect(&uuid, e, steps)?;
            }
            Ok(())
        })?;
        self.last_created = Some(uuid);
        tracing::debug!(%uuid, kind = kind.name(), entities = entities.len(), "new connection");
        Ok(self.finish(steps, true, SelectionCheck::OnUndo))
    }

    // Connections

    /// Connects every entity of the selection to a relation or generalization.
    pub fn add_connection(
        &mut self,
        connection: &NodeUuid,
        selection: &BTreeSet<NodeUuid>,
    ) -> Result<DiagramCommand, ErmError> {
        self.expect_kind(
            connection,
            &[ObjectKind::Relation, ObjectKind::Generalization],
            "a connection",
        )?;
        let entities: Vec<NodeUuid> = self
            .selected_of_kind(selection, &[ObjectKind::Entity])
            .collect();
        let steps = self.transaction(|m, steps| {
            for e in &entities {
                m.connect(connection, e, steps)?;
            }
            Ok(())
        })?;
        Ok(self.finish(steps, true, SelectionCheck::Never))
    }

    pub fn remove_connection(
        &mut self,
        connection: &NodeUuid,
        line: &LineUuid,
    ) -> Result<DiagramCommand, ErmError> {
        let steps = self.transaction(|m, steps| {
            steps.push(m.erm.remove_connection(connection, line)?.lift());
            steps.extend(m.gui.remove_line(line).map(|c| c.lift()));
            Ok(())
        })?;
        Ok(self.finish(steps, true, SelectionCheck::Never))
    }

    /// Sets or clears the supertype of a generalization. A subtype chosen
    /// as supertype is promoted on its existing line.
    pub fn set_supertype(
        &mut self,
        generalization: &NodeUuid,
        entity: Option<&NodeUuid>,
    ) -> Result<DiagramCommand, ErmError> {
        self.expect_kind(generalization, &[ObjectKind::Generalization], "a generalization")?;
        let previous = self.erm.superline(generalization);
        let sub_line = entity.and_then(|e| {
            self.erm
                .connections(generalization)
                .into_iter()
                .find(|(_, d, _)| d == e)
                .map(|(l, _, _)| l)
        });
        let steps = self.transaction(|m, steps| {
            let next = match (entity, sub_line) {
                (Some(e), Some(l)) => Some((l, *e)),
                (Some(e), None) => Some((LineUuid::now_v7(), *e)),
                (None, _) => None,
            };
            steps.push(m.erm.set_superentity(generalization, next)?.lift());
            if let Some((l, _)) = previous {
                steps.extend(m.gui.remove_line(&l).map(|c| c.lift()));
            }
            if let (Some((l, e)), None) = (next, sub_line) {
                steps.push(m.gui.insert_line(l, GuiLine::new(*generalization, e)).lift());
            }
            Ok(())
        })?;
        Ok(self.finish(steps, true, SelectionCheck::Never))
    }

    pub fn set_primary(&mut self, attribute: &NodeUuid, primary: bool) -> Result<DiagramCommand, ErmError> {
        let step = self.erm.set_primary(attribute, primary)?.lift();
        Ok(self.finish(vec![step], true, SelectionCheck::Never))
    }

    pub fn set_cardinality(
        &mut self,
        relation: &NodeUuid,
        line: &LineUuid,
        cardinality: Cardinality,
    ) -> Result<DiagramCommand, ErmError> {
        let step = self.erm.set_cardinality(relation, line, cardinality)?.lift();
        Ok(self.finish(vec![step], true, SelectionCheck::Never))
    }

    pub fn set_name(&mut self, uuid: &NodeUuid, name: &str) -> Result<DiagramCommand, ErmError> {
        let step = self.erm.rename(uuid, name)?.lift();
        Ok(self.finish(vec![step], true, SelectionCheck::Never))
    }

    // Removal

    /// Removes the selection along with every line and attribute hanging
    /// off of it, as a single command.
    pub fn remove(&mut self, selection: &BTreeSet<NodeUuid>) -> Result<DiagramCommand, ErmError> {
        let mut order: Vec<NodeUuid> = selection
            .iter()
            .filter(|u| {
                self.erm
                    .attribute_owner(u)
                    .is_some_and(|owner| !selection.contains(&owner))
            })
            .copied()
            .collect();
        for kind in [
            ObjectKind::Relation,
            ObjectKind::Generalization,
            ObjectKind::Entity,
        ] {
            order.extend(self.selected_of_kind(selection, &[kind]));
        }
        let steps = self.transaction(|m, steps| {
            for uuid in &order {
                if m.erm.contains(uuid) {
                    m.remove_steps(uuid, steps)?;
                }
            }
            Ok(())
        })?;
        tracing::debug!(objects = order.len(), "removed selection");
        Ok(self.finish(steps, true, SelectionCheck::OnRedo))
    }

    pub fn remove_object(&mut self, uuid: &NodeUuid) -> Result<DiagramCommand, ErmError> {
        let steps = self.transaction(|m, steps| m.remove_steps(uuid, steps))?;
        Ok(self.finish(steps, true, SelectionCheck::OnRedo))
    }

    fn remove_steps(&mut self, uuid: &NodeUuid, steps: &mut Vec<DiagramCommand>) -> Result<(), ErmError> {
        let kind = self.erm.kind(uuid).ok_or(ErmError::UnknownObject(*uuid))?;
        match kind {
            ObjectKind::Attribute => {
                let owner = self
                    .erm
                    .attribute_owner(uuid)
                    .ok_or(ErmError::UnknownObject(*uuid))?;
                let line = self
                    .erm
                    .attributes_of(&owner)
                    .into_iter()
                    .find(|(_, a)| a == uuid)
                    .map(|(l, _)| l);
                steps.push(self.erm.remove_attribute(&owner, uuid)?.lift());
                if let Some(line) = line {
                    steps.extend(self.gui.remove_line(&line).map(|c| c.lift()));
                }
            }
            ObjectKind::Entity => {
                self.remove_attributes(uuid, steps)?;
                let connections: BTreeSet<NodeUuid> = self
                    .erm
                    .lines_to(uuid)
                    .iter()
                    .filter_map(|l| self.erm.line(l).map(|e| e.origin))
                    .collect();
                for connection in connections {
                    let lines: Vec<LineUuid> = self
                        .erm
                        .lines_to(uuid)
                        .into_iter()
                        .filter(|l| self.erm.line(l).is_some_and(|e| e.origin == connection))
                        .collect();
                    steps.push(self.erm.remove_all_connections(&connection, uuid)?.lift());
                    for l in lines {
                        steps.extend(self.gui.remove_line(&l).map(|c| c.lift()));
                    }
                }
            }
            ObjectKind::Relation | ObjectKind::Generalization => {
                self.remove_attributes(uuid, steps)?;
                let mut lines: Vec<LineUuid> = self
                    .erm
                    .connections(uuid)
                    .into_iter()
                    .map(|(l, _, _)| l)
                    .collect();
                lines.extend(self.erm.superline(uuid).map(|(l, _)| l));
                for l in lines {
                    steps.push(self.erm.remove_connection(uuid, &l)?.lift());
                    steps.extend(self.gui.remove_line(&l).map(|c| c.lift()));
                }
            }
        }
        steps.push(self.erm.remove_object(uuid)?.lift());
        steps.extend(self.gui.remove_object(uuid).map(|c| c.lift()));
        Ok(())
    }

    fn remove_attributes(&mut self, owner: &NodeUuid, steps: &mut Vec<DiagramCommand>) -> Result<(), ErmError> {
        for (_, attribute) in self.erm.attributes_of(owner) {
            self.remove_steps(&attribute, steps)?;
        }
        Ok(())
    }

    // Moving

    /// Moves the selection by a view-space delta. Attributes travel with a
    /// selected owner, waypoints move only on lines whose both ends move,
    /// and redundant first/last waypoints of touched lines are pruned.
    pub fn shift_pos(&mut self, selection: &BTreeSet<NodeUuid>, delta: egui::Vec2) -> DiagramCommand {
        let delta = Point::truncated(delta / self.zoom).clamped();
        let mut steps: Vec<DiagramCommand> = Vec::new();
        let mut touched: BTreeSet<LineUuid> = BTreeSet::new();

        for uuid in selection {
            let Some(kind) = self.erm.kind(uuid) else {
                continue;
            };
            if self
                .erm
                .attribute_owner(uuid)
                .is_some_and(|owner| selection.contains(&owner))
            {
                continue;
            }
            steps.push(self.gui.shift_object(uuid, delta).lift());
            touched.extend(self.erm.lines_of(uuid));

            for (line, attribute) in self.erm.attributes_of(uuid) {
                steps.extend(self.gui.shift_points(&line, delta).map(|c| c.lift()));
                steps.push(self.gui.shift_object(&attribute, delta).lift());
            }
            if matches!(kind, ObjectKind::Relation | ObjectKind::Generalization) {
                let mut lines: Vec<(LineUuid, NodeUuid)> = self
                    .erm
                    .connections(uuid)
                    .into_iter()
                    .map(|(l, e, _)| (l, e))
                    .collect();
                lines.extend(self.erm.superline(uuid));
                for (line, entity) in lines {
                    if selection.contains(&entity) {
                        steps.extend(self.gui.shift_points(&line, delta).map(|c| c.lift()));
                    }
                }
            }
        }
        for line in &touched {
            steps.extend(self.gui.check_end_points(line).map(|c| c.lift()));
        }
        self.finish(steps, false, SelectionCheck::Never)
    }

    // Waypoints

    pub fn add_point(&mut self, line: &LineUuid, at: egui::Pos2, index: usize) -> Result<DiagramCommand, ErmError> {
        let step = self.gui.insert_point(line, index, self.model_point(at))?.lift();
        Ok(self.finish(vec![step], false, SelectionCheck::Never))
    }

    pub fn set_point(&mut self, line: &LineUuid, at: egui::Pos2, index: usize) -> Result<DiagramCommand, ErmError> {
        let step = self.gui.set_point(line, index, self.model_point(at))?.lift();
        Ok(self.finish(vec![step], false, SelectionCheck::Never))
    }

    pub fn remove_point(&mut self, line: &LineUuid, index: usize) -> Result<DiagramCommand, ErmError> {
        let step = self.gui.remove_point(line, index)?.lift();
        Ok(self.finish(vec![step], false, SelectionCheck::Never))
    }

    // Phantom

    pub fn begin_placement(&mut self, kind: ObjectKind, at: egui::Pos2) {
        self.phantom = Phantom::Placing { kind, at };
        self.notifier.notify_draw(false, false);
    }

    pub fn begin_point_edit(&mut self, info: PointInfo, at: egui::Pos2) {
        self.phantom = Phantom::EditingPoint { info, at };
        self.notifier.notify_draw(false, false);
    }

    pub fn move_phantom(&mut self, to: egui::Pos2) {
        match &mut self.phantom {
            Phantom::Idle => return,
            Phantom::Placing { at, .. } | Phantom::EditingPoint { at, .. } => *at = to,
        }
        self.notifier.notify_draw(false, false);
    }

    /// Drops the preview without producing a command.
    pub fn cancel_phantom(&mut self) {
        if std::mem::take(&mut self.phantom) != Phantom::Idle {
            self.notifier.notify_draw(false, false);
        }
    }

    /// Turns the preview into a command. Placed objects get the default
    /// names from the settings and connect to the selection; an attribute
    /// needs an entity or relation in the selection as its owner.
    pub fn commit_phantom(
        &mut self,
        selection: &BTreeSet<NodeUuid>,
    ) -> Result<Option<DiagramCommand>, ErmError> {
        match std::mem::take(&mut self.phantom) {
            Phantom::Idle => Ok(None),
            Phantom::Placing { kind, at } => match kind {
                ObjectKind::Entity => {
                    let name = self.settings.entity_name.clone();
                    self.new_entity_connected(&name, at, selection).map(Some)
                }
                ObjectKind::Attribute => {
                    let owner = self
                        .selected_of_kind(selection, &[ObjectKind::Entity, ObjectKind::Relation])
                        .next();
                    let Some(owner) = owner else {
                        tracing::warn!("attribute placement without an owner in the selection");
                        self.notifier.notify_draw(false, false);
                        return Ok(None);
                    };
                    let name = self.settings.attribute_name.clone();
                    self.new_attribute(&name, &owner, at).map(Some)
                }
                ObjectKind::Relation => {
                    let name = self.settings.relation_name.clone();
                    self.new_relation(&name, at, selection).map(Some)
                }
                ObjectKind::Generalization => self.new_generalization(at, selection).map(Some),
            },
            Phantom::EditingPoint { info, at } => {
                let command = self.release_point(&info, at);
                if !matches!(command, Ok(Some(_))) {
                    self.notifier.notify_draw(false, false);
                }
                command
            }
        }
    }

    // Drawing

    /// View-space points of a line with the drag offset applied to the
    /// moving ends, and the phantom point spliced in.
    fn view_line(
        &self,
        line: &LineUuid,
        offset_first: bool,
        offset_last: bool,
        offset: egui::Vec2,
    ) -> Option<Vec<egui::Pos2>> {
        let mut points: Vec<egui::Pos2> = self
            .gui
            .points(line)?
            .into_iter()
            .map(|p| self.view_point(p))
            .collect();
        if offset_first && offset_last {
            for p in points.iter_mut() {
                *p += offset;
            }
        } else if offset_first {
            points[0] += offset;
        } else if offset_last {
            let last = points.len() - 1;
            points[last] += offset;
        }
        Some(points)
    }

    fn splice_phantom(&self, line: &LineUuid, points: &mut Vec<egui::Pos2>) {
        if let Phantom::EditingPoint { info, at } = &self.phantom {
            if info.line == *line {
                if info.new_point {
                    if info.index <= points.len() {
                        points.insert(info.index, *at);
                    }
                } else if let Some(p) = points.get_mut(info.index) {
                    *p = *at;
                }
            }
        }
    }

    fn draw_lines(
        &self,
        canvas: &mut dyn DiagramCanvas,
        selection: &BTreeSet<NodeUuid>,
        offset: egui::Vec2,
    ) {
        for kind in [ObjectKind::Entity, ObjectKind::Relation] {
            for (owner, _) in self.erm.objects_of_kind(kind) {
                let selected = selection.contains(&owner);
                for (line, attribute) in self.erm.attributes_of(&owner) {
                    let last = selected || selection.contains(&attribute);
                    if let Some(mut points) = self.view_line(&line, selected, last, offset) {
                        self.splice_phantom(&line, &mut points);
                        self.notation.draw_line(canvas, &points);
                    }
                }
            }
        }
        for (relation, _) in self.erm.objects_of_kind(ObjectKind::Relation) {
            let selected = selection.contains(&relation);
            for (line, entity, cardinality) in self.erm.connections(&relation) {
                let last = selection.contains(&entity);
                if let Some(mut points) = self.view_line(&line, selected, last, offset) {
                    self.splice_phantom(&line, &mut points);
                    self.notation
                        .draw_cardinality_line(canvas, &points, self.zoom, cardinality);
                }
            }
        }
        for (generalization, _) in self.erm.objects_of_kind(ObjectKind::Generalization) {
            let selected = selection.contains(&generalization);
            if let Some((line, entity)) = self.erm.superline(&generalization) {
                let last = selection.contains(&entity);
                if let Some(mut points) = self.view_line(&line, selected, last, offset) {
                    // the superline leaves from the tip of the triangle
                    let area =
                        self.notation
                            .area(ObjectKind::Generalization, points[0], self.zoom);
                    points[0].y = area.top();
                    self.splice_phantom(&line, &mut points);
                    self.notation.draw_line(canvas, &points);
                }
            }
            for (line, entity, _) in self.erm.connections(&generalization) {
                let last = selection.contains(&entity);
                if let Some(mut points) = self.view_line(&line, selected, last, offset) {
                    self.splice_phantom(&line, &mut points);
                    self.notation.draw_line(canvas, &points);
                }
            }
        }
    }

    fn draw_objects(
        &self,
        canvas: &mut dyn DiagramCanvas,
        selection: &BTreeSet<NodeUuid>,
        offset: egui::Vec2,
    ) {
        let placed = |uuid: &NodeUuid, moving: bool| {
            self.gui.position(uuid).map(|p| {
                let v = self.view_point(p);
                if moving {
                    v + offset
                } else {
                    v
                }
            })
        };
        for kind in [ObjectKind::Entity, ObjectKind::Relation] {
            for (owner, object) in self.erm.objects_of_kind(kind) {
                let selected = selection.contains(&owner);
                if let Some(at) = placed(&owner, selected) {
                    let name = object.name().unwrap_or_default();
                    match kind {
                        ObjectKind::Entity => {
                            self.notation
                                .draw_entity(canvas, at, self.zoom, name, selected)
                        }
                        _ => self
                            .notation
                            .draw_relation(canvas, at, self.zoom, name, selected),
                    }
                }
                for (_, attribute) in self.erm.attributes_of(&owner) {
                    let attribute_selected = selection.contains(&attribute);
                    let Some(at) = placed(&attribute, selected || attribute_selected) else {
                        continue;
                    };
                    let Some(a) = self.erm.attribute(&attribute) else {
                        continue;
                    };
                    self.notation.draw_attribute(
                        canvas,
                        at,
                        self.zoom,
                        &a.name,
                        a.is_primary(),
                        attribute_selected,
                    );
                }
            }
        }
        for (generalization, _) in self.erm.objects_of_kind(ObjectKind::Generalization) {
            let selected = selection.contains(&generalization);
            if let Some(at) = placed(&generalization, selected) {
                self.notation
                    .draw_generalization(canvas, at, self.zoom, selected);
            }
        }
    }

    fn draw_phantom(&self, canvas: &mut dyn DiagramCanvas) {
        let Phantom::Placing { kind, at } = self.phantom else {
            return;
        };
        match kind {
            ObjectKind::Entity => self.notation.draw_entity(canvas, at, self.zoom, "", false),
            ObjectKind::Attribute => {
                self.notation
                    .draw_attribute(canvas, at, self.zoom, "", false, false)
            }
            ObjectKind::Relation => self.notation.draw_relation(canvas, at, self.zoom, "", false),
            ObjectKind::Generalization => {
                self.notation
                    .draw_generalization(canvas, at, self.zoom, false)
            }
        }
    }

    fn draw_grid(&self, canvas: &mut dyn DiagramCanvas, size: egui::Vec2) {
        let step = self.grid_size as f32 * self.zoom;
        if step <= 0.0 {
            return;
        }
        let origin = self.view_origin();
        let first = self.view_point(Point::new(
            origin.x / self.grid_size * self.grid_size,
            origin.y / self.grid_size * self.grid_size,
        ));
        let stroke = egui::Stroke::new(1.0, GRID_COLOR);
        let mut x = first.x;
        while x <= size.x {
            canvas.draw_line([egui::Pos2::new(x, 0.0), egui::Pos2::new(x, size.y)], stroke);
            x += step;
        }
        let mut y = first.y;
        while y <= size.y {
            canvas.draw_line([egui::Pos2::new(0.0, y), egui::Pos2::new(size.x, y)], stroke);
            y += step;
        }
    }

    /// Paints the whole board. Selected objects are drawn displaced by
    /// `selection_offset`, the drag preview.
    pub fn draw_board(
        &mut self,
        canvas: &mut dyn DiagramCanvas,
        selection: &BTreeSet<NodeUuid>,
        size: egui::Vec2,
        selection_offset: egui::Vec2,
    ) {
        let (min, max) = self.calc_view_dimension();
        let extent = egui::Vec2::new((max.x - min.x) as f32, (max.y - min.y) as f32) * self.zoom;
        canvas.draw_rectangle(
            egui::Rect::from_min_size(egui::Pos2::ZERO, size.max(extent)),
            egui::CornerRadius::ZERO,
            egui::Color32::WHITE,
            egui::Stroke::NONE,
        );
        if self.grid_show {
            self.draw_grid(canvas, size);
        }
        self.draw_lines(canvas, selection, selection_offset);
        self.draw_objects(canvas, selection, selection_offset);
        self.draw_phantom(canvas);
    }

    /// View-space extent of the lines and objects, or `None` for an empty board.
    pub fn board_bounds(&mut self) -> Option<egui::Rect> {
        self.calc_view_dimension();
        let mut canvas = MeasuringCanvas::new();
        let selection = BTreeSet::new();
        self.draw_lines(&mut canvas, &selection, egui::Vec2::ZERO);
        self.draw_objects(&mut canvas, &selection, egui::Vec2::ZERO);
        let bounds = canvas.bounds();
        bounds.is_positive().then_some(bounds)
    }

    fn svg_canvas(&mut self) -> SvgCanvas {
        let Some(bounds) = self.board_bounds() else {
            return SvgCanvas::new(egui::Vec2::ZERO, egui::Vec2::ZERO);
        };
        let margin = egui::Vec2::splat(SVG_MARGIN);
        let mut canvas = SvgCanvas::new(margin - bounds.min.to_vec2(), bounds.size() + 2.0 * margin);
        let selection = BTreeSet::new();
        self.draw_lines(&mut canvas, &selection, egui::Vec2::ZERO);
        self.draw_objects(&mut canvas, &selection, egui::Vec2::ZERO);
        canvas
    }

    pub fn to_svg_string(&mut self) -> String {
        self.svg_canvas().finish()
    }

    pub fn write_svg(&mut self, path: &std::path::Path) -> Result<(), std::io::Error> {
        self.svg_canvas().save_to(path)?;
        tracing::info!(path = %path.display(), "exported diagram as SVG");
        Ok(())
    }
}
