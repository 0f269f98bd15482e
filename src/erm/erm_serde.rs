use std::collections::HashMap;
use std::path::Path;

use crate::common::config::EditorSettings;
use crate::common::geometry::Point;
use crate::common::project_serde::{parse_document, write_document, ErmFileError, XmlElement};
use crate::common::uuid::{LineUuid, NodeUuid};

use super::chen_notation::NotationStyle;
use super::erm_controllers::GuiModel;
use super::erm_models::{
    Cardinality, ErmAttribute, ErmEntity, ErmError, ErmGeneralization, ErmObject, ErmRelation,
    ObjectKind,
};
use super::gui_models::GuiLine;

const ROOT: &str = "cheese";

fn structure(e: ErmError) -> ErmFileError {
    ErmFileError::StructureError(e.to_string())
}

fn position_children(element: XmlElement, p: Point) -> XmlElement {
    element
        .with_child(XmlElement::leaf("xPos", p.x))
        .with_child(XmlElement::leaf("yPos", p.y))
}

fn read_position(element: &XmlElement) -> Result<Point, ErmFileError> {
    let position = Point::new(element.child_parse("xPos")?, element.child_parse("yPos")?);
    if !position.in_bounds() {
        return Err(ErmFileError::StructureError(format!(
            "position {position:?} of <{}> is out of range",
            element.name
        )));
    }
    Ok(position)
}

fn waypoints_element(waypoints: &[Point]) -> Option<XmlElement> {
    if waypoints.is_empty() {
        return None;
    }
    let mut line = XmlElement::new("line");
    for (i, p) in waypoints.iter().enumerate() {
        line.push(position_children(
            XmlElement::new("point").with_attribute("key", i + 1),
            *p,
        ));
    }
    Some(line)
}

fn read_waypoints(element: &XmlElement) -> Result<Vec<Point>, ErmFileError> {
    match element.child("line") {
        Some(line) => line.children_named("point").map(read_position).collect(),
        None => Ok(Vec::new()),
    }
}

/// Document ids handed out while exporting.
#[derive(Default)]
struct IdTable {
    ids: HashMap<NodeUuid, usize>,
}

impl IdTable {
    fn id(&mut self, uuid: NodeUuid) -> usize {
        let next = self.ids.len() + 1;
        *self.ids.entry(uuid).or_insert(next)
    }
}

impl GuiModel {
    fn waypoints_of(&self, line: &LineUuid) -> &[Point] {
        self.gui.line(line).map(|l| l.waypoints()).unwrap_or_default()
    }

    fn object_element(&self, tag: &str, uuid: NodeUuid, ids: &mut IdTable) -> XmlElement {
        let mut element = XmlElement::new(tag).with_attribute("id", ids.id(uuid));
        if let Some(name) = self.erm.name(&uuid) {
            element.push(XmlElement::leaf("name", name));
        }
        position_children(element, self.gui.position(&uuid).unwrap_or(Point::ZERO))
    }

    fn push_attributes(&self, element: &mut XmlElement, owner: &NodeUuid, ids: &mut IdTable) {
        for (line, attribute) in self.erm.attributes_of(owner) {
            let mut a = self
                .object_element("attribute", attribute, ids)
                .with_child(XmlElement::leaf(
                    "primary",
                    self.erm.is_primary(&attribute).unwrap_or_default(),
                ));
            if let Some(points) = waypoints_element(self.waypoints_of(&line)) {
                a.push(points);
            }
            element.push(a);
        }
    }

    fn link_element(&self, tag: &str, line: &LineUuid, entity: NodeUuid, ids: &mut IdTable) -> XmlElement {
        let mut element = XmlElement::new(tag).with_child(XmlElement::leaf("entityID", ids.id(entity)));
        if let Some(points) = waypoints_element(self.waypoints_of(line)) {
            element.push(points);
        }
        element
    }

    /// The whole diagram as a `cheese` document tree. Ids are only
    /// meaningful within one document.
    pub fn to_xml(&self) -> XmlElement {
        let mut ids = IdTable::default();
        let mut root = XmlElement::new(ROOT).with_attribute("fontSize", self.font_size());

        for (entity, _) in self.erm.objects_of_kind(ObjectKind::Entity) {
            let mut element = self.object_element("entity", entity, &mut ids);
            self.push_attributes(&mut element, &entity, &mut ids);
            root.push(element);
        }
        for (relation, _) in self.erm.objects_of_kind(ObjectKind::Relation) {
            let mut element = self.object_element("relation", relation, &mut ids);
            for (line, entity, cardinality) in self.erm.connections(&relation) {
                let mut link = self.link_element("entity", &line, entity, &mut ids);
                link.attributes
                    .push(("cardinality".to_owned(), cardinality.file_name().to_owned()));
                element.push(link);
            }
            self.push_attributes(&mut element, &relation, &mut ids);
            root.push(element);
        }
        for (generalization, _) in self.erm.objects_of_kind(ObjectKind::Generalization) {
            let mut element = self.object_element("generalization", generalization, &mut ids);
            if let Some((line, entity)) = self.erm.superline(&generalization) {
                element.push(self.link_element("superentity", &line, entity, &mut ids));
            }
            for (line, entity, _) in self.erm.connections(&generalization) {
                element.push(self.link_element("subentity", &line, entity, &mut ids));
            }
            root.push(element);
        }
        root
    }

    pub fn to_xml_string(&self) -> Result<String, ErmFileError> {
        write_document(&self.to_xml())
    }

    pub fn write_xml(&self, path: &Path) -> Result<(), ErmFileError> {
        std::fs::write(path, self.to_xml_string()?)?;
        tracing::info!(path = %path.display(), objects = self.erm.object_count(), "saved diagram");
        Ok(())
    }

    fn load_object(
        &mut self,
        uuid: NodeUuid,
        object: ErmObject,
        element: &XmlElement,
    ) -> Result<(), ErmFileError> {
        let kind = object.kind();
        let position = read_position(element)?;
        self.erm.insert_object(uuid, object);
        self.gui.insert_object(uuid, kind, position);
        Ok(())
    }

    fn load_attributes(&mut self, owner: NodeUuid, element: &XmlElement) -> Result<(), ErmFileError> {
        for a in element.children_named("attribute") {
            let primary = a.child_text("primary")?.trim() == "true";
            let attribute = ErmAttribute::new(a.child_text("name")?, owner).with_primary_key(primary);
            let uuid = NodeUuid::now_v7();
            let line = LineUuid::now_v7();
            self.load_object(uuid, attribute.into(), a)?;
            self.erm.add_attribute(&owner, line, &uuid).map_err(structure)?;
            self.gui
                .insert_line(line, GuiLine::new(owner, uuid).with_waypoints(read_waypoints(a)?));
        }
        Ok(())
    }

    fn load_link(
        &mut self,
        connection: NodeUuid,
        element: &XmlElement,
        entities: &HashMap<String, NodeUuid>,
    ) -> Result<(LineUuid, NodeUuid), ErmFileError> {
        let id = element.child_text("entityID")?.trim();
        let entity = *entities.get(id).ok_or_else(|| {
            ErmFileError::StructureError(format!("<{}> refers to unknown entity {:?}", element.name, id))
        })?;
        let line = LineUuid::now_v7();
        self.gui.insert_line(
            line,
            GuiLine::new(connection, entity).with_waypoints(read_waypoints(element)?),
        );
        Ok((line, entity))
    }

    /// Builds a diagram from a `cheese` document. Entities are read first so
    /// that relations and generalizations can refer to them by id.
    pub fn from_xml(
        root: &XmlElement,
        notation: Box<dyn NotationStyle>,
        settings: EditorSettings,
    ) -> Result<Self, ErmFileError> {
        if root.name != ROOT {
            return Err(ErmFileError::StructureError(format!(
                "unexpected root element <{}>",
                root.name
            )));
        }
        let mut model = GuiModel::new(notation, settings);
        if let Some(size) = root.attribute("fontSize") {
            let size: u32 = size.trim().parse().map_err(|_| {
                ErmFileError::StructureError(format!("invalid font size {size:?}"))
            })?;
            model.set_font_size(size);
        }

        let mut entities: HashMap<String, NodeUuid> = HashMap::new();
        for element in root.children_named("entity") {
            let id = element
                .attribute("id")
                .ok_or_else(|| ErmFileError::StructureError("<entity> without id".to_owned()))?;
            let uuid = NodeUuid::now_v7();
            if entities.insert(id.to_owned(), uuid).is_some() {
                return Err(ErmFileError::StructureError(format!("duplicate entity id {id:?}")));
            }
            model.load_object(uuid, ErmEntity::new(element.child_text("name")?).into(), element)?;
            model.load_attributes(uuid, element)?;
        }

        for element in root.children_named("relation") {
            let uuid = NodeUuid::now_v7();
            model.load_object(uuid, ErmRelation::new(element.child_text("name")?).into(), element)?;
            for link in element.children_named("entity") {
                let cardinality = link.attribute("cardinality").unwrap_or_default();
                let cardinality = Cardinality::from_file_name(cardinality).ok_or_else(|| {
                    ErmFileError::StructureError(format!("unknown cardinality {cardinality:?}"))
                })?;
                let (line, entity) = model.load_link(uuid, link, &entities)?;
                model
                    .erm
                    .add_connection(&uuid, line, &entity, cardinality)
                    .map_err(structure)?;
            }
            model.load_attributes(uuid, element)?;
        }

        for element in root.children_named("generalization") {
            let uuid = NodeUuid::now_v7();
            model.load_object(uuid, ErmGeneralization::new().into(), element)?;
            for link in element.children_named("subentity") {
                let (line, entity) = model.load_link(uuid, link, &entities)?;
                model
                    .erm
                    .add_connection(&uuid, line, &entity, Cardinality::One)
                    .map_err(structure)?;
            }
            if let Some(link) = element.child("superentity") {
                let next = model.load_link(uuid, link, &entities)?;
                if model.erm.has_connection(&uuid, &next.1) {
                    return Err(ErmFileError::StructureError(format!(
                        "entity {} is both supertype and subtype of generalization {}",
                        link.child_text("entityID")?,
                        element.attribute("id").unwrap_or_default()
                    )));
                }
                model.erm.set_superentity(&uuid, Some(next)).map_err(structure)?;
            }
        }
        Ok(model)
    }

    pub fn from_xml_str(
        source: &str,
        notation: Box<dyn NotationStyle>,
        settings: EditorSettings,
    ) -> Result<Self, ErmFileError> {
        Self::from_xml(&parse_document(source)?, notation, settings)
    }

    pub fn read_xml(
        path: &Path,
        notation: Box<dyn NotationStyle>,
        settings: EditorSettings,
    ) -> Result<Self, ErmFileError> {
        let source = std::fs::read_to_string(path)?;
        let model = Self::from_xml_str(&source, notation, settings)?;
        tracing::info!(path = %path.display(), objects = model.erm.object_count(), "loaded diagram");
        Ok(model)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::erm::chen_notation::ChenNotation;
    use crate::erm::erm_controllers::test::{entity_at, plain_model, pos};
    use crate::erm::erm_controllers::DiagramHistory;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    /// Order-independent description of a diagram, without uuids.
    fn snapshot(model: &GuiModel) -> Vec<String> {
        let erm = model.erm();
        let gui = model.gui();
        let name = |u: &NodeUuid| erm.name(u).unwrap_or_default().to_owned();
        let waypoints = |l: &LineUuid| format!("{:?}", gui.line(l).map(|l| l.waypoints().to_vec()));
        let mut out = Vec::new();
        for kind in [ObjectKind::Entity, ObjectKind::Relation, ObjectKind::Generalization] {
            for (uuid, _) in erm.objects_of_kind(kind) {
                let mut parts = vec![format!("{:?} {:?} {:?}", kind, name(&uuid), gui.position(&uuid))];
                let mut details = Vec::new();
                for (line, a) in erm.attributes_of(&uuid) {
                    details.push(format!(
                        "attr {:?} {:?} {:?} {}",
                        name(&a),
                        erm.is_primary(&a),
                        gui.position(&a),
                        waypoints(&line)
                    ));
                }
                for (line, e, c) in erm.connections(&uuid) {
                    details.push(format!("link {:?} {:?} {}", name(&e), c, waypoints(&line)));
                }
                if let Some((line, e)) = erm.superline(&uuid) {
                    details.push(format!("super {:?} {}", name(&e), waypoints(&line)));
                }
                details.sort();
                parts.extend(details);
                out.push(parts.join("; "));
            }
        }
        out.sort();
        out
    }

    fn sample() -> GuiModel {
        let mut model = plain_model();
        let person = entity_at(&mut model, "Person", 100.0, 100.0);
        let shop = entity_at(&mut model, "Fish & Chips <Ltd>", 600.0, 100.0);
        let child = entity_at(&mut model, "Child", 100.0, 500.0);
        model.new_attribute("id", &person, pos(100.0, 0.0)).unwrap();
        let id = model.last_created().unwrap();
        model.set_primary(&id, true).unwrap();
        model.new_attribute("age", &person, pos(-100.0, 50.0)).unwrap();
        let age = model.last_created().unwrap();
        let (age_line, _) = model
            .erm()
            .attributes_of(&person)
            .into_iter()
            .find(|(_, a)| *a == age)
            .unwrap();
        model.add_point(&age_line, pos(-50.0, 120.0), 1).unwrap();

        model
            .new_relation("buys at", pos(350.0, 100.0), &BTreeSet::from([person, shop]))
            .unwrap();
        let r = model.last_created().unwrap();
        let (line, _, _) = model.erm().connections(&r)[0];
        model.set_cardinality(&r, &line, Cardinality::MultOpt).unwrap();
        model.add_point(&line, pos(300.0, 300.0), 1).unwrap();
        model.add_point(&line, pos(320.0, 320.0), 2).unwrap();
        model.new_attribute("since", &r, pos(350.0, 0.0)).unwrap();

        model
            .new_generalization(pos(100.0, 300.0), &BTreeSet::from([child]))
            .unwrap();
        let g = model.last_created().unwrap();
        model.set_supertype(&g, Some(&person)).unwrap();
        model.new_generalization(pos(600.0, 300.0), &BTreeSet::new()).unwrap();
        model.increase_font_size();
        model
    }

    #[test]
    fn test_round_trip_keeps_structure() {
        let model = sample();
        let xml = model.to_xml_string().unwrap();
        let loaded =
            GuiModel::from_xml_str(&xml, Box::new(ChenNotation::default()), EditorSettings::default())
                .unwrap();
        assert_eq!(snapshot(&loaded), snapshot(&model));
        assert_eq!(loaded.font_size(), 17);
        assert_eq!(loaded.notation().font_size(), 17.0);
        assert_eq!(loaded.erm().line_count(), model.erm().line_count());
        assert_eq!(loaded.gui().lines().count(), model.gui().lines().count());
    }

    #[test]
    fn test_document_layout() {
        let model = sample();
        let root = model.to_xml();
        assert_eq!(root.name, "cheese");
        assert_eq!(root.attribute("fontSize"), Some("17"));
        let names: Vec<&str> = root.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["entity", "entity", "entity", "relation", "generalization", "generalization"]
        );

        let relation = root.child("relation").unwrap();
        assert_eq!(relation.child_text("name").unwrap(), "buys at");
        let links: Vec<&XmlElement> = relation.children_named("entity").collect();
        assert_eq!(links.len(), 2);
        assert!(links
            .iter()
            .any(|l| l.attribute("cardinality") == Some("MULT_OPT")
                && l.child("line").unwrap().children_named("point").count() == 2));
        assert_eq!(relation.children_named("attribute").count(), 1);

        let generalizations: Vec<&XmlElement> = root.children_named("generalization").collect();
        assert!(generalizations[0].child("name").is_none());
        assert!(generalizations
            .iter()
            .any(|g| g.child("superentity").is_some() && g.children_named("subentity").count() == 1));

        let attribute = root
            .children_named("entity")
            .flat_map(|e| e.children_named("attribute"))
            .find(|a| a.child_text("name").unwrap() == "age")
            .unwrap();
        assert_eq!(attribute.child_text("primary").unwrap(), "false");
        let point = attribute.child("line").unwrap().child("point").unwrap();
        assert_eq!(point.attribute("key"), Some("1"));
        assert_eq!(point.child_parse::<i32>("xPos").unwrap(), -50);
    }

    #[test]
    fn test_undo_all_then_redo_all_restores_document() {
        let mut model = plain_model();
        let mut history = DiagramHistory::new();
        let a = entity_at(&mut model, "A", 0.0, 0.0);
        let start = model.to_xml_string().unwrap();

        let b = model.new_entity("B", pos(400.0, 0.0));
        let b_uuid = model.last_created().unwrap();
        let commands = vec![
            b,
            model
                .new_relation("r", pos(200.0, 0.0), &BTreeSet::from([a, b_uuid]))
                .unwrap(),
            model.new_attribute("x", &a, pos(0.0, 100.0)).unwrap(),
            model.shift_pos(&BTreeSet::from([a]), egui::Vec2::new(50.0, 50.0)),
            model.remove(&BTreeSet::from([b_uuid])).unwrap(),
        ];
        for command in commands {
            history.record(command);
        }
        let end = model.to_xml_string().unwrap();

        while history.undo(&mut model) {}
        assert_eq!(model.to_xml_string().unwrap(), start);
        while history.redo(&mut model) {}
        assert_eq!(model.to_xml_string().unwrap(), end);
    }

    #[test]
    fn test_reading_rejects_bad_documents() {
        let load = |s: &str| {
            GuiModel::from_xml_str(s, Box::new(ChenNotation::default()), EditorSettings::default())
        };
        assert!(matches!(load("<diagram/>"), Err(ErmFileError::StructureError(_))));
        assert!(matches!(load("<cheese><entity"), Err(ErmFileError::Xml(_))));
        assert!(matches!(
            load("<cheese><relation id=\"1\"><name>r</name><xPos>0</xPos><yPos>0</yPos>\
                  <entity cardinality=\"ONE\"><entityID>9</entityID></entity></relation></cheese>"),
            Err(ErmFileError::StructureError(_))
        ));
        assert!(matches!(
            load("<cheese><entity id=\"1\"><name>e</name><xPos>zero</xPos><yPos>0</yPos></entity></cheese>"),
            Err(ErmFileError::StructureError(_))
        ));

        assert!(matches!(
            load("<cheese><entity id=\"1\"><name>e</name><xPos>0</xPos><yPos>0</yPos></entity>\
                  <generalization id=\"2\"><xPos>0</xPos><yPos>100</yPos>\
                  <superentity><entityID>1</entityID></superentity>\
                  <subentity><entityID>1</entityID></subentity></generalization></cheese>"),
            Err(ErmFileError::StructureError(_))
        ));
        assert!(matches!(
            load("<cheese><entity id=\"1\"><name>e</name><xPos>2147483600</xPos><yPos>0</yPos></entity></cheese>"),
            Err(ErmFileError::StructureError(_))
        ));

        let model = load("<cheese fontSize=\"12\"><entity id=\"1\"><name>e</name><xPos>5</xPos><yPos>6</yPos></entity></cheese>").unwrap();
        assert_eq!(model.erm().object_count(), 1);
        let (uuid, _) = model.erm().objects_of_kind(ObjectKind::Entity).next().unwrap();
        assert_eq!(model.gui().position(&uuid), Some(Point::new(5, 6)));
    }

    #[test]
    fn test_write_and_read_file() {
        let model = sample();
        let path = std::env::temp_dir().join(format!("erm-board-{}.xml", NodeUuid::now_v7()));
        model.write_xml(&path).unwrap();
        let loaded =
            GuiModel::read_xml(&path, Box::new(ChenNotation::default()), EditorSettings::default())
                .unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(snapshot(&loaded), snapshot(&model));
        assert!(matches!(
            GuiModel::read_xml(&path, Box::new(ChenNotation::default()), EditorSettings::default()),
            Err(ErmFileError::Io(_))
        ));
    }
}
