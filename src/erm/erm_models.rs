use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::common::command::{Command, Reversible};
use crate::common::uuid::{LineUuid, NodeUuid};

/// Participation of an entity in a relation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Cardinality {
    One,
    Optional,
    Multiple,
    MultOpt,
}

impl Cardinality {
    pub const ALL: [Self; 4] = [Self::One, Self::Optional, Self::Multiple, Self::MultOpt];

    /// Name used in diagram files.
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::One => "ONE",
            Self::Optional => "OPTIONAL",
            Self::Multiple => "MULTIPLE",
            Self::MultOpt => "MULT_OPT",
        }
    }

    pub fn from_file_name(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.file_name() == s)
    }

    /// Chen label drawn next to the line.
    pub fn label(&self) -> &'static str {
        match self {
            Self::One => "1",
            Self::Optional => "c",
            Self::Multiple => "m",
            Self::MultOpt => "cm",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    Entity,
    Attribute,
    Relation,
    Generalization,
}

impl ObjectKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Entity => "entity",
            Self::Attribute => "attribute",
            Self::Relation => "relation",
            Self::Generalization => "generalization",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErmError {
    UnknownObject(NodeUuid),
    UnknownLine(LineUuid),
    WrongKind {
        uuid: NodeUuid,
        expected: &'static str,
    },
    NotConnected {
        connection: NodeUuid,
        entity: NodeUuid,
    },
    NotOwned {
        owner: NodeUuid,
        attribute: NodeUuid,
    },
    AlreadySuperentity {
        generalization: NodeUuid,
        entity: NodeUuid,
    },
    /// The object still has lines and cannot be removed on its own.
    StillConnected(NodeUuid),
    LineInUse(LineUuid),
    NoSuchPoint {
        line: LineUuid,
        index: usize,
    },
}

impl std::fmt::Display for ErmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownObject(uuid) => write!(f, "no object {uuid}"),
            Self::UnknownLine(uuid) => write!(f, "no line {uuid}"),
            Self::WrongKind { uuid, expected } => write!(f, "{uuid} is not {expected}"),
            Self::NotConnected { connection, entity } => {
                write!(f, "entity {entity} is not connected to {connection}")
            }
            Self::NotOwned { owner, attribute } => {
                write!(f, "attribute {attribute} does not belong to {owner}")
            }
            Self::AlreadySuperentity {
                generalization,
                entity,
            } => write!(f, "entity {entity} already is the supertype of {generalization}"),
            Self::StillConnected(uuid) => write!(f, "{uuid} still has lines"),
            Self::LineInUse(uuid) => write!(f, "line {uuid} already exists"),
            Self::NoSuchPoint { line, index } => write!(f, "line {line} has no point {index}"),
        }
    }
}

impl std::error::Error for ErmError {}

#[derive(Clone, Debug, PartialEq)]
pub struct ErmEntity {
    pub name: String,
    attributes: BTreeSet<LineUuid>,
}

impl ErmEntity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeSet::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ErmAttribute {
    pub name: String,
    primary_key: bool,
    owner: NodeUuid,
}

impl ErmAttribute {
    pub fn new(name: impl Into<String>, owner: NodeUuid) -> Self {
        Self {
            name: name.into(),
            primary_key: false,
            owner,
        }
    }

    pub fn with_primary_key(self, primary_key: bool) -> Self {
        Self {
            primary_key,
            ..self
        }
    }

    pub fn is_primary(&self) -> bool {
        self.primary_key
    }
    pub fn owner(&self) -> NodeUuid {
        self.owner
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ErmRelation {
    pub name: String,
    attributes: BTreeSet<LineUuid>,
    entities: BTreeMap<LineUuid, Cardinality>,
}

impl ErmRelation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeSet::new(),
            entities: BTreeMap::new(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ErmGeneralization {
    subentities: BTreeSet<LineUuid>,
    superentity: Option<LineUuid>,
}

impl ErmGeneralization {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Clone, Debug, PartialEq, derive_more::From)]
pub enum ErmObject {
    Entity(ErmEntity),
    Attribute(ErmAttribute),
    Relation(ErmRelation),
    Generalization(ErmGeneralization),
}

impl ErmObject {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Entity(_) => ObjectKind::Entity,
            Self::Attribute(_) => ObjectKind::Attribute,
            Self::Relation(_) => ObjectKind::Relation,
            Self::Generalization(_) => ObjectKind::Generalization,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Entity(e) => Some(&e.name),
            Self::Attribute(a) => Some(&a.name),
            Self::Relation(r) => Some(&r.name),
            Self::Generalization(_) => None,
        }
    }

    fn name_mut(&mut self) -> Option<&mut String> {
        match self {
            Self::Entity(e) => Some(&mut e.name),
            Self::Attribute(a) => Some(&mut a.name),
            Self::Relation(r) => Some(&mut r.name),
            Self::Generalization(_) => None,
        }
    }

    fn attributes_mut(&mut self) -> Option<&mut BTreeSet<LineUuid>> {
        match self {
            Self::Entity(e) => Some(&mut e.attributes),
            Self::Relation(r) => Some(&mut r.attributes),
            _ => None,
        }
    }
}

/// Edge record; `origin` is the owner or connection,
/// `destination` the attribute or entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ErmLine {
    pub origin: NodeUuid,
    pub destination: NodeUuid,
}

#[derive(Clone, Debug)]
pub enum ErmEdit {
    InsertObject {
        uuid: NodeUuid,
        object: ErmObject,
    },
    RemoveObject {
        uuid: NodeUuid,
        object: ErmObject,
    },
    Rename {
        uuid: NodeUuid,
        before: String,
        after: String,
    },
    SetPrimary {
        attribute: NodeUuid,
        before: bool,
        after: bool,
    },
    AddAttribute {
        owner: NodeUuid,
        line: LineUuid,
        attribute: NodeUuid,
    },
    RemoveAttribute {
        owner: NodeUuid,
        line: LineUuid,
        attribute: NodeUuid,
    },
    AddConnection {
        connection: NodeUuid,
        line: LineUuid,
        entity: NodeUuid,
        cardinality: Cardinality,
        /// The line was the superline of the generalization and is demoted.
        was_super: bool,
    },
    RemoveConnection {
        connection: NodeUuid,
        line: LineUuid,
        entity: NodeUuid,
        cardinality: Cardinality,
        was_super: bool,
    },
    SetCardinality {
        relation: NodeUuid,
        line: LineUuid,
        before: Cardinality,
        after: Cardinality,
    },
    SetSuperentity {
        generalization: NodeUuid,
        previous: Option<(LineUuid, NodeUuid)>,
        next: Option<(LineUuid, NodeUuid)>,
        /// The next superline was a sub line and is promoted.
        was_sub: bool,
    },
}

pub type ErmCommand = Command<ErmEdit>;

/// The semantic graph: objects, edges, and an index of edges per node.
#[derive(Clone, Debug, Default)]
pub struct ErmGraph {
    objects: BTreeMap<NodeUuid, ErmObject>,
    lines: BTreeMap<LineUuid, ErmLine>,
    incident: BTreeMap<NodeUuid, BTreeSet<LineUuid>>,
}

impl ErmGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, uuid: &NodeUuid) -> bool {
        self.objects.contains_key(uuid)
    }
    pub fn object(&self, uuid: &NodeUuid) -> Option<&ErmObject> {
        self.objects.get(uuid)
    }
    pub fn kind(&self, uuid: &NodeUuid) -> Option<ObjectKind> {
        self.objects.get(uuid).map(|o| o.kind())
    }
    pub fn name(&self, uuid: &NodeUuid) -> Option<&str> {
        self.objects.get(uuid).and_then(|o| o.name())
    }
    pub fn line(&self, line: &LineUuid) -> Option<&ErmLine> {
        self.lines.get(line)
    }
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn objects_of_kind(
        &self,
        kind: ObjectKind,
    ) -> impl Iterator<Item = (NodeUuid, &ErmObject)> + '_ {
        self.objects
            .iter()
            .filter(move |(_, o)| o.kind() == kind)
            .map(|(k, o)| (*k, o))
    }

    /// Every line touching the node, whichever end it is on.
    pub fn lines_of(&self, uuid: &NodeUuid) -> impl Iterator<Item = LineUuid> + '_ {
        self.incident.get(uuid).into_iter().flatten().copied()
    }

    /// Lines whose destination is the node.
    pub fn lines_to(&self, uuid: &NodeUuid) -> Vec<LineUuid> {
        self.lines_of(uuid)
            .filter(|l| self.lines.get(l).is_some_and(|e| e.destination == *uuid))
            .collect()
    }

    pub fn attribute(&self, uuid: &NodeUuid) -> Option<&ErmAttribute> {
        match self.objects.get(uuid) {
            Some(ErmObject::Attribute(a)) => Some(a),
            _ => None,
        }
    }
    pub fn is_primary(&self, attribute: &NodeUuid) -> Option<bool> {
        self.attribute(attribute).map(|a| a.primary_key)
    }
    pub fn attribute_owner(&self, attribute: &NodeUuid) -> Option<NodeUuid> {
        self.attribute(attribute).map(|a| a.owner)
    }

    /// Attribute lines of an entity or relation, with the attribute at the far end.
    pub fn attributes_of(&self, owner: &NodeUuid) -> Vec<(LineUuid, NodeUuid)> {
        let set = match self.objects.get(owner) {
            Some(ErmObject::Entity(e)) => &e.attributes,
            Some(ErmObject::Relation(r)) => &r.attributes,
            _ => return Vec::new(),
        };
        set.iter()
            .filter_map(|l| self.lines.get(l).map(|e| (*l, e.destination)))
            .collect()
    }

    /// Entity lines of a relation, or sub lines of a generalization.
    pub fn connections(&self, connection: &NodeUuid) -> Vec<(LineUuid, NodeUuid, Cardinality)> {
        match self.objects.get(connection) {
            Some(ErmObject::Relation(r)) => r
                .entities
                .iter()
                .filter_map(|(l, c)| self.lines.get(l).map(|e| (*l, e.destination, *c)))
                .collect(),
            Some(ErmObject::Generalization(g)) => g
                .subentities
                .iter()
                .filter_map(|l| {
                    self.lines
                        .get(l)
                        .map(|e| (*l, e.destination, Cardinality::One))
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn cardinality(&self, relation: &NodeUuid, line: &LineUuid) -> Option<Cardinality> {
        match self.objects.get(relation) {
            Some(ErmObject::Relation(r)) => r.entities.get(line).copied(),
            _ => None,
        }
    }

    pub fn superline(&self, generalization: &NodeUuid) -> Option<(LineUuid, NodeUuid)> {
        match self.objects.get(generalization) {
            Some(ErmObject::Generalization(g)) => g
                .superentity
                .and_then(|l| self.lines.get(&l).map(|e| (l, e.destination))),
            _ => None,
        }
    }
    pub fn has_superline(&self, generalization: &NodeUuid) -> bool {
        self.superline(generalization).is_some()
    }
    pub fn is_superentity(&self, generalization: &NodeUuid, entity: &NodeUuid) -> bool {
        self.superline(generalization)
            .is_some_and(|(_, e)| e == *entity)
    }

    /// On a generalization only sub lines count.
    pub fn has_connection(&self, connection: &NodeUuid, entity: &NodeUuid) -> bool {
        self.connections(connection)
            .iter()
            .any(|(_, e, _)| e == entity)
    }

    fn expect_kind(&self, uuid: &NodeUuid, kinds: &[ObjectKind]) -> Result<ObjectKind, ErmError> {
        let kind = self.kind(uuid).ok_or(ErmError::UnknownObject(*uuid))?;
        if kinds.contains(&kind) {
            Ok(kind)
        } else {
            let expected = match kinds {
                [ObjectKind::Entity] => "an entity",
                [ObjectKind::Attribute] => "an attribute",
                [ObjectKind::Relation] => "a relation",
                [ObjectKind::Generalization] => "a generalization",
                [ObjectKind::Entity, ObjectKind::Relation] => "an entity or relation",
                [ObjectKind::Relation, ObjectKind::Generalization] => "a connection",
                _ => "named",
            };
            Err(ErmError::WrongKind {
                uuid: *uuid,
                expected,
            })
        }
    }

    fn link(&mut self, uuid: LineUuid, line: ErmLine) {
        self.incident.entry(line.origin).or_default().insert(uuid);
        self.incident.entry(line.destination).or_default().insert(uuid);
        self.lines.insert(uuid, line);
    }

    fn unlink(&mut self, uuid: &LineUuid) {
        let Some(line) = self.lines.remove(uuid) else {
            return;
        };
        for node in [line.origin, line.destination] {
            if let Some(set) = self.incident.get_mut(&node) {
                set.remove(uuid);
                if set.is_empty() {
                    self.incident.remove(&node);
                }
            }
        }
    }

    fn apply(&mut self, edit: ErmEdit) -> ErmCommand {
        edit.redo(self);
        Command::Edit(edit)
    }

    pub fn insert_object(&mut self, uuid: NodeUuid, object: impl Into<ErmObject>) -> ErmCommand {
        self.apply(ErmEdit::InsertObject {
            uuid,
            object: object.into(),
        })
    }

    /// Removes an object that no longer has lines attached.
    pub fn remove_object(&mut self, uuid: &NodeUuid) -> Result<ErmCommand, ErmError> {
        let object = self
            .objects
            .get(uuid)
            .ok_or(ErmError::UnknownObject(*uuid))?
            .clone();
        if self.lines_of(uuid).next().is_some() {
            return Err(ErmError::StillConnected(*uuid));
        }
        Ok(self.apply(ErmEdit::RemoveObject { uuid: *uuid, object }))
    }

    pub fn rename(&mut self, uuid: &NodeUuid, name: impl Into<String>) -> Result<ErmCommand, ErmError> {
        let before = self
            .objects
            .get(uuid)
            .ok_or(ErmError::UnknownObject(*uuid))?
            .name()
            .ok_or(ErmError::WrongKind {
                uuid: *uuid,
                expected: "named",
            })?
            .to_owned();
        Ok(self.apply(ErmEdit::Rename {
            uuid: *uuid,
            before,
            after: name.into(),
        }))
    }

    pub fn set_primary(&mut self, attribute: &NodeUuid, primary: bool) -> Result<ErmCommand, ErmError> {
        self.expect_kind(attribute, &[ObjectKind::Attribute])?;
        let before = self.is_primary(attribute).unwrap_or_default();
        Ok(self.apply(ErmEdit::SetPrimary {
            attribute: *attribute,
            before,
            after: primary,
        }))
    }

    pub fn add_attribute(
        &mut self,
        owner: &NodeUuid,
        line: LineUuid,
        attribute: &NodeUuid,
    ) -> Result<ErmCommand, ErmError> {
        self.expect_kind(owner, &[ObjectKind::Entity, ObjectKind::Relation])?;
        self.expect_kind(attribute, &[ObjectKind::Attribute])?;
        if self.attribute_owner(attribute) != Some(*owner) {
            return Err(ErmError::NotOwned {
                owner: *owner,
                attribute: *attribute,
            });
        }
        Ok(self.apply(ErmEdit::AddAttribute {
            owner: *owner,
            line,
            attribute: *attribute,
        }))
    }

    pub fn remove_attribute(&mut self, owner: &NodeUuid, attribute: &NodeUuid) -> Result<ErmCommand, ErmError> {
        let (line, _) = self
            .attributes_of(owner)
            .into_iter()
            .find(|(_, a)| a == attribute)
            .ok_or(ErmError::NotOwned {
                owner: *owner,
                attribute: *attribute,
            })?;
        Ok(self.apply(ErmEdit::RemoveAttribute {
            owner: *owner,
            line,
            attribute: *attribute,
        }))
    }

    /// Connects an entity. On a generalization, passing its current superline
    /// demotes the supertype to a subtype on the same line; cardinality is
    /// ignored there.
    pub fn add_connection(
        &mut self,
        connection: &NodeUuid,
        line: LineUuid,
        entity: &NodeUuid,
        cardinality: Cardinality,
    ) -> Result<ErmCommand, ErmError> {
        let kind = self.expect_kind(connection, &[ObjectKind::Relation, ObjectKind::Generalization])?;
        self.expect_kind(entity, &[ObjectKind::Entity])?;
        let was_super = kind == ObjectKind::Generalization
            && self.superline(connection).is_some_and(|(l, _)| l == line);
        if !was_super {
            if self.lines.contains_key(&line) {
                return Err(ErmError::LineInUse(line));
            }
        }
        let cardinality = match kind {
            ObjectKind::Generalization => Cardinality::One,
            _ => cardinality,
        };
        Ok(self.apply(ErmEdit::AddConnection {
            connection: *connection,
            line,
            entity: *entity,
            cardinality,
            was_super,
        }))
    }

    /// Removes one line of a relation or generalization, superline included.
    pub fn remove_connection(&mut self, connection: &NodeUuid, line: &LineUuid) -> Result<ErmCommand, ErmError> {
        let kind = self.expect_kind(connection, &[ObjectKind::Relation, ObjectKind::Generalization])?;
        let edge = *self.lines.get(line).ok_or(ErmError::UnknownLine(*line))?;
        if edge.origin != *connection {
            return Err(ErmError::UnknownLine(*line));
        }
        let (cardinality, was_super) = match kind {
            ObjectKind::Relation => (
                self.cardinality(connection, line)
                    .ok_or(ErmError::UnknownLine(*line))?,
                false,
            ),
            _ => (
                Cardinality::One,
                self.superline(connection).is_some_and(|(l, _)| l == *line),
            ),
        };
        Ok(self.apply(ErmEdit::RemoveConnection {
            connection: *connection,
            line: *line,
            entity: edge.destination,
            cardinality,
            was_super,
        }))
    }

    /// Removes every line between the connection and the entity.
    pub fn remove_all_connections(
        &mut self,
        connection: &NodeUuid,
        entity: &NodeUuid,
    ) -> Result<ErmCommand, ErmError> {
        self.expect_kind(connection, &[ObjectKind::Relation, ObjectKind::Generalization])?;
        let lines: Vec<LineUuid> = self
            .lines_to(entity)
            .into_iter()
            .filter(|l| self.lines.get(l).is_some_and(|e| e.origin == *connection))
            .collect();
        if lines.is_empty() {
            return Err(ErmError::NotConnected {
                connection: *connection,
                entity: *entity,
            });
        }
        let mut steps = Vec::with_capacity(lines.len());
        for l in lines {
            steps.push(self.remove_connection(connection, &l)?);
        }
        Ok(Command::from_applied(steps))
    }

    pub fn set_cardinality(
        &mut self,
        relation: &NodeUuid,
        line: &LineUuid,
        cardinality: Cardinality,
    ) -> Result<ErmCommand, ErmError> {
        self.expect_kind(relation, &[ObjectKind::Relation])?;
        let before = self
            .cardinality(relation, line)
            .ok_or(ErmError::UnknownLine(*line))?;
        Ok(self.apply(ErmEdit::SetCardinality {
            relation: *relation,
            line: *line,
            before,
            after: cardinality,
        }))
    }

    /// Replaces the supertype. If `line` is a sub line of the same
    /// generalization it is promoted instead of a second edge being made.
    /// The previous superline, if any, is dropped.
    pub fn set_superentity(
        &mut self,
        generalization: &NodeUuid,
        next: Option<(LineUuid, NodeUuid)>,
    ) -> Result<ErmCommand, ErmError> {
        self.expect_kind(generalization, &[ObjectKind::Generalization])?;
        let previous = self.superline(generalization);
        let mut was_sub = false;
        if let Some((line, entity)) = next {
            self.expect_kind(&entity, &[ObjectKind::Entity])?;
            if previous.is_some_and(|(_, e)| e == entity) {
                return Err(ErmError::AlreadySuperentity {
                    generalization: *generalization,
                    entity,
                });
            }
            was_sub = self
                .connections(generalization)
                .iter()
                .any(|(l, e, _)| *l == line && *e == entity);
            if !was_sub && self.lines.contains_key(&line) {
                return Err(ErmError::LineInUse(line));
            }
        }
        if previous.is_none() && next.is_none() {
            return Ok(Command::empty());
        }
        Ok(self.apply(ErmEdit::SetSuperentity {
            generalization: *generalization,
            previous,
            next,
            was_sub,
        }))
    }
}

impl Reversible for ErmEdit {
    type Target = ErmGraph;

    fn redo(&self, graph: &mut ErmGraph) {
        match self {
            ErmEdit::InsertObject { uuid, object } => {
                graph.objects.insert(*uuid, object.clone());
            }
            ErmEdit::RemoveObject { uuid, .. } => {
                graph.objects.remove(uuid);
            }
            ErmEdit::Rename { uuid, after, .. } => {
                if let Some(name) = graph.objects.get_mut(uuid).and_then(|o| o.name_mut()) {
                    *name = after.clone();
                }
            }
            ErmEdit::SetPrimary {
                attribute, after, ..
            } => {
                if let Some(ErmObject::Attribute(a)) = graph.objects.get_mut(attribute) {
                    a.primary_key = *after;
                }
            }
            ErmEdit::AddAttribute {
                owner,
                line,
                attribute,
            } => {
                graph.link(
                    *line,
                    ErmLine {
                        origin: *owner,
                        destination: *attribute,
                    },
                );
                if let Some(set) = graph.objects.get_mut(owner).and_then(|o| o.attributes_mut()) {
                    set.insert(*line);
                }
            }
            ErmEdit::RemoveAttribute { owner, line, .. } => {
                if let Some(set) = graph.objects.get_mut(owner).and_then(|o| o.attributes_mut()) {
                    set.remove(line);
                }
                graph.unlink(line);
            }
            ErmEdit::AddConnection {
                connection,
                line,
                entity,
                cardinality,
                was_super,
            } => {
                if !*was_super {
                    graph.link(
                        *line,
                        ErmLine {
                            origin: *connection,
                            destination: *entity,
                        },
                    );
                }
                match graph.objects.get_mut(connection) {
                    Some(ErmObject::Relation(r)) => {
                        r.entities.insert(*line, *cardinality);
                    }
                    Some(ErmObject::Generalization(g)) => {
                        if *was_super {
                            g.superentity = None;
                        }
                        g.subentities.insert(*line);
                    }
                    _ => {}
                }
            }
            ErmEdit::RemoveConnection {
                connection,
                line,
                was_super,
                ..
            } => {
                match graph.objects.get_mut(connection) {
                    Some(ErmObject::Relation(r)) => {
                        r.entities.remove(line);
                    }
                    Some(ErmObject::Generalization(g)) => {
                        if *was_super {
                            g.superentity = None;
                        } else {
                            g.subentities.remove(line);
                        }
                    }
                    _ => {}
                }
                graph.unlink(line);
            }
            ErmEdit::SetCardinality {
                relation,
                line,
                after,
                ..
            } => {
                if let Some(ErmObject::Relation(r)) = graph.objects.get_mut(relation) {
                    r.entities.insert(*line, *after);
                }
            }
            ErmEdit::SetSuperentity {
                generalization,
                previous,
                next,
                was_sub,
            } => {
                if let Some((line, _)) = previous {
                    graph.unlink(line);
                }
                if let Some((line, entity)) = next {
                    if !*was_sub {
                        graph.link(
                            *line,
                            ErmLine {
                                origin: *generalization,
                                destination: *entity,
                            },
                        );
                    }
                }
                if let Some(ErmObject::Generalization(g)) = graph.objects.get_mut(generalization) {
                    if let (Some((line, _)), true) = (next, *was_sub) {
                        g.subentities.remove(line);
                    }
                    g.superentity = next.map(|(l, _)| l);
                }
            }
        }
    }

    fn undo(&self, graph: &mut ErmGraph) {
        match self {
            ErmEdit::InsertObject { uuid, .. } => {
                graph.objects.remove(uuid);
            }
            ErmEdit::RemoveObject { uuid, object } => {
                graph.objects.insert(*uuid, object.clone());
            }
            ErmEdit::Rename { uuid, before, .. } => {
                if let Some(name) = graph.objects.get_mut(uuid).and_then(|o| o.name_mut()) {
                    *name = before.clone();
                }
            }
            ErmEdit::SetPrimary {
                attribute, before, ..
            } => {
                if let Some(ErmObject::Attribute(a)) = graph.objects.get_mut(attribute) {
                    a.primary_key = *before;
                }
            }
            ErmEdit::AddAttribute { owner, line, .. } => {
                if let Some(set) = graph.objects.get_mut(owner).and_then(|o| o.attributes_mut()) {
                    set.remove(line);
                }
                graph.unlink(line);
            }
            ErmEdit::RemoveAttribute {
                owner,
                line,
                attribute,
            } => {
                graph.link(
                    *line,
                    ErmLine {
                        origin: *owner,
                        destination: *attribute,
                    },
                );
                if let Some(set) = graph.objects.get_mut(owner).and_then(|o| o.attributes_mut()) {
                    set.insert(*line);
                }
            }
            ErmEdit::AddConnection {
                connection,
                line,
                was_super,
                ..
            } => {
                match graph.objects.get_mut(connection) {
                    Some(ErmObject::Relation(r)) => {
                        r.entities.remove(line);
                    }
                    Some(ErmObject::Generalization(g)) => {
                        g.subentities.remove(line);
                        if *was_super {
                            g.superentity = Some(*line);
                        }
                    }
                    _ => {}
                }
                if !*was_super {
                    graph.unlink(line);
                }
            }
            ErmEdit::RemoveConnection {
                connection,
                line,
                entity,
                cardinality,
                was_super,
            } => {
                graph.link(
                    *line,
                    ErmLine {
                        origin: *connection,
                        destination: *entity,
                    },
                );
                match graph.objects.get_mut(connection) {
                    Some(ErmObject::Relation(r)) => {
                        r.entities.insert(*line, *cardinality);
                    }
                    Some(ErmObject::Generalization(g)) => {
                        if *was_super {
                            g.superentity = Some(*line);
                        } else {
                            g.subentities.insert(*line);
                        }
                    }
                    _ => {}
                }
            }
            ErmEdit::SetCardinality {
                relation,
                line,
                before,
                ..
            } => {
                if let Some(ErmObject::Relation(r)) = graph.objects.get_mut(relation) {
                    r.entities.insert(*line, *before);
                }
            }
            ErmEdit::SetSuperentity {
                generalization,
                previous,
                next,
                was_sub,
            } => {
                if let Some((line, _)) = next {
                    if !*was_sub {
                        graph.unlink(line);
                    }
                }
                if let Some((line, entity)) = previous {
                    graph.link(
                        *line,
                        ErmLine {
                            origin: *generalization,
                            destination: *entity,
                        },
                    );
                }
                if let Some(ErmObject::Generalization(g)) = graph.objects.get_mut(generalization) {
                    if let (Some((line, _)), true) = (next, *was_sub) {
                        g.subentities.insert(*line);
                    }
                    g.superentity = previous.map(|(l, _)| l);
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entity(graph: &mut ErmGraph, name: &str) -> NodeUuid {
        let uuid = NodeUuid::now_v7();
        graph.insert_object(uuid, ErmEntity::new(name));
        uuid
    }

    fn generalization(graph: &mut ErmGraph) -> NodeUuid {
        let uuid = NodeUuid::now_v7();
        graph.insert_object(uuid, ErmGeneralization::new());
        uuid
    }

    #[test]
    fn test_cardinality_names() {
        for c in Cardinality::ALL {
            assert_eq!(Cardinality::from_file_name(c.file_name()), Some(c));
        }
        assert_eq!(Cardinality::from_file_name("MANY"), None);
        assert_eq!(Cardinality::MultOpt.label(), "cm");
    }

    #[test]
    fn test_attribute_lifecycle() {
        let mut graph = ErmGraph::new();
        let e = entity(&mut graph, "Person");
        let a = NodeUuid::now_v7();
        graph.insert_object(a, ErmAttribute::new("id", e));
        let line = LineUuid::now_v7();
        let add = graph.add_attribute(&e, line, &a).unwrap();
        assert_eq!(graph.attributes_of(&e), vec![(line, a)]);

        let primary = graph.set_primary(&a, true).unwrap();
        assert_eq!(graph.is_primary(&a), Some(true));
        primary.undo(&mut graph);
        assert_eq!(graph.is_primary(&a), Some(false));

        assert_eq!(graph.remove_object(&e).unwrap_err(), ErmError::StillConnected(e));

        add.undo(&mut graph);
        assert!(graph.attributes_of(&e).is_empty());
        assert_eq!(graph.line_count(), 0);
        add.redo(&mut graph);
        assert_eq!(graph.attribute_owner(&a), Some(e));

        let other = entity(&mut graph, "Other");
        assert_eq!(
            graph.remove_attribute(&other, &a).unwrap_err(),
            ErmError::NotOwned {
                owner: other,
                attribute: a
            }
        );
        let remove = graph.remove_attribute(&e, &a).unwrap();
        assert!(graph.attributes_of(&e).is_empty());
        remove.undo(&mut graph);
        assert_eq!(graph.attributes_of(&e), vec![(line, a)]);
    }

    #[test]
    fn test_relation_connections() {
        let mut graph = ErmGraph::new();
        let e = entity(&mut graph, "Person");
        let r = NodeUuid::now_v7();
        graph.insert_object(r, ErmRelation::new("owns"));

        let (l1, l2) = (LineUuid::now_v7(), LineUuid::now_v7());
        graph.add_connection(&r, l1, &e, Cardinality::One).unwrap();
        graph.add_connection(&r, l2, &e, Cardinality::Multiple).unwrap();
        assert!(graph.has_connection(&r, &e));
        assert_eq!(graph.lines_to(&e).len(), 2);

        let set = graph.set_cardinality(&r, &l1, Cardinality::Optional).unwrap();
        assert_eq!(graph.cardinality(&r, &l1), Some(Cardinality::Optional));
        set.undo(&mut graph);
        assert_eq!(graph.cardinality(&r, &l1), Some(Cardinality::One));

        let remove = graph.remove_all_connections(&r, &e).unwrap();
        assert!(!graph.has_connection(&r, &e));
        assert_eq!(graph.line_count(), 0);
        remove.undo(&mut graph);
        assert_eq!(graph.cardinality(&r, &l1), Some(Cardinality::One));
        assert_eq!(graph.cardinality(&r, &l2), Some(Cardinality::Multiple));

        remove.redo(&mut graph);
        assert_eq!(
            graph.remove_all_connections(&r, &e).unwrap_err(),
            ErmError::NotConnected {
                connection: r,
                entity: e
            }
        );
    }

    #[test]
    fn test_promote_subtype_to_supertype() {
        let mut graph = ErmGraph::new();
        let g = generalization(&mut graph);
        let e = entity(&mut graph, "Animal");
        let line = LineUuid::now_v7();
        graph.add_connection(&g, line, &e, Cardinality::Multiple).unwrap();
        assert!(graph.has_connection(&g, &e));
        assert_eq!(graph.connections(&g)[0].2, Cardinality::One);

        let promote = graph.set_superentity(&g, Some((line, e))).unwrap();
        assert!(graph.is_superentity(&g, &e));
        assert!(!graph.has_connection(&g, &e));
        assert_eq!(graph.line_count(), 1);

        promote.undo(&mut graph);
        assert!(!graph.has_superline(&g));
        assert!(graph.has_connection(&g, &e));
        assert_eq!(graph.line_count(), 1);

        promote.redo(&mut graph);
        assert_eq!(
            graph.set_superentity(&g, Some((LineUuid::now_v7(), e))).unwrap_err(),
            ErmError::AlreadySuperentity {
                generalization: g,
                entity: e
            }
        );
    }

    #[test]
    fn test_demote_supertype_to_subtype() {
        let mut graph = ErmGraph::new();
        let g = generalization(&mut graph);
        let e = entity(&mut graph, "Animal");
        let line = LineUuid::now_v7();
        graph.set_superentity(&g, Some((line, e))).unwrap();

        let demote = graph.add_connection(&g, line, &e, Cardinality::One).unwrap();
        assert!(!graph.has_superline(&g));
        assert!(graph.has_connection(&g, &e));
        assert_eq!(graph.line_count(), 1);

        demote.undo(&mut graph);
        assert!(graph.is_superentity(&g, &e));
        assert!(!graph.has_connection(&g, &e));
        assert_eq!(graph.line(&line).map(|l| l.destination), Some(e));
    }

    #[test]
    fn test_replace_supertype_drops_old_line() {
        let mut graph = ErmGraph::new();
        let g = generalization(&mut graph);
        let (a, b) = (entity(&mut graph, "A"), entity(&mut graph, "B"));
        let (la, lb) = (LineUuid::now_v7(), LineUuid::now_v7());
        graph.set_superentity(&g, Some((la, a))).unwrap();

        let replace = graph.set_superentity(&g, Some((lb, b))).unwrap();
        assert!(graph.is_superentity(&g, &b));
        assert!(graph.line(&la).is_none());
        assert!(graph.lines_of(&a).next().is_none());

        replace.undo(&mut graph);
        assert!(graph.is_superentity(&g, &a));
        assert!(graph.line(&lb).is_none());

        let clear = graph.set_superentity(&g, None).unwrap();
        assert!(!graph.has_superline(&g));
        clear.undo(&mut graph);
        assert_eq!(graph.superline(&g), Some((la, a)));
    }

    #[test]
    fn test_remove_all_connections_covers_supertype() {
        let mut graph = ErmGraph::new();
        let g = generalization(&mut graph);
        let e = entity(&mut graph, "A");
        graph.set_superentity(&g, Some((LineUuid::now_v7(), e))).unwrap();

        let remove = graph.remove_all_connections(&g, &e).unwrap();
        assert!(!graph.has_superline(&g));
        remove.undo(&mut graph);
        assert!(graph.is_superentity(&g, &e));
    }

    #[test]
    fn test_rename_and_wrong_kinds() {
        let mut graph = ErmGraph::new();
        let e = entity(&mut graph, "A");
        let g = generalization(&mut graph);

        let rename = graph.rename(&e, "B").unwrap();
        assert_eq!(graph.name(&e), Some("B"));
        rename.undo(&mut graph);
        assert_eq!(graph.name(&e), Some("A"));

        assert!(matches!(graph.rename(&g, "G"), Err(ErmError::WrongKind { .. })));
        assert!(matches!(
            graph.set_cardinality(&e, &LineUuid::now_v7(), Cardinality::One),
            Err(ErmError::WrongKind { .. })
        ));
        let missing = NodeUuid::now_v7();
        assert_eq!(
            graph.remove_object(&missing).unwrap_err(),
            ErmError::UnknownObject(missing)
        );

        let remove = graph.remove_object(&e).unwrap();
        assert!(!graph.contains(&e));
        remove.undo(&mut graph);
        assert_eq!(graph.kind(&e), Some(ObjectKind::Entity));
    }
}
