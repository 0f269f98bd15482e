use std::str::FromStr;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

#[derive(Debug, derive_more::From)]
pub enum ErmFileError {
    Io(std::io::Error),
    #[from(skip)]
    Xml(String),
    #[from(skip)]
    StructureError(String),
}

impl std::fmt::Display for ErmFileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "cannot access diagram file: {e}"),
            Self::Xml(e) => write!(f, "malformed XML: {e}"),
            Self::StructureError(e) => write!(f, "invalid diagram: {e}"),
        }
    }
}

impl std::error::Error for ErmFileError {}

fn xml_error(e: impl std::fmt::Display) -> ErmFileError {
    ErmFileError::Xml(e.to_string())
}

/// In-memory XML element. Text is kept only for elements without children.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    pub text: String,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn leaf(name: impl Into<String>, text: impl ToString) -> Self {
        Self {
            name: name.into(),
            text: text.to_string(),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.attributes.push((key.into(), value.to_string()));
        self
    }

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(child);
        self
    }

    pub fn push(&mut self, child: XmlElement) {
        self.children.push(child);
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn child_text(&self, name: &str) -> Result<&str, ErmFileError> {
        self.child(name).map(|c| c.text.as_str()).ok_or_else(|| {
            ErmFileError::StructureError(format!("<{}> is missing <{}>", self.name, name))
        })
    }

    pub fn child_parse<T: FromStr>(&self, name: &str) -> Result<T, ErmFileError> {
        let text = self.child_text(name)?;
        text.trim().parse().map_err(|_| {
            ErmFileError::StructureError(format!(
                "<{}> of <{}> has invalid value {:?}",
                name, self.name, text
            ))
        })
    }
}

pub fn parse_document(source: &str) -> Result<XmlElement, ErmFileError> {
    let mut reader = Reader::from_str(source);
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut buf = Vec::new();

    fn open(e: &BytesStart) -> Result<XmlElement, ErmFileError> {
        let mut element = XmlElement::new(String::from_utf8_lossy(e.name().as_ref()));
        for a in e.attributes() {
            let a = a.map_err(xml_error)?;
            let raw = String::from_utf8_lossy(&a.value);
            let value = quick_xml::escape::unescape(&raw).map_err(xml_error)?;
            element.attributes.push((
                String::from_utf8_lossy(a.key.as_ref()).into_owned(),
                value.into_owned(),
            ));
        }
        Ok(element)
    }

    fn close(
        stack: &mut Vec<XmlElement>,
        mut element: XmlElement,
    ) -> Option<XmlElement> {
        if !element.children.is_empty() {
            element.text.clear();
        }
        match stack.last_mut() {
            Some(parent) => {
                parent.children.push(element);
                None
            }
            None => Some(element),
        }
    }

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_error)? {
            Event::Start(ref e) => stack.push(open(e)?),
            Event::Empty(ref e) => {
                let element = open(e)?;
                if let Some(root) = close(&mut stack, element) {
                    return Ok(root);
                }
            }
            Event::End(_) => {
                let Some(element) = stack.pop() else {
                    return Err(ErmFileError::Xml("unexpected end tag".to_owned()));
                };
                if let Some(root) = close(&mut stack, element) {
                    return Ok(root);
                }
            }
            Event::Text(ref e) => {
                if let Some(current) = stack.last_mut() {
                    current.text += &e.decode().map_err(xml_error)?;
                }
            }
            Event::CData(ref e) => {
                if let Some(current) = stack.last_mut() {
                    current.text += &e.decode().map_err(xml_error)?;
                }
            }
            Event::GeneralRef(ref e) => {
                let Some(current) = stack.last_mut() else {
                    continue;
                };
                if let Some(ch) = e.resolve_char_ref().map_err(xml_error)? {
                    current.text.push(ch);
                } else {
                    let name = e.decode().map_err(xml_error)?;
                    let resolved = quick_xml::escape::resolve_predefined_entity(&name)
                        .ok_or_else(|| ErmFileError::Xml(format!("unknown entity &{name};")))?;
                    current.text += resolved;
                }
            }
            Event::Eof => {
                return Err(ErmFileError::Xml("document has no root element".to_owned()));
            }
            _ => {}
        }
        buf.clear();
    }
}

pub fn write_document(root: &XmlElement) -> Result<String, ErmFileError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 4);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("no"))))?;
    write_element(&mut writer, root)?;
    let mut out = String::from_utf8(writer.into_inner()).map_err(xml_error)?;
    out.push('\n');
    Ok(out)
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &XmlElement) -> Result<(), ErmFileError> {
    let attributes = element
        .attributes
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()));
    if element.children.is_empty() {
        let e = writer.create_element(element.name.as_str()).with_attributes(attributes);
        if element.text.is_empty() {
            e.write_empty()?;
        } else {
            e.write_text_content(BytesText::new(&element.text))?;
        }
        return Ok(());
    }

    writer.write_event(Event::Start(
        BytesStart::new(element.name.as_str()).with_attributes(attributes),
    ))?;
    for c in &element.children {
        write_element(writer, c)?;
    }
    writer.write_event(Event::End(BytesEnd::new(element.name.as_str())))?;
    Ok(())
}
