//! A small owned XML element tree on top of `quick-xml`.
//!
//! The XML based formats are read completely into [`Element`]s and mapped
//! from there; writers build a tree and serialize it in one go.

use std::str::FromStr;

use multiconv_model::{ConversionError, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    pub text: String,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Builder style attribute setter.
    pub fn with_attr(mut self, name: &str, value: impl ToString) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Builder style text setter.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn set_attr(&mut self, name: &str, value: impl ToString) {
        let value = value.to_string();
        match self.attributes.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value,
            None => self.attributes.push((name.to_string(), value)),
        }
    }

    pub fn push(&mut self, child: Element) {
        self.children.push(child);
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Attribute parsed into `T`; unparsable values are logged and ignored.
    pub fn attr_parse<T: FromStr>(&self, name: &str) -> Option<T> {
        let raw = self.attr(name)?;
        match raw.trim().parse() {
            Ok(value) => Some(value),
            Err(_) => {
                log::warn!("Ignoring invalid value '{}' of attribute {} on <{}>", raw, name, self.name);
                None
            }
        }
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Text of the child `name`, trimmed.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.trim())
    }

    /// Depth-first search for the first element called `name`, including `self`.
    pub fn find(&self, name: &str) -> Option<&Element> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }
}

fn xml_error(file: &str, error: impl std::fmt::Display) -> ConversionError {
    ConversionError::structural(file, format!("XML: {}", error))
}

fn element_from(start: &BytesStart, file: &str) -> Result<Element> {
    let mut element = Element::new(String::from_utf8_lossy(start.name().as_ref()));
    for attr in start.attributes() {
        let attr = attr.map_err(|e| xml_error(file, e))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = attr.unescape_value().map_err(|e| xml_error(file, e))?;
        element.attributes.push((key, value.to_string()));
    }
    Ok(element)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

/// Parse a complete document and return its root element.
///
/// `file` names the document in errors.
pub fn parse_document(text: &str, file: &str) -> Result<Element> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;
    loop {
        match reader.read_event().map_err(|e| xml_error(file, e))? {
            Event::Start(start) => stack.push(element_from(&start, file)?),
            Event::Empty(empty) => {
                let element = element_from(&empty, file)?;
                attach(&mut stack, &mut root, element);
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| xml_error(file, "unbalanced end tag"))?;
                attach(&mut stack, &mut root, element);
            }
            Event::Text(text) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text.unescape().map_err(|e| xml_error(file, e))?);
                }
            }
            Event::CData(data) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    if !stack.is_empty() {
        return Err(xml_error(file, format!("unclosed element <{}>", stack[stack.len() - 1].name)));
    }
    root.ok_or_else(|| xml_error(file, "document has no root element"))
}

/// Parse a document and check the name of its root element.
pub fn parse_document_with_root(text: &str, file: &str, root_name: &str) -> Result<Element> {
    let root = parse_document(text, file)?;
    if root.name != root_name {
        return Err(ConversionError::structural(
            file,
            format!("expected root element <{}>, found <{}>", root_name, root.name),
        ));
    }
    Ok(root)
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &Element) -> Result<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }
    if element.children.is_empty() && element.text.is_empty() {
        writer
            .write_event(Event::Empty(start))
            .map_err(|e| xml_error(&element.name, e))?;
        return Ok(());
    }
    writer
        .write_event(Event::Start(start))
        .map_err(|e| xml_error(&element.name, e))?;
    if !element.text.is_empty() {
        writer
            .write_event(Event::Text(BytesText::new(&element.text)))
            .map_err(|e| xml_error(&element.name, e))?;
    }
    for child in &element.children {
        write_element(writer, child)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(element.name.as_str())))
        .map_err(|e| xml_error(&element.name, e))?;
    Ok(())
}

/// Serialize `root` as indented UTF-8 document with XML declaration.
pub fn write_document(root: &Element) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(|e| xml_error(&root.name, e))?;
    write_element(&mut writer, root)?;
    String::from_utf8(writer.into_inner()).map_err(|e| xml_error(&root.name, e))
}

/// Format a float with up to six decimals and no trailing zeros.
pub fn format_number(value: f64) -> String {
    let text = format!("{:.6}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" {
        "0".to_string()
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_document() {
        let root = parse_document(
            r#"<?xml version="1.0"?>
            <multisample name="Piano &amp; Strings">
                <group name="g1"/>
                <sample file="a.wav"><key low="10" high="20"/></sample>
                <description>soft</description>
            </multisample>"#,
            "test.xml",
        )
        .unwrap();
        assert_eq!(root.name, "multisample");
        assert_eq!(root.attr("name"), Some("Piano & Strings"));
        assert_eq!(root.children.len(), 3);
        let key = root.find("key").unwrap();
        assert_eq!(key.attr_parse::<u8>("high"), Some(20));
        assert_eq!(root.child_text("description"), Some("soft"));
    }

    #[test]
    fn test_wrong_root_is_structural() {
        let err = parse_document_with_root("<a/>", "x.xml", "b").unwrap_err();
        assert!(matches!(err, ConversionError::Structural { .. }));
    }

    #[test]
    fn test_unclosed_document_fails() {
        assert!(parse_document("<a><b></b>", "x.xml").is_err());
    }

    #[test]
    fn test_write_then_parse() {
        let root = Element::new("root")
            .with_attr("name", "a<b")
            .with_child(Element::new("leaf").with_attr("value", 1.5))
            .with_child(Element::new("text").with_text("hello"));
        let text = write_document(&root).unwrap();
        assert!(text.starts_with("<?xml"));
        assert_eq!(parse_document(&text, "x").unwrap(), root);
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(1.0), "1");
        assert_eq!(format_number(0.123838), "0.123838");
        assert_eq!(format_number(-0.0000001), "0");
    }
}
