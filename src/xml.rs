//! Minimal in-memory XML tree.
//!
//! Unit documents and METS files are assembled as [`XmlElement`] trees,
//! which are plain owned values. Cloning one is a deep copy, which is how
//! supplement documents are derived from their issue. Serialization and
//! parsing go through `quick-xml`.
//!
//! Names are kept as written, prefix included (`mets:div`). Lookups by
//! local name ([`XmlElement::local_name`]) ignore the prefix so files
//! produced by other tools with different prefixes still read correctly.
//! Comments, processing instructions and doctype declarations are dropped
//! on parse.

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum XmlError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("malformed XML: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

fn local(name: &str) -> &str {
    name.rsplit_once(':').map(|(_, l)| l).unwrap_or(name)
}

impl XmlElement {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Element holding a single text node. Empty text yields an empty element.
    pub fn text_element(name: &str, text: impl Into<String>) -> Self {
        let mut e = Self::new(name);
        e.set_text(text);
        e
    }

    /// Builder-style attribute setter.
    pub fn with_attr(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    /// Builder-style child append.
    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    pub fn local_name(&self) -> &str {
        local(&self.name)
    }

    pub fn set_attr(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value,
            None => self.attributes.push((key.to_string(), value)),
        }
    }

    /// Attribute by exact (prefixed) name.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Attribute by local name, ignoring any prefix.
    pub fn attr_local(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| local(k) == key)
            .map(|(_, v)| v.as_str())
    }

    /// Append a child and return a handle to it.
    pub fn push(&mut self, child: XmlElement) -> &mut XmlElement {
        self.children.push(XmlNode::Element(child));
        match self.children.last_mut() {
            Some(XmlNode::Element(e)) => e,
            _ => unreachable!("just pushed an element"),
        }
    }

    /// Shorthand for pushing a text-only child.
    pub fn push_text(&mut self, name: &str, text: impl Into<String>) -> &mut XmlElement {
        self.push(XmlElement::text_element(name, text))
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.children.retain(|c| matches!(c, XmlNode::Element(_)));
        if !text.is_empty() {
            self.children.insert(0, XmlNode::Text(text));
        }
    }

    /// Concatenated direct text content.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|c| match c {
                XmlNode::Text(t) => Some(t.as_str()),
                XmlNode::Element(_) => None,
            })
            .collect()
    }

    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|c| match c {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut XmlElement> {
        self.children.iter_mut().filter_map(|c| match c {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    /// First direct child with the given local name.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.elements().find(|e| e.local_name() == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut XmlElement> {
        self.elements_mut().find(|e| e.local_name() == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.elements().filter(move |e| e.local_name() == name)
    }

    /// Remove all direct children with the given local name.
    pub fn remove_children(&mut self, name: &str) {
        self.children.retain(|c| match c {
            XmlNode::Element(e) => e.local_name() != name,
            XmlNode::Text(_) => true,
        });
    }

    /// Follow a path of local names from this element.
    pub fn find_path(&self, path: &[&str]) -> Option<&XmlElement> {
        path.iter().try_fold(self, |e, name| e.child(name))
    }

    pub fn find_path_mut(&mut self, path: &[&str]) -> Option<&mut XmlElement> {
        let mut current = self;
        for name in path {
            current = current.child_mut(name)?;
        }
        Some(current)
    }

    /// Depth-first search for the first element matching `pred`, self included.
    pub fn find<F>(&self, pred: &F) -> Option<&XmlElement>
    where
        F: Fn(&XmlElement) -> bool,
    {
        if pred(self) {
            return Some(self);
        }
        self.elements().find_map(|e| e.find(pred))
    }

    pub fn find_mut<F>(&mut self, pred: &F) -> Option<&mut XmlElement>
    where
        F: Fn(&XmlElement) -> bool,
    {
        if pred(self) {
            return Some(self);
        }
        self.elements_mut().find_map(|e| e.find_mut(pred))
    }

    // -------------------------------------------------------------------------
    // Serialization
    // -------------------------------------------------------------------------

    /// Pretty-printed document with an XML declaration, two-space indent.
    pub fn to_xml_string(&self) -> Result<String, XmlError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        write_element(&mut writer, self)?;
        let mut out = String::from_utf8(writer.into_inner())
            .map_err(|e| XmlError::Malformed(e.to_string()))?;
        out.push('\n');
        Ok(out)
    }

    /// Parse a document and return its root element.
    pub fn parse(xml: &str) -> Result<XmlElement, XmlError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => stack.push(start_to_element(&e)?),
                Event::Empty(e) => {
                    let element = start_to_element(&e)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| XmlError::Malformed("unbalanced end tag".into()))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(t) => {
                    let text = t
                        .unescape()
                        .map_err(|e| XmlError::Malformed(e.to_string()))?
                        .into_owned();
                    if let Some(parent) = stack.last_mut()
                        && !text.is_empty()
                    {
                        parent.children.push(XmlNode::Text(text));
                    }
                }
                Event::CData(c) => {
                    let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(XmlNode::Text(text));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if !stack.is_empty() {
            return Err(XmlError::Malformed("unexpected end of document".into()));
        }
        root.ok_or_else(|| XmlError::Malformed("document has no root element".into()))
    }
}

fn start_to_element(start: &BytesStart<'_>) -> Result<XmlElement, XmlError> {
    let mut element = XmlElement::new(&String::from_utf8_lossy(start.name().as_ref()));
    for attr in start.attributes() {
        let attr = attr.map_err(|e| XmlError::Malformed(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| XmlError::Malformed(e.to_string()))?
            .into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(XmlNode::Element(element));
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(element);
            Ok(())
        }
        None => Err(XmlError::Malformed("multiple root elements".into())),
    }
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &XmlElement) -> Result<(), XmlError> {
    let mut start = BytesStart::new(element.name.as_str());
    for (k, v) in &element.attributes {
        start.push_attribute((k.as_str(), v.as_str()));
    }
    if element.children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }
    writer.write_event(Event::Start(start))?;
    for child in &element.children {
        match child {
            XmlNode::Element(e) => write_element(writer, e)?,
            XmlNode::Text(t) => writer.write_event(Event::Text(BytesText::new(t)))?,
        }
    }
    writer.write_event(Event::End(BytesEnd::new(element.name.as_str())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_and_serializes_nested_document() {
        let mut root = XmlElement::new("newspaper");
        let info = root.push(XmlElement::new("volumeInfo"));
        info.push_text("Barcode", "ABC");
        info.push_text("Language", "");
        root.push(XmlElement::new("Pages"))
            .push(XmlElement::new("Page").with_attr("pg", "0001"));

        let xml = root.to_xml_string().unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<Barcode>ABC</Barcode>"));
        assert!(xml.contains("<Language/>"));
        assert!(xml.contains("<Page pg=\"0001\"/>"));
    }

    #[test]
    fn escapes_text_and_attributes() {
        let e = XmlElement::text_element("t", "a < b & c").with_attr("k", "\"q\"");
        let xml = e.to_xml_string().unwrap();
        assert!(xml.contains("a &lt; b &amp; c"));
        let back = XmlElement::parse(&xml).unwrap();
        assert_eq!(back.text(), "a < b & c");
        assert_eq!(back.attr("k"), Some("\"q\""));
    }

    #[test]
    fn parse_then_serialize_preserves_structure() {
        let source = r#"<?xml version="1.0"?>
<!-- generated -->
<mets:mets xmlns:mets="http://www.loc.gov/METS/" xmlns:xlink="http://www.w3.org/1999/xlink">
  <mets:structMap TYPE="LOGICAL">
    <mets:div ID="LOG_0000" TYPE="Newspaper">
      <mets:div ID="LOG_0001" TYPE="Year" LABEL="1921">
        <mets:mptr LOCTYPE="URL" xlink:href="https://x/VOL1921.xml"/>
      </mets:div>
    </mets:div>
  </mets:structMap>
</mets:mets>"#;
        let root = XmlElement::parse(source).unwrap();
        assert_eq!(root.local_name(), "mets");
        let year = root
            .find_path(&["structMap", "div", "div"])
            .unwrap();
        assert_eq!(year.attr("LABEL"), Some("1921"));
        let mptr = year.child("mptr").unwrap();
        assert_eq!(mptr.attr_local("href"), Some("https://x/VOL1921.xml"));

        let again = XmlElement::parse(&root.to_xml_string().unwrap()).unwrap();
        assert_eq!(again, root);
    }

    #[test]
    fn clone_is_deep() {
        let mut original = XmlElement::new("root");
        original.push_text("title", "main");
        let mut copy = original.clone();
        copy.child_mut("title").unwrap().set_text("supplement");
        assert_eq!(original.child("title").unwrap().text(), "main");
        assert_eq!(copy.child("title").unwrap().text(), "supplement");
    }

    #[test]
    fn remove_children_by_local_name() {
        let mut root = XmlElement::new("Pages");
        root.push(XmlElement::new("Page"));
        root.push(XmlElement::new("Page"));
        root.push(XmlElement::new("Other"));
        root.remove_children("Page");
        assert_eq!(root.elements().count(), 1);
    }

    #[test]
    fn find_searches_depth_first() {
        let root = XmlElement::new("a")
            .with_child(XmlElement::new("b").with_child(XmlElement::new("c").with_attr("TYPE", "PHYSICAL")));
        let found = root.find(&|e: &XmlElement| e.attr("TYPE") == Some("PHYSICAL"));
        assert_eq!(found.map(|e| e.name.as_str()), Some("c"));
    }

    #[test]
    fn rejects_unbalanced_document() {
        assert!(XmlElement::parse("<a><b></a>").is_err());
        assert!(XmlElement::parse("").is_err());
    }
}
