//! Minimal owned XML tree over `quick-xml` events.
//!
//! WordprocessingML edits need to move and clone whole subtrees (runs,
//! drawings, paragraph properties), which a streaming reader cannot do.
//! Parts are small (a letter's `document.xml` is tens of KiB), so the whole
//! part is read into [`Element`]s, edited, and written back. Names are kept
//! as qualified strings (`w:p`); the `w:` prefix is what every mainstream
//! DOCX producer emits.

use quick_xml::events::{BytesCData, BytesDecl, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

/// A single node of the tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    /// Unescaped character data.
    Text(String),
    CData(String),
    /// Raw (still escaped) comment body.
    Comment(String),
    /// Raw processing-instruction body.
    ProcessingInstruction(String),
}

/// An element with its attributes (unescaped) and children.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

/// The `<?xml …?>` declaration, if the part had one.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlDecl {
    pub version: String,
    pub encoding: Option<String>,
    pub standalone: Option<String>,
}

/// A parsed XML part: declaration, top-level misc nodes and the root element.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlDocument {
    pub decl: Option<XmlDecl>,
    /// Comments / PIs before the root element.
    pub prolog: Vec<Node>,
    pub root: Element,
}

/// Error raised while reading or writing a part.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("XML error at byte {position}: {message}")]
pub struct XmlError {
    pub position: usize,
    pub message: String,
}

impl XmlError {
    fn new(position: usize, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Insert or overwrite an attribute, keeping attribute order stable.
    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attrs.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((key, value)),
        }
    }

    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }

    /// Direct element children.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    /// First direct child with the given name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.is(name))
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.elements_mut().find(|e| e.is(name))
    }

    /// Concatenated text of direct `Text`/`CData` children.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            match node {
                Node::Text(t) | Node::CData(t) => out.push_str(t),
                _ => {}
            }
        }
        out
    }

    /// Replace all direct text children with `text`.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.children
            .retain(|n| !matches!(n, Node::Text(_) | Node::CData(_)));
        self.children.push(Node::Text(text.into()));
    }

    /// True if any descendant (or self) has one of `names`.
    pub fn contains_any(&self, names: &[&str]) -> bool {
        names.contains(&self.name.as_str()) || self.elements().any(|e| e.contains_any(names))
    }

    /// Count descendants (including self) with the given name.
    pub fn count_named(&self, name: &str) -> usize {
        usize::from(self.is(name)) + self.elements().map(|e| e.count_named(name)).sum::<usize>()
    }
}

impl XmlDocument {
    /// Parse a complete XML part.
    pub fn parse(bytes: &[u8]) -> Result<Self, XmlError> {
        let mut reader = Reader::from_reader(bytes);
        let mut decl = None;
        let mut prolog = Vec::new();
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let position = reader.buffer_position();
            let event = reader
                .read_event()
                .map_err(|e| XmlError::new(position, e.to_string()))?;

            match event {
                Event::Decl(d) => decl = Some(read_decl(&d, position)?),
                Event::Start(start) => stack.push(read_start(&start, position)?),
                Event::Empty(start) => {
                    let element = read_start(&start, position)?;
                    attach(&mut stack, &mut root, element, position)?;
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| XmlError::new(position, "unbalanced end tag"))?;
                    attach(&mut stack, &mut root, element, position)?;
                }
                Event::Text(t) => {
                    let text = t
                        .unescape()
                        .map_err(|e| XmlError::new(position, e.to_string()))?
                        .into_owned();
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(Node::Text(text)),
                        // Whitespace between prolog and root is not significant.
                        None if text.trim().is_empty() => {}
                        None => return Err(XmlError::new(position, "text outside root element")),
                    }
                }
                Event::CData(c) => {
                    let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(Node::CData(text));
                    }
                }
                Event::Comment(c) => {
                    let node = Node::Comment(String::from_utf8_lossy(&c).into_owned());
                    push_misc(&mut stack, &mut prolog, &root, node);
                }
                Event::PI(pi) => {
                    let node = Node::ProcessingInstruction(String::from_utf8_lossy(&pi).into_owned());
                    push_misc(&mut stack, &mut prolog, &root, node);
                }
                Event::DocType(_) => {}
                Event::Eof => break,
            }
        }

        if !stack.is_empty() {
            return Err(XmlError::new(
                reader.buffer_position(),
                format!("unclosed element <{}>", stack[stack.len() - 1].name),
            ));
        }

        let root = root.ok_or_else(|| XmlError::new(0, "document has no root element"))?;
        Ok(Self { decl, prolog, root })
    }

    /// Serialise back to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, XmlError> {
        let mut writer = Writer::new(Vec::new());

        if let Some(ref d) = self.decl {
            writer
                .write_event(Event::Decl(BytesDecl::new(
                    &d.version,
                    d.encoding.as_deref(),
                    d.standalone.as_deref(),
                )))
                .map_err(|e| XmlError::new(0, e.to_string()))?;
            // Word writes "\r\n" after the declaration; any newline is fine.
            writer
                .write_event(Event::Text(BytesText::from_escaped("\n")))
                .map_err(|e| XmlError::new(0, e.to_string()))?;
        }

        for node in &self.prolog {
            write_node(&mut writer, node)?;
        }
        write_element(&mut writer, &self.root)?;

        Ok(writer.into_inner())
    }
}

fn read_decl(d: &BytesDecl<'_>, position: usize) -> Result<XmlDecl, XmlError> {
    let lossy = |bytes: &[u8]| String::from_utf8_lossy(bytes).into_owned();
    let version = d
        .version()
        .map_err(|e| XmlError::new(position, e.to_string()))?;
    let encoding = match d.encoding() {
        Some(Ok(enc)) => Some(lossy(&enc)),
        Some(Err(e)) => return Err(XmlError::new(position, e.to_string())),
        None => None,
    };
    let standalone = match d.standalone() {
        Some(Ok(s)) => Some(lossy(&s)),
        Some(Err(e)) => return Err(XmlError::new(position, e.to_string())),
        None => None,
    };
    Ok(XmlDecl {
        version: lossy(&version),
        encoding,
        standalone,
    })
}

fn read_start(start: &BytesStart<'_>, position: usize) -> Result<Element, XmlError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut element = Element::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| XmlError::new(position, e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| XmlError::new(position, e.to_string()))?
            .into_owned();
        element.attrs.push((key, value));
    }
    Ok(element)
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
    position: usize,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(Node::Element(element));
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(element);
            Ok(())
        }
        None => Err(XmlError::new(position, "more than one root element")),
    }
}

fn push_misc(stack: &mut [Element], prolog: &mut Vec<Node>, root: &Option<Element>, node: Node) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        // Trailing misc after the root is dropped; Office never emits any.
        None if root.is_none() => prolog.push(node),
        None => {}
    }
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &Node) -> Result<(), XmlError> {
    let event = match node {
        Node::Element(e) => return write_element(writer, e),
        Node::Text(t) => Event::Text(BytesText::new(t)),
        Node::CData(t) => Event::CData(BytesCData::new(t.as_str())),
        Node::Comment(c) => Event::Comment(BytesText::from_escaped(c.as_str())),
        Node::ProcessingInstruction(p) => Event::PI(BytesText::from_escaped(p.as_str())),
    };
    writer
        .write_event(event)
        .map_err(|e| XmlError::new(0, e.to_string()))
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &Element) -> Result<(), XmlError> {
    let mut start = BytesStart::new(element.name.as_str());
    for (k, v) in &element.attrs {
        start.push_attribute((k.as_str(), v.as_str()));
    }

    if element.children.is_empty() {
        return writer
            .write_event(Event::Empty(start))
            .map_err(|e| XmlError::new(0, e.to_string()));
    }

    writer
        .write_event(Event::Start(start.borrow()))
        .map_err(|e| XmlError::new(0, e.to_string()))?;
    for child in &element.children {
        write_node(writer, child)?;
    }
    writer
        .write_event(Event::End(start.to_end()))
        .map_err(|e| XmlError::new(0, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:rPr><w:b/></w:rPr><w:t xml:space="preserve">Smith &amp; Sons </w:t></w:r></w:p><!-- note --></w:body></w:document>"#;

    #[test]
    fn parses_nested_structure() {
        let doc = XmlDocument::parse(SAMPLE.as_bytes()).unwrap();
        assert_eq!(doc.root.name, "w:document");
        let decl = doc.decl.as_ref().unwrap();
        assert_eq!(decl.version, "1.0");
        assert_eq!(decl.standalone.as_deref(), Some("yes"));

        let body = doc.root.child("w:body").unwrap();
        let run = body.child("w:p").unwrap().child("w:r").unwrap();
        assert!(run.child("w:rPr").unwrap().child("w:b").is_some());
        let t = run.child("w:t").unwrap();
        assert_eq!(t.text(), "Smith & Sons ");
        assert_eq!(t.attr("xml:space"), Some("preserve"));
    }

    #[test]
    fn reserialised_document_parses_to_same_tree() {
        let doc = XmlDocument::parse(SAMPLE.as_bytes()).unwrap();
        let bytes = doc.to_bytes().unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains("Smith &amp; Sons"));
        assert!(text.contains("<w:b/>"));
        assert!(text.contains("<!-- note -->"));
        assert_eq!(XmlDocument::parse(&bytes).unwrap(), doc);
    }

    #[test]
    fn rejects_unclosed_element() {
        let err = XmlDocument::parse(b"<a><b></b>").unwrap_err();
        assert!(err.message.contains("unclosed"), "got: {err}");
    }

    #[test]
    fn rejects_garbage() {
        assert!(XmlDocument::parse(b"PK\x03\x04 not xml at all").is_err());
    }

    #[test]
    fn set_attr_overwrites_in_place() {
        let mut e = Element::new("w:t").with_attr("a", "1").with_attr("b", "2");
        e.set_attr("a", "3");
        assert_eq!(e.attr("a"), Some("3"));
        assert_eq!(e.attrs[0].0, "a");
        assert_eq!(e.attrs.len(), 2);
    }

    #[test]
    fn contains_any_searches_descendants() {
        let run = Element::new("w:r").with_child(
            Element::new("w:drawing").with_child(Element::new("wp:inline")),
        );
        assert!(run.contains_any(&["w:drawing", "w:pict"]));
        assert_eq!(run.count_named("wp:inline"), 1);
        assert!(!run.contains_any(&["w:pict"]));
    }
}
