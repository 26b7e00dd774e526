//! Lenient markup tree for legacy view files.
//!
//! The tree keeps everything the conversion stages do not touch: element names
//! keep their case, attributes keep their order and quoting, and server blocks
//! (`<%@ %>`, `<% %>`, `<%-- --%>`) are first-class nodes.

mod parser;

pub use parser::parse;

/// Elements that never take children.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose body is raw text.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: Option<String>,
    pub quote: Option<char>,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            quote: Some('"'),
        }
    }

    fn write(&self, out: &mut String) {
        out.push(' ');
        out.push_str(&self.name);
        if let Some(value) = &self.value {
            out.push('=');
            match self.quote {
                Some(quote) => {
                    out.push(quote);
                    out.push_str(value);
                    out.push(quote);
                }
                None => out.push_str(value),
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
    pub self_closing: bool,
    /// Whether the source carried an explicit end tag.
    pub closed: bool,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
            self_closing: false,
            closed: true,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|attr| attr.name.eq_ignore_ascii_case(name))
    }

    pub fn attribute_value(&self, name: &str) -> Option<&str> {
        self.attribute(name).and_then(|attr| attr.value.as_deref())
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<Attribute> {
        let idx = self
            .attributes
            .iter()
            .position(|attr| attr.name.eq_ignore_ascii_case(name))?;
        Some(self.attributes.remove(idx))
    }

    /// True for elements marked `runat="server"`.
    pub fn is_server_element(&self) -> bool {
        self.attribute_value("runat")
            .is_some_and(|value| value.trim().eq_ignore_ascii_case("server"))
    }

    /// Tag prefix for `prefix:name` tags.
    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(prefix, _)| prefix)
    }

    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub fn is_void(&self) -> bool {
        is_void_element(&self.name)
    }

    /// Serialized children only.
    pub fn inner_markup(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            child.write(&mut out);
        }
        out
    }

    fn write(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for attr in &self.attributes {
            attr.write(out);
        }
        if self.self_closing {
            out.push_str(" />");
            return;
        }
        out.push('>');
        for child in &self.children {
            child.write(out);
        }
        if self.closed {
            out.push_str("</");
            out.push_str(&self.name);
            out.push('>');
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodeBlockKind {
    /// `<% statements %>`
    Statement,
    /// `<%= expression %>`
    Expression,
    /// `<%: expression %>`
    EncodedExpression,
    /// `<%# binding %>`
    DataBinding,
    /// `<%$ builder %>`
    ExpressionBuilder,
}

impl CodeBlockKind {
    fn marker(self) -> &'static str {
        match self {
            CodeBlockKind::Statement => "",
            CodeBlockKind::Expression => "=",
            CodeBlockKind::EncodedExpression => ":",
            CodeBlockKind::DataBinding => "#",
            CodeBlockKind::ExpressionBuilder => "$",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    Comment(String),
    /// Body of a `<%@ ... %>` block.
    Directive(String),
    CodeBlock {
        kind: CodeBlockKind,
        code: String,
    },
    ServerComment(String),
    /// Already-converted output, emitted verbatim.
    Raw(String),
}

impl Node {
    pub fn to_markup(&self) -> String {
        let mut out = String::new();
        self.write(&mut out);
        out
    }

    fn write(&self, out: &mut String) {
        match self {
            Node::Element(element) => element.write(out),
            Node::Text(text) | Node::Raw(text) => out.push_str(text),
            Node::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            Node::Directive(body) => {
                out.push_str("<%@");
                out.push_str(body);
                out.push_str("%>");
            }
            Node::CodeBlock { kind, code } => {
                out.push_str("<%");
                out.push_str(kind.marker());
                out.push_str(code);
                out.push_str("%>");
            }
            Node::ServerComment(text) => {
                out.push_str("<%--");
                out.push_str(text);
                out.push_str("--%>");
            }
        }
    }
}

/// Parsed view document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Document {
    pub nodes: Vec<Node>,
}

impl Document {
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            node.write(&mut out);
        }
        out
    }

    /// Collects every element matching `predicate`, in document order.
    pub fn select<'a, P>(&'a self, predicate: P) -> Vec<&'a Element>
    where
        P: Fn(&Element) -> bool,
    {
        let mut found = Vec::new();
        collect_elements(&self.nodes, &predicate, &mut found);
        found
    }

    /// Runs `rewriter` over the tree. Elements are visited post-order so every
    /// element sees its already-rewritten children and its original ancestors.
    pub fn rewrite<R: NodeRewriter>(&mut self, rewriter: &mut R) -> Result<(), R::Error> {
        let mut ancestors = Vec::new();
        rewrite_nodes(&mut self.nodes, &mut ancestors, rewriter)
    }
}

/// Replacement hooks for [`Document::rewrite`]. Returning `None` keeps the node.
pub trait NodeRewriter {
    type Error;

    fn rewrite_element(
        &mut self,
        element: &Element,
        ancestors: &[String],
    ) -> Result<Option<Node>, Self::Error>;

    fn rewrite_leaf(&mut self, _node: &Node) -> Result<Option<Node>, Self::Error> {
        Ok(None)
    }
}

fn rewrite_nodes<R: NodeRewriter>(
    nodes: &mut [Node],
    ancestors: &mut Vec<String>,
    rewriter: &mut R,
) -> Result<(), R::Error> {
    for node in nodes.iter_mut() {
        let replacement = match &mut *node {
            Node::Element(element) => {
                ancestors.push(element.name.clone());
                let result = rewrite_nodes(&mut element.children, ancestors, rewriter);
                ancestors.pop();
                result?;
                rewriter.rewrite_element(element, ancestors)?
            }
            other => rewriter.rewrite_leaf(other)?,
        };
        if let Some(replacement) = replacement {
            *node = replacement;
        }
    }
    Ok(())
}

fn collect_elements<'a, P>(nodes: &'a [Node], predicate: &P, found: &mut Vec<&'a Element>)
where
    P: Fn(&Element) -> bool,
{
    for node in nodes {
        if let Node::Element(element) = node {
            if predicate(element) {
                found.push(element);
            }
            collect_elements(&element.children, predicate, found);
        }
    }
}

pub fn is_void_element(name: &str) -> bool {
    VOID_ELEMENTS
        .iter()
        .any(|void| void.eq_ignore_ascii_case(name))
}

pub fn is_raw_text_element(name: &str) -> bool {
    RAW_TEXT_ELEMENTS
        .iter()
        .any(|raw| raw.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Upper;

    impl NodeRewriter for Upper {
        type Error = ();

        fn rewrite_element(
            &mut self,
            element: &Element,
            ancestors: &[String],
        ) -> Result<Option<Node>, ()> {
            if element.is_named("b") {
                return Ok(Some(Node::Raw(format!(
                    "[{}:{}]",
                    ancestors.join("/"),
                    element.inner_markup()
                ))));
            }
            Ok(None)
        }

        fn rewrite_leaf(&mut self, node: &Node) -> Result<Option<Node>, ()> {
            match node {
                Node::Comment(text) => Ok(Some(Node::Raw(format!("@*{text}*@")))),
                _ => Ok(None),
            }
        }
    }

    #[test]
    fn rewrite_is_post_order_with_original_ancestors() {
        let mut doc = parse("<div><p><b>x</b></p></div>");
        doc.rewrite(&mut Upper).unwrap();
        assert_eq!(doc.serialize(), "<div><p>[div/p:x]</p></div>");
    }

    #[test]
    fn rewrite_replaces_leaves_in_place() {
        let mut doc = parse("<!-- top --><div><!-- inner -->text</div>");
        doc.rewrite(&mut Upper).unwrap();
        assert_eq!(doc.serialize(), "@* top *@<div>@* inner *@text</div>");
    }

    #[test]
    fn select_finds_nested_server_elements() {
        let doc = parse(
            "<div runat=\"server\"><asp:Label runat=\"server\" Text=\"a\" /><span>b</span></div>",
        );
        let found = doc.select(Element::is_server_element);
        let names: Vec<_> = found.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["div", "asp:Label"]);
    }

    #[test]
    fn element_helpers_are_case_insensitive() {
        let doc = parse("<asp:HyperLink RunAt=\"Server\" navigateurl=\"~/a\" />");
        let link = doc.select(|_| true)[0];
        assert!(link.is_server_element());
        assert_eq!(link.prefix(), Some("asp"));
        assert_eq!(link.attribute_value("NavigateUrl"), Some("~/a"));
    }
}
