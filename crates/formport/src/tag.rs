use std::path::Path;

use tracing::{debug, warn};

use crate::aggregate::MigrationServices;
use crate::condition::NodeContext;
use crate::conversion::razor_comment;
use crate::embedded_code::{convert_code_block, convert_inline, convert_server_comment};
use crate::error::MigrationError;
use crate::markup::{Element, Node, NodeRewriter};
use crate::template_catalog::TemplateCatalog;

/// Per-file counters reported after tag conversion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TagStats {
    pub templated: usize,
    pub registered: usize,
    pub unconverted: usize,
    pub unsupported: usize,
}

/// Rewrites server controls, embedded code blocks and server comments of a
/// view body. Directive nodes are dropped; they are converted separately.
pub struct TagConverter<'a> {
    catalog: &'a TemplateCatalog,
    services: &'a MigrationServices,
    path: &'a Path,
    stats: TagStats,
}

impl<'a> TagConverter<'a> {
    pub fn new(catalog: &'a TemplateCatalog, services: &'a MigrationServices, path: &'a Path) -> Self {
        Self {
            catalog,
            services,
            path,
            stats: TagStats::default(),
        }
    }

    pub fn stats(&self) -> TagStats {
        self.stats
    }

    fn unsupported(&mut self, element: &Element) -> Node {
        self.stats.unsupported += 1;
        warn!(
            path = %self.path.display(),
            tag = %element.name,
            "no conversion rule for control"
        );
        let original = Node::Element(element.clone()).to_markup();
        Node::Raw(format!(
            "{}{original}",
            razor_comment(&format!("No conversion rule for <{}>", element.name))
        ))
    }
}

impl NodeRewriter for TagConverter<'_> {
    type Error = MigrationError;

    fn rewrite_element(
        &mut self,
        element: &Element,
        ancestors: &[String],
    ) -> Result<Option<Node>, MigrationError> {
        let node = NodeContext::new(element, ancestors);
        let children = element.inner_markup();

        if let Some(markup) = self
            .catalog
            .convert(&node, &children, self.services)
            .map_err(|err| err.context(format!("<{}>", element.name)))?
        {
            self.stats.templated += 1;
            return Ok(Some(Node::Raw(markup)));
        }

        if element.prefix().is_some() {
            if let Some(converter) = self.services.registry.lookup(&element.name) {
                debug!(tag = %element.name, component = %converter.component, "registered control");
                self.stats.registered += 1;
                return Ok(Some(Node::Raw(converter.convert(element, &children))));
            }
            if self.catalog.applicable(element).is_some() {
                self.stats.unconverted += 1;
                debug!(tag = %element.name, "no template matched, left unconverted");
                return Ok(None);
            }
            return Ok(Some(self.unsupported(element)));
        }

        let needs_inline = element.attributes.iter().any(|attr| {
            attr.value
                .as_deref()
                .is_some_and(|value| value.contains("<%") || value.starts_with("~/"))
        });
        if !element.is_server_element() && !needs_inline {
            return Ok(None);
        }

        let mut rewritten = element.clone();
        rewritten.remove_attribute("runat");
        for attr in &mut rewritten.attributes {
            if let Some(value) = &attr.value {
                attr.value = Some(convert_inline(value));
            }
        }
        Ok(Some(Node::Element(rewritten)))
    }

    fn rewrite_leaf(&mut self, node: &Node) -> Result<Option<Node>, MigrationError> {
        Ok(match node {
            Node::CodeBlock { kind, code } => Some(Node::Raw(convert_code_block(*kind, code))),
            Node::ServerComment(text) => Some(Node::Raw(convert_server_comment(text))),
            Node::Directive(_) => Some(Node::Raw(String::new())),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::parse;
    use crate::registry::ControlConverter;
    use pretty_assertions::assert_eq;

    fn convert(source: &str, services: &MigrationServices) -> (String, TagStats) {
        let catalog = TemplateCatalog::embedded().unwrap();
        let mut doc = parse(source);
        let mut converter = TagConverter::new(&catalog, services, Path::new("Default.aspx"));
        doc.rewrite(&mut converter).unwrap();
        (doc.serialize(), converter.stats())
    }

    #[test]
    fn nested_controls_convert_bottom_up() {
        let services = MigrationServices::new();
        let (out, stats) = convert(
            "<form runat=\"server\"><asp:DropDownList ID=\"Size\" runat=\"server\">\
             <asp:ListItem Value=\"s\" Text=\"Small\" /></asp:DropDownList></form>",
            &services,
        );
        assert_eq!(
            out,
            "<select @bind=\"Size\"><option value=\"s\">Small</option></select>"
        );
        assert_eq!(stats.templated, 3);
    }

    #[test]
    fn registered_controls_use_the_registry() {
        let services = MigrationServices::new();
        services.registry.register(
            "TCounter",
            "Counter",
            ControlConverter {
                tag: "TCounter:Counter".into(),
                component: "Counter".into(),
                source: "~/CustomControls/Counter.ascx".into(),
            },
        );
        let (out, stats) = convert(
            "<div><TCounter:Counter runat=\"server\" Start=\"3\" /></div>",
            &services,
        );
        assert_eq!(out, "<div><Counter Start=\"3\" /></div>");
        assert_eq!(stats.registered, 1);
    }

    #[test]
    fn unknown_prefixed_controls_keep_markup_behind_comment() {
        let services = MigrationServices::new();
        let (out, stats) = convert("<asp:Calendar ID=\"c\" runat=\"server\" />", &services);
        assert_eq!(
            out,
            "@* No conversion rule for <asp:Calendar> *@<asp:Calendar ID=\"c\" runat=\"server\" />"
        );
        assert_eq!(stats.unsupported, 1);
    }

    #[test]
    fn orphan_list_item_is_left_unconverted() {
        let services = MigrationServices::new();
        let (out, stats) = convert("<asp:ListItem Text=\"x\" />", &services);
        assert_eq!(out, "<asp:ListItem Text=\"x\" />");
        assert_eq!(stats.unconverted, 1);
    }

    #[test]
    fn plain_server_elements_lose_runat_and_convert_values() {
        let services = MigrationServices::new();
        let (out, _) = convert(
            "<div id=\"x\" runat=\"server\"><a href=\"~/About.aspx\">About</a></div>",
            &services,
        );
        assert_eq!(out, "<div id=\"x\"><a href=\"/About.aspx\">About</a></div>");
    }

    #[test]
    fn code_blocks_comments_and_directives() {
        let services = MigrationServices::new();
        let (out, _) = convert(
            "<%@ Page Language=\"C#\" %><p><%= Title %></p><%-- note --%>",
            &services,
        );
        assert_eq!(out, "<p>@(Title)</p>@* note *@");
    }
}
