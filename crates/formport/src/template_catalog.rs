use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::aggregate::MigrationServices;
use crate::condition::NodeContext;
use crate::embedded_code::convert_inline;
use crate::error::MigrationError;
use crate::markup::Element;
use crate::template::{ControlTemplates, NamedTemplate};

const EMBEDDED_CONTROLS: &str = include_str!("../templates/controls.json");

pub type TokenMap = BTreeMap<String, serde_json::Value>;

/// On-disk catalog layout shared by the embedded default and user overrides.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CatalogDocument {
    #[serde(default)]
    pub controls: Vec<ControlTemplates>,
}

impl CatalogDocument {
    pub fn from_json(raw: &str) -> Result<Self, MigrationError> {
        serde_json::from_str(raw)
            .map_err(|err| MigrationError::Template(format!("invalid control catalog: {err}")))
    }

    pub fn embedded() -> Result<Self, MigrationError> {
        Self::from_json(EMBEDDED_CONTROLS)
    }
}

/// Control templates keyed by tag, with every template precompiled.
pub struct TemplateCatalog {
    controls: BTreeMap<String, ControlTemplates>,
    registry: Handlebars<'static>,
}

impl TemplateCatalog {
    /// The built-in catalog only.
    pub fn embedded() -> Result<Self, MigrationError> {
        Self::from_documents(vec![CatalogDocument::embedded()?])
    }

    /// The built-in catalog with entries from `override_path` replacing it
    /// tag-by-tag.
    pub fn load(override_path: Option<&Path>) -> Result<Self, MigrationError> {
        let mut documents = vec![CatalogDocument::embedded()?];
        if let Some(path) = override_path {
            let raw = fs::read_to_string(path)
                .map_err(|err| MigrationError::from(err).context(path.display().to_string()))?;
            let document = CatalogDocument::from_json(&raw)
                .map_err(|err| err.context(path.display().to_string()))?;
            info!(
                path = %path.display(),
                controls = document.controls.len(),
                "loaded control template overrides"
            );
            documents.push(document);
        }
        Self::from_documents(documents)
    }

    /// Later documents replace earlier entries for the same tag.
    pub fn from_documents(documents: Vec<CatalogDocument>) -> Result<Self, MigrationError> {
        let mut controls = BTreeMap::new();
        for document in documents {
            for entry in document.controls {
                let key = entry.tag.to_ascii_lowercase();
                if controls.insert(key, entry).is_some() {
                    debug!("control template entry replaced");
                }
            }
        }

        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        for (key, entry) in &controls {
            for template in &entry.templates {
                registry
                    .register_template_string(&template_key(key, &template.name), &template.template)
                    .map_err(|err| {
                        MigrationError::from(err)
                            .context(format!("template {} of {}", template.name, entry.tag))
                    })?;
            }
        }

        Ok(Self { controls, registry })
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }

    pub fn get(&self, tag: &str) -> Option<&ControlTemplates> {
        self.controls.get(&tag.to_ascii_lowercase())
    }

    /// Catalog entry that governs `element`, if any. Unprefixed entries only
    /// apply to server elements unless they opt out.
    pub fn applicable(&self, element: &Element) -> Option<&ControlTemplates> {
        let entry = self.get(&element.name)?;
        let eligible =
            element.prefix().is_some() || !entry.server_only || element.is_server_element();
        eligible.then_some(entry)
    }

    pub fn render(
        &self,
        controls: &ControlTemplates,
        template: &NamedTemplate,
        tokens: &TokenMap,
    ) -> Result<String, MigrationError> {
        let key = template_key(&controls.tag.to_ascii_lowercase(), &template.name);
        self.registry
            .render(&key, tokens)
            .map_err(|err| MigrationError::from(err).context(format!("rendering {key}")))
    }

    /// Selects, invokes and renders the template for `node`. `Ok(None)` means
    /// no entry applied or no candidate matched; the node stays unconverted.
    pub fn convert(
        &self,
        node: &NodeContext<'_>,
        children: &str,
        services: &MigrationServices,
    ) -> Result<Option<String>, MigrationError> {
        let Some(controls) = self.applicable(node.element) else {
            return Ok(None);
        };
        let Some(template) = controls.select(node) else {
            return Ok(None);
        };
        controls.run_invokables(&template.name, services);
        let tokens = element_tokens(node.element, children);
        self.render(controls, template, &tokens).map(Some)
    }
}

/// Builds the render context for an element: every attribute under its
/// original and lower-case name, plus `children` and `tag`.
pub fn element_tokens(element: &Element, children: &str) -> TokenMap {
    let mut tokens = TokenMap::new();
    for attr in &element.attributes {
        let value = match &attr.value {
            Some(value) => serde_json::Value::String(convert_inline(value)),
            None => serde_json::Value::Bool(true),
        };
        tokens.insert(attr.name.to_ascii_lowercase(), value.clone());
        tokens.insert(attr.name.clone(), value);
    }
    tokens.insert(
        "children".to_string(),
        serde_json::Value::String(children.to_string()),
    );
    tokens.insert(
        "tag".to_string(),
        serde_json::Value::String(element.name.clone()),
    );
    tokens
}

fn template_key(tag_key: &str, name: &str) -> String {
    format!("{tag_key}#{name}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::{Node, parse};
    use std::io::Write;

    fn element(source: &str) -> Element {
        match parse(source).nodes.into_iter().next() {
            Some(Node::Element(element)) => element,
            other => panic!("expected element, got {other:?}"),
        }
    }

    #[test]
    fn embedded_catalog_compiles() {
        let catalog = TemplateCatalog::embedded().unwrap();
        assert!(catalog.get("asp:TextBox").is_some());
        assert!(catalog.get("ASP:LABEL").is_some());
    }

    #[test]
    fn textbox_modes_render_distinct_inputs() {
        let catalog = TemplateCatalog::embedded().unwrap();
        let services = MigrationServices::new();

        let password =
            element("<asp:TextBox ID=\"Secret\" TextMode=\"Password\" runat=\"server\" />");
        let out = catalog
            .convert(&NodeContext::new(&password, &[]), "", &services)
            .unwrap()
            .unwrap();
        assert!(out.contains("type=\"password\""), "{out}");
        assert!(out.contains("@bind=\"Secret\""), "{out}");

        let multi = element("<asp:TextBox ID=\"Notes\" TextMode=\"MultiLine\" runat=\"server\" />");
        let out = catalog
            .convert(&NodeContext::new(&multi, &[]), "", &services)
            .unwrap()
            .unwrap();
        assert!(out.starts_with("<textarea"), "{out}");
    }

    #[test]
    fn list_items_depend_on_parent_tag() {
        let catalog = TemplateCatalog::embedded().unwrap();
        let services = MigrationServices::new();
        let item = element("<asp:ListItem Value=\"1\" Text=\"One\" />");

        let in_select = vec!["asp:DropDownList".to_string()];
        let out = catalog
            .convert(&NodeContext::new(&item, &in_select), "", &services)
            .unwrap();
        assert_eq!(out.as_deref(), Some("<option value=\"1\">One</option>"));

        let orphan: Vec<String> = vec!["div".into()];
        assert!(
            catalog
                .convert(&NodeContext::new(&item, &orphan), "", &services)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn grid_view_registers_package_and_import() {
        let catalog = TemplateCatalog::embedded().unwrap();
        let services = MigrationServices::new();
        let grid = element("<asp:GridView ID=\"Orders\" runat=\"server\"></asp:GridView>");
        catalog
            .convert(&NodeContext::new(&grid, &[]), "", &services)
            .unwrap()
            .unwrap();
        assert_eq!(
            services.packages.snapshot(),
            vec!["Microsoft.AspNetCore.Components.QuickGrid".to_string()]
        );
        assert_eq!(
            services.imports.snapshot(),
            vec!["Microsoft.AspNetCore.Components.QuickGrid".to_string()]
        );
    }

    #[test]
    fn plain_form_without_runat_is_not_converted() {
        let catalog = TemplateCatalog::embedded().unwrap();
        assert!(catalog.applicable(&element("<form></form>")).is_none());
        assert!(
            catalog
                .applicable(&element("<form runat=\"server\"></form>"))
                .is_some()
        );
    }

    #[test]
    fn user_catalog_replaces_entries_by_tag() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"controls": [{{"tag": "asp:Label", "templates": [
                {{"name": "Default", "template": "<em>{{{{text}}}}</em>"}}
            ]}}]}}"#
        )
        .unwrap();

        let catalog = TemplateCatalog::load(Some(file.path())).unwrap();
        let label = element("<asp:Label Text=\"Hi\" runat=\"server\" />");
        let out = catalog
            .convert(&NodeContext::new(&label, &[]), "", &MigrationServices::new())
            .unwrap();
        assert_eq!(out.as_deref(), Some("<em>Hi</em>"));
        assert!(catalog.get("asp:TextBox").is_some());
    }

    #[test]
    fn tokens_include_lowercase_names_and_converted_values() {
        let link = element("<asp:HyperLink NavigateUrl=\"~/Home.aspx\" Visible />");
        let tokens = element_tokens(&link, "<b>x</b>");
        assert_eq!(tokens["navigateurl"], "/Home.aspx");
        assert_eq!(tokens["NavigateUrl"], "/Home.aspx");
        assert_eq!(tokens["visible"], true);
        assert_eq!(tokens["children"], "<b>x</b>");
        assert_eq!(tokens["tag"], "asp:HyperLink");
    }
}
