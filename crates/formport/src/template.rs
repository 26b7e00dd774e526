use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::aggregate::MigrationServices;
use crate::condition::{NodeContext, TemplateCondition, should_check_scope};

/// Name of the catch-all template, always tried last.
pub const DEFAULT_TEMPLATE: &str = "Default";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NamedTemplate {
    pub name: String,
    pub template: String,
}

impl NamedTemplate {
    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_TEMPLATE
    }
}

/// Side effect run once when a template scoped to it is selected.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TemplateInvokable {
    AddPackage {
        #[serde(default)]
        package: String,
        #[serde(default)]
        templates: Vec<String>,
    },
    AddImport {
        #[serde(default)]
        namespace: String,
        #[serde(default)]
        templates: Vec<String>,
    },
}

impl TemplateInvokable {
    pub fn templates(&self) -> &[String] {
        match self {
            TemplateInvokable::AddPackage { templates, .. }
            | TemplateInvokable::AddImport { templates, .. } => templates,
        }
    }

    pub fn should_invoke(&self, template_name: &str) -> bool {
        should_check_scope(self.templates(), template_name)
    }

    pub fn is_valid(&self) -> bool {
        match self {
            TemplateInvokable::AddPackage { package, .. } => !package.trim().is_empty(),
            TemplateInvokable::AddImport { namespace, .. } => !namespace.trim().is_empty(),
        }
    }

    pub fn invoke(&self, services: &MigrationServices) {
        match self {
            TemplateInvokable::AddPackage { package, .. } => {
                services.packages.add(package.trim());
            }
            TemplateInvokable::AddImport { namespace, .. } => {
                services.imports.add(namespace.trim());
            }
        }
    }
}

/// Every template, condition and invokable declared for one control tag.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ControlTemplates {
    pub tag: String,
    pub templates: Vec<NamedTemplate>,
    #[serde(default)]
    pub conditions: Vec<TemplateCondition>,
    #[serde(default)]
    pub invokables: Vec<TemplateInvokable>,
    /// Unprefixed tags only convert when marked `runat="server"` unless this
    /// is cleared.
    #[serde(default = "default_server_only")]
    pub server_only: bool,
}

fn default_server_only() -> bool {
    true
}

impl ControlTemplates {
    /// Candidates in declared order with the default moved to the end.
    pub fn candidates(&self) -> impl Iterator<Item = &NamedTemplate> {
        self.templates
            .iter()
            .filter(|template| !template.is_default())
            .chain(self.templates.iter().filter(|template| template.is_default()))
    }

    /// First candidate whose applicable conditions all hold.
    pub fn select(&self, node: &NodeContext<'_>) -> Option<&NamedTemplate> {
        let selected = self.candidates().find(|candidate| {
            self.conditions
                .iter()
                .filter(|condition| condition.should_check(&candidate.name))
                .all(|condition| condition.evaluate(node))
        });
        match selected {
            Some(template) => debug!(
                tag = %self.tag,
                template = %template.name,
                "selected control template"
            ),
            None => debug!(tag = %self.tag, "no control template matched"),
        }
        selected
    }

    /// Runs every valid invokable scoped to `template_name`, once each.
    pub fn run_invokables(&self, template_name: &str, services: &MigrationServices) -> usize {
        let mut ran = 0;
        for invokable in &self.invokables {
            if !invokable.should_invoke(template_name) {
                continue;
            }
            if !invokable.is_valid() {
                warn!(tag = %self.tag, ?invokable, "skipping invalid template invokable");
                continue;
            }
            invokable.invoke(services);
            ran += 1;
        }
        ran
    }
}
