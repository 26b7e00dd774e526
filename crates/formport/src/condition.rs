use serde::{Deserialize, Serialize};

use crate::markup::Element;

/// A markup element together with the names of its (unconverted) ancestors.
#[derive(Clone, Copy, Debug)]
pub struct NodeContext<'a> {
    pub element: &'a Element,
    pub ancestors: &'a [String],
}

impl<'a> NodeContext<'a> {
    pub fn new(element: &'a Element, ancestors: &'a [String]) -> Self {
        Self { element, ancestors }
    }

    pub fn parent(&self) -> Option<&'a str> {
        self.ancestors.last().map(String::as_str)
    }

    pub fn grandparent(&self) -> Option<&'a str> {
        self.ancestors
            .len()
            .checked_sub(2)
            .and_then(|idx| self.ancestors.get(idx))
            .map(String::as_str)
    }
}

/// Boolean predicate over a markup element, optionally scoped to named templates.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TemplateCondition {
    AttributeHas {
        attribute: String,
        #[serde(default)]
        templates: Vec<String>,
    },
    AttributeEquals {
        attribute: String,
        value: String,
        #[serde(default)]
        templates: Vec<String>,
    },
    ParentTag {
        tag: String,
        #[serde(default)]
        templates: Vec<String>,
    },
    GrandparentTag {
        tag: String,
        #[serde(default)]
        templates: Vec<String>,
    },
    AllOf {
        conditions: Vec<TemplateCondition>,
        #[serde(default)]
        templates: Vec<String>,
    },
    AnyOf {
        conditions: Vec<TemplateCondition>,
        #[serde(default)]
        templates: Vec<String>,
    },
}

impl TemplateCondition {
    pub fn templates(&self) -> &[String] {
        match self {
            TemplateCondition::AttributeHas { templates, .. }
            | TemplateCondition::AttributeEquals { templates, .. }
            | TemplateCondition::ParentTag { templates, .. }
            | TemplateCondition::GrandparentTag { templates, .. }
            | TemplateCondition::AllOf { templates, .. }
            | TemplateCondition::AnyOf { templates, .. } => templates,
        }
    }

    /// Unscoped conditions apply to every template; scoped ones only to their members.
    pub fn should_check(&self, template_name: &str) -> bool {
        should_check_scope(self.templates(), template_name)
    }

    /// A condition is valid when every required field is non-empty. Combinators
    /// additionally need at least one valid child.
    pub fn is_valid(&self) -> bool {
        match self {
            TemplateCondition::AttributeHas { attribute, .. } => !attribute.trim().is_empty(),
            TemplateCondition::AttributeEquals { attribute, .. } => {
                !attribute.trim().is_empty()
            }
            TemplateCondition::ParentTag { tag, .. }
            | TemplateCondition::GrandparentTag { tag, .. } => !tag.trim().is_empty(),
            TemplateCondition::AllOf { conditions, .. }
            | TemplateCondition::AnyOf { conditions, .. } => {
                !conditions.is_empty() && conditions.iter().all(TemplateCondition::is_valid)
            }
        }
    }

    /// Evaluates the condition. Invalid conditions never match.
    pub fn evaluate(&self, node: &NodeContext<'_>) -> bool {
        if !self.is_valid() {
            return false;
        }
        match self {
            TemplateCondition::AttributeHas { attribute, .. } => {
                node.element.has_attribute(attribute)
            }
            TemplateCondition::AttributeEquals {
                attribute, value, ..
            } => node
                .element
                .attribute_value(attribute)
                .is_some_and(|actual| actual.trim().eq_ignore_ascii_case(value.trim())),
            TemplateCondition::ParentTag { tag, .. } => node
                .parent()
                .is_some_and(|parent| parent.eq_ignore_ascii_case(tag)),
            TemplateCondition::GrandparentTag { tag, .. } => node
                .grandparent()
                .is_some_and(|grandparent| grandparent.eq_ignore_ascii_case(tag)),
            TemplateCondition::AllOf { conditions, .. } => {
                conditions.iter().all(|condition| condition.evaluate(node))
            }
            TemplateCondition::AnyOf { conditions, .. } => {
                conditions.iter().any(|condition| condition.evaluate(node))
            }
        }
    }
}

pub fn should_check_scope(scope: &[String], template_name: &str) -> bool {
    scope.is_empty() || scope.iter().any(|name| name == template_name)
}
