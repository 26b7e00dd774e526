use std::collections::BTreeMap;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::embedded_code::convert_inline;
use crate::markup::{Attribute, Element};

/// Converts usages of a registered user control into a component tag.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ControlConverter {
    /// Tag as written in the registering directive (`prefix:name`).
    pub tag: String,
    /// Component name derived from the control's source file stem.
    pub component: String,
    /// Source path as written in the registering directive.
    pub source: String,
}

impl ControlConverter {
    pub fn convert(&self, element: &Element, children: &str) -> String {
        let mut out = String::new();
        out.push('<');
        out.push_str(&self.component);
        for attr in element
            .attributes
            .iter()
            .filter(|attr| !attr.name.eq_ignore_ascii_case("runat"))
        {
            let converted = Attribute {
                name: attr.name.clone(),
                value: attr.value.as_deref().map(convert_inline),
                quote: attr.quote.or(Some('"')),
            };
            out.push(' ');
            out.push_str(&converted.name);
            if let (Some(value), Some(quote)) = (&converted.value, converted.quote) {
                out.push('=');
                out.push(quote);
                out.push_str(value);
                out.push(quote);
            }
        }
        if children.trim().is_empty() {
            out.push_str(" />");
        } else {
            out.push('>');
            out.push_str(children);
            out.push_str("</");
            out.push_str(&self.component);
            out.push('>');
        }
        out
    }
}

/// Run-wide `prefix:name` → converter map. Concurrent inserts are allowed; a
/// repeated registration of the same tag overwrites the previous one.
#[derive(Default)]
pub struct ControlRegistry {
    entries: DashMap<String, ControlConverter>,
}

impl ControlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `prefix:name`, returning the converter it replaced.
    pub fn register(
        &self,
        prefix: &str,
        name: &str,
        converter: ControlConverter,
    ) -> Option<ControlConverter> {
        self.entries.insert(registry_key(prefix, name), converter)
    }

    /// Looks up a full `prefix:name` tag, ignoring case.
    pub fn lookup(&self, tag: &str) -> Option<ControlConverter> {
        let (prefix, name) = tag.split_once(':')?;
        self.entries
            .get(&registry_key(prefix, name))
            .map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn snapshot(&self) -> BTreeMap<String, ControlConverter> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

fn registry_key(prefix: &str, name: &str) -> String {
    format!(
        "{}:{}",
        prefix.trim().to_ascii_lowercase(),
        name.trim().to_ascii_lowercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::{Node, parse};
    use std::sync::Arc;

    fn counter(source: &str) -> ControlConverter {
        ControlConverter {
            tag: "TCounter:Counter".into(),
            component: "Counter".into(),
            source: source.into(),
        }
    }

    #[test]
    fn lookup_ignores_case_and_last_write_wins() {
        let registry = ControlRegistry::new();
        assert!(registry.register("TCounter", "Counter", counter("~/a.ascx")).is_none());
        let replaced = registry.register("tcounter", "COUNTER", counter("~/b.ascx"));

        assert_eq!(replaced.map(|c| c.source), Some("~/a.ascx".to_string()));
        assert_eq!(
            registry.lookup("TCOUNTER:counter").map(|c| c.source),
            Some("~/b.ascx".to_string())
        );
        assert!(registry.lookup("Counter").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn converter_emits_component_tag_without_runat() {
        let doc = parse("<TCounter:Counter ID=\"c1\" runat=\"server\" Start=\"<%= 5 %>\" />");
        let Node::Element(element) = &doc.nodes[0] else {
            panic!("expected element");
        };
        let out = counter("~/Counter.ascx").convert(element, "");
        assert_eq!(out, "<Counter ID=\"c1\" Start=\"@(5)\" />");

        let wrapped = counter("~/Counter.ascx").convert(element, "<b>x</b>");
        assert_eq!(wrapped, "<Counter ID=\"c1\" Start=\"@(5)\"><b>x</b></Counter>");
    }

    #[test]
    fn concurrent_registration_is_safe() {
        let registry = Arc::new(ControlRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|idx| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    registry.register(
                        "uc",
                        &format!("Control{idx}"),
                        ControlConverter {
                            tag: format!("uc:Control{idx}"),
                            component: format!("Control{idx}"),
                            source: format!("~/Control{idx}.ascx"),
                        },
                    );
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.snapshot().len(), 8);
    }
}
