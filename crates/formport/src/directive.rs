//! Conversion of `<%@ ... %>` directives into component directives.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::aggregate::MigrationServices;
use crate::conversion::{ConversionResult, join_results, normalize_results, partition_imports};
use crate::embedded_code::convert_inline;
use crate::naming::{
    component_name, namespace_for_dir, namespace_for_source, relative_dir, route_for,
    sanitize_identifier,
};
use crate::registry::ControlConverter;

/// The kind of view a directive appears in.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    Page,
    Control,
    Master,
}

impl ViewKind {
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "aspx" => Some(ViewKind::Page),
            "ascx" => Some(ViewKind::Control),
            "master" => Some(ViewKind::Master),
            _ => None,
        }
    }

    pub fn directive_kind(self) -> DirectiveKind {
        match self {
            ViewKind::Page => DirectiveKind::Page,
            ViewKind::Control => DirectiveKind::Control,
            ViewKind::Master => DirectiveKind::Master,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DirectiveKind {
    Page,
    Control,
    Master,
    Import,
    Register,
    Unsupported,
}

impl DirectiveKind {
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "page" => DirectiveKind::Page,
            "control" => DirectiveKind::Control,
            "master" => DirectiveKind::Master,
            "import" => DirectiveKind::Import,
            "register" => DirectiveKind::Register,
            _ => DirectiveKind::Unsupported,
        }
    }

    fn label(self) -> &'static str {
        match self {
            DirectiveKind::Page => "Page",
            DirectiveKind::Control => "Control",
            DirectiveKind::Master => "Master",
            DirectiveKind::Import => "Import",
            DirectiveKind::Register => "Register",
            DirectiveKind::Unsupported => "unsupported",
        }
    }

    fn rules(self) -> &'static DirectiveRules {
        match self {
            DirectiveKind::Page => &PAGE_RULES,
            DirectiveKind::Control => &CONTROL_RULES,
            DirectiveKind::Master => &MASTER_RULES,
            DirectiveKind::Import => &IMPORT_RULES,
            DirectiveKind::Register | DirectiveKind::Unsupported => &NO_RULES,
        }
    }
}

type Override = fn(&str) -> Vec<ConversionResult>;

/// Attribute allow-list and override map for one directive kind.
struct DirectiveRules {
    allowed: &'static [&'static str],
    overrides: &'static [(&'static str, Override)],
}

impl DirectiveRules {
    fn override_for(&self, attribute: &str) -> Option<Override> {
        self.overrides
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(attribute))
            .map(|(_, rule)| *rule)
    }

    fn allows(&self, attribute: &str) -> bool {
        self.allowed
            .iter()
            .any(|name| name.eq_ignore_ascii_case(attribute))
    }
}

fn suppress(_: &str) -> Vec<ConversionResult> {
    Vec::new()
}

fn page_inherits(value: &str) -> Vec<ConversionResult> {
    vec![ConversionResult::comment(format!(
        "Inherits=\"{value}\" is carried by the code-behind partial class"
    ))]
}

fn master_inherits(value: &str) -> Vec<ConversionResult> {
    vec![ConversionResult::comment(format!(
        "Unsupported attribute Inherits=\"{value}\": layouts inherit LayoutComponentBase"
    ))]
}

const VIEW_OVERRIDES: &[(&str, Override)] = &[
    ("Inherits", page_inherits),
    ("CodeBehind", suppress),
    ("CodeFile", suppress),
    ("AutoEventWireup", suppress),
    ("Language", suppress),
];

const MASTER_OVERRIDES: &[(&str, Override)] = &[
    ("Inherits", master_inherits),
    ("CodeBehind", suppress),
    ("CodeFile", suppress),
    ("AutoEventWireup", suppress),
    ("Language", suppress),
];

static PAGE_RULES: DirectiveRules = DirectiveRules {
    allowed: &["MasterPageFile", "Title", "MetaDescription", "MetaKeywords"],
    overrides: VIEW_OVERRIDES,
};

static CONTROL_RULES: DirectiveRules = DirectiveRules {
    allowed: &[],
    overrides: VIEW_OVERRIDES,
};

static MASTER_RULES: DirectiveRules = DirectiveRules {
    allowed: &["MasterPageFile"],
    overrides: MASTER_OVERRIDES,
};

static IMPORT_RULES: DirectiveRules = DirectiveRules {
    allowed: &["Namespace"],
    overrides: &[],
};

static NO_RULES: DirectiveRules = DirectiveRules {
    allowed: &[],
    overrides: &[],
};

fn name_regex() -> &'static Regex {
    static NAME: OnceLock<Regex> = OnceLock::new();
    NAME.get_or_init(|| {
        Regex::new(r"^\s*([A-Za-z][A-Za-z0-9]*)\s*(=)?").expect("directive name regex is valid")
    })
}

fn attribute_regex() -> &'static Regex {
    static ATTRIBUTE: OnceLock<Regex> = OnceLock::new();
    ATTRIBUTE.get_or_init(|| {
        Regex::new(r#"([A-Za-z_][\w:.\-]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"']+))"#)
            .expect("directive attribute regex is valid")
    })
}

/// A directive body split into its name and attributes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedDirective {
    pub name: Option<String>,
    pub attributes: Vec<(String, String)>,
    pub raw: String,
}

impl ParsedDirective {
    pub fn parse(body: &str) -> Self {
        let mut rest = body;
        let mut name = None;
        if let Some(caps) = name_regex().captures(body) {
            if caps.get(2).is_none() {
                name = caps.get(1).map(|m| m.as_str().to_string());
                rest = &body[caps.get(1).map_or(0, |m| m.end())..];
            }
        }
        let attributes = attribute_regex()
            .captures_iter(rest)
            .map(|caps| {
                let value = caps
                    .get(2)
                    .or_else(|| caps.get(3))
                    .or_else(|| caps.get(4))
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default();
                (caps[1].to_string(), value)
            })
            .collect();
        Self {
            name,
            attributes,
            raw: body.trim().to_string(),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
            .filter(|value| !value.trim().is_empty())
    }

    /// The directive as written, wrapped back into its delimiters.
    pub fn original(&self) -> String {
        format!("<%@ {} %>", self.raw)
    }
}

/// Converts the directives of one view file.
pub struct DirectiveConverter<'a> {
    relative_path: &'a Path,
    root_namespace: &'a str,
    view_kind: ViewKind,
    services: &'a MigrationServices,
}

impl<'a> DirectiveConverter<'a> {
    pub fn new(
        relative_path: &'a Path,
        root_namespace: &'a str,
        view_kind: ViewKind,
        services: &'a MigrationServices,
    ) -> Self {
        Self {
            relative_path,
            root_namespace,
            view_kind,
            services,
        }
    }

    /// Converts one directive body. The result is sorted by kind and free of
    /// duplicates.
    pub fn convert(&self, body: &str) -> Vec<ConversionResult> {
        let parsed = ParsedDirective::parse(body);
        let kind = parsed
            .name
            .as_deref()
            .map(DirectiveKind::from_name)
            .unwrap_or_else(|| self.view_kind.directive_kind());
        debug!(
            path = %self.relative_path.display(),
            directive = kind.label(),
            "converting directive"
        );

        let results = match kind {
            DirectiveKind::Register => self.convert_register(&parsed),
            DirectiveKind::Unsupported => {
                warn!(
                    path = %self.relative_path.display(),
                    directive = %parsed.raw,
                    "unsupported directive"
                );
                vec![ConversionResult::comment(format!(
                    "Unsupported directive: {}",
                    parsed.original()
                ))]
            }
            _ => {
                let mut results = self.general_results(kind);
                results.extend(self.convert_attributes(kind, &parsed));
                results
            }
        };
        normalize_results(results)
    }

    /// Converts every directive of a file, forwards imports to the shared
    /// aggregator and returns the directive block.
    pub fn convert_all<I, S>(&self, bodies: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut results = Vec::new();
        for body in bodies {
            results.extend(self.convert(body.as_ref()));
        }
        if !has_namespace_directive(&results) {
            results.extend(self.general_results(self.view_kind.directive_kind()));
        }
        self.emit(normalize_results(results))
    }

    /// Forwards imports and joins the remaining results.
    pub fn emit(&self, results: Vec<ConversionResult>) -> String {
        let (imports, inline) = partition_imports(results);
        for import in &imports {
            if let Some(namespace) = import.imported_namespace() {
                self.services.imports.add(namespace);
            }
        }
        join_results(&inline)
    }

    fn current_dir(&self) -> std::path::PathBuf {
        relative_dir(self.relative_path)
    }

    fn namespace(&self) -> String {
        namespace_for_dir(self.root_namespace, &self.current_dir())
    }

    fn general_results(&self, kind: DirectiveKind) -> Vec<ConversionResult> {
        match kind {
            DirectiveKind::Page => vec![
                ConversionResult::directive(format!("@page \"{}\"", route_for(self.relative_path))),
                ConversionResult::directive(format!("@namespace {}", self.namespace())),
            ],
            DirectiveKind::Control => vec![ConversionResult::directive(format!(
                "@namespace {}",
                self.namespace()
            ))],
            DirectiveKind::Master => vec![
                ConversionResult::directive(format!("@namespace {}", self.namespace())),
                ConversionResult::directive("@inherits LayoutComponentBase"),
            ],
            _ => Vec::new(),
        }
    }

    fn convert_attributes(
        &self,
        kind: DirectiveKind,
        parsed: &ParsedDirective,
    ) -> Vec<ConversionResult> {
        let rules = kind.rules();
        let mut results = Vec::new();
        for (name, value) in &parsed.attributes {
            if let Some(rule) = rules.override_for(name) {
                results.extend(rule(value));
            } else if rules.allows(name) {
                results.extend(map_attribute(name, value));
            } else {
                warn!(
                    path = %self.relative_path.display(),
                    directive = kind.label(),
                    attribute = %name,
                    "unsupported directive attribute"
                );
                results.push(ConversionResult::comment(format!(
                    "Unsupported attribute {name}=\"{value}\" on {} directive",
                    kind.label()
                )));
            }
        }
        results
    }

    fn convert_register(&self, parsed: &ParsedDirective) -> Vec<ConversionResult> {
        let (Some(prefix), Some(name)) = (parsed.attribute("TagPrefix"), parsed.attribute("TagName"))
        else {
            warn!(
                path = %self.relative_path.display(),
                directive = %parsed.raw,
                "register directive without TagPrefix and TagName"
            );
            return vec![
                ConversionResult::comment(
                    "Warning: Register directive needs both TagPrefix and TagName",
                ),
                ConversionResult::comment(parsed.original()),
            ];
        };

        let source = parsed.attribute("Src").unwrap_or_default();
        let component = if source.is_empty() {
            sanitize_identifier(name)
        } else {
            component_name(Path::new(source))
        };
        let converter = ControlConverter {
            tag: format!("{prefix}:{name}"),
            component,
            source: source.to_string(),
        };
        if let Some(previous) = self.services.registry.register(prefix, name, converter.clone()) {
            if previous != converter {
                warn!(
                    tag = %converter.tag,
                    previous = %previous.source,
                    current = %converter.source,
                    "control registration replaced"
                );
            }
        }

        match namespace_for_source(self.root_namespace, source, &self.current_dir()) {
            Ok(namespace) => vec![ConversionResult::import(namespace)],
            Err(err) => vec![
                ConversionResult::comment(format!(
                    "Could not derive a namespace for {}: {err}",
                    converter.tag
                )),
                ConversionResult::comment(parsed.original()),
            ],
        }
    }
}

fn has_namespace_directive(results: &[ConversionResult]) -> bool {
    results
        .iter()
        .any(|result| result.content.starts_with("@namespace "))
}

/// Shared attribute-to-result mapping for allow-listed attributes.
fn map_attribute(name: &str, value: &str) -> Vec<ConversionResult> {
    let value = convert_inline(value.trim());
    match name.to_ascii_lowercase().as_str() {
        "masterpagefile" => vec![ConversionResult::directive(format!(
            "@layout {}",
            component_name(Path::new(&value))
        ))],
        "title" => vec![ConversionResult::markup(format!(
            "<PageTitle>{value}</PageTitle>"
        ))],
        "metadescription" => vec![ConversionResult::markup(format!(
            "<HeadContent><meta name=\"description\" content=\"{value}\" /></HeadContent>"
        ))],
        "metakeywords" => vec![ConversionResult::markup(format!(
            "<HeadContent><meta name=\"keywords\" content=\"{value}\" /></HeadContent>"
        ))],
        "namespace" => vec![ConversionResult::import(value)],
        _ => vec![ConversionResult::comment(format!(
            "No mapping for attribute {name}=\"{value}\""
        ))],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversion::ConversionKind;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn converter<'a>(
        path: &'a Path,
        kind: ViewKind,
        services: &'a MigrationServices,
    ) -> DirectiveConverter<'a> {
        DirectiveConverter::new(path, "Shop", kind, services)
    }

    #[test]
    fn master_inherits_yields_namespace_base_and_comment() {
        let services = MigrationServices::new();
        let path = Path::new("Site.Master");
        let results =
            converter(path, ViewKind::Master, &services).convert(r#" Master Inherits="TestBaseClass" "#);

        let kinds: Vec<_> = results.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ConversionKind::Directive,
                ConversionKind::Directive,
                ConversionKind::Comment
            ]
        );
        assert_eq!(results[0].content, "@namespace Shop");
        assert_eq!(results[1].content, "@inherits LayoutComponentBase");
        assert!(results[2].content.contains("Inherits=\"TestBaseClass\""));
    }

    #[test]
    fn register_populates_registry_and_single_import() {
        let services = MigrationServices::new();
        let path = Path::new("Default.aspx");
        let results = converter(path, ViewKind::Page, &services).convert(
            r#" Register Src="~/CustomControls/Counter.ascx" TagName="Counter" TagPrefix="TCounter" "#,
        );

        assert_eq!(results, vec![ConversionResult::import("Shop.CustomControls")]);
        let registered = services.registry.lookup("TCounter:Counter").unwrap();
        assert_eq!(registered.component, "Counter");
        assert_eq!(registered.tag, "TCounter:Counter");
    }

    #[test]
    fn register_without_tag_name_is_commented_out() {
        let services = MigrationServices::new();
        let path = Path::new("Default.aspx");
        let results = converter(path, ViewKind::Page, &services)
            .convert(r#" Register TagPrefix="ajax" Namespace="Ajax.Controls" Assembly="Ajax" "#);

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.kind == ConversionKind::Comment));
        assert!(results[1].content.contains("<%@ Register TagPrefix=\"ajax\""));
        assert!(services.registry.is_empty());
    }

    #[test]
    fn register_with_unmappable_source_still_registers() {
        let services = MigrationServices::new();
        let path = Path::new("Default.aspx");
        let results = converter(path, ViewKind::Page, &services).convert(
            r#" Register Src="http://cdn/Clock.ascx" TagName="Clock" TagPrefix="uc" "#,
        );
        assert_eq!(results.len(), 2);
        assert!(results[0].content.contains("Could not derive a namespace"));
        assert!(services.registry.lookup("uc:Clock").is_some());
    }

    #[test]
    fn page_directive_maps_allowed_and_overridden_attributes() {
        let services = MigrationServices::new();
        let path = Path::new("Admin/Users.aspx");
        let results = converter(path, ViewKind::Page, &services).convert(
            r#" Page Title="Users" Language="C#" MasterPageFile="~/Site.Master" AutoEventWireup="true" CodeBehind="Users.aspx.cs" Inherits="Shop.Admin.Users" Async="true" "#,
        );
        let contents: Vec<_> = results.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(
            contents,
            vec![
                "@page \"/Admin/Users\"",
                "@namespace Shop.Admin",
                "@layout Site",
                "@* Inherits=\"Shop.Admin.Users\" is carried by the code-behind partial class *@",
                "@* Unsupported attribute Async=\"true\" on Page directive *@",
                "<PageTitle>Users</PageTitle>",
            ]
        );
    }

    #[test]
    fn unknown_directives_become_comments() {
        let services = MigrationServices::new();
        let path = Path::new("Default.aspx");
        let results = converter(path, ViewKind::Page, &services)
            .convert(r#" OutputCache Duration="60" VaryByParam="none" "#);
        assert_eq!(
            results,
            vec![ConversionResult::comment(
                "Unsupported directive: <%@ OutputCache Duration=\"60\" VaryByParam=\"none\" %>"
            )]
        );
    }

    #[test]
    fn nameless_directive_defaults_to_view_kind() {
        let services = MigrationServices::new();
        let path = Path::new("Widgets/Clock.ascx");
        let results =
            converter(path, ViewKind::Control, &services).convert(r#" Language="C#" ClassName="Clock" "#);
        assert_eq!(results[0].content, "@namespace Shop.Widgets");
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn convert_all_strips_imports_and_collapses_duplicates() {
        let services = MigrationServices::new();
        let path = Path::new("Default.aspx");
        let block = converter(path, ViewKind::Page, &services).convert_all([
            r#" Page Language="C#" "#,
            r#" Import Namespace="System.Linq" "#,
            r#" Register Src="~/Controls/A.ascx" TagName="A" TagPrefix="uc" "#,
            r#" Register Src="~/Controls/B.ascx" TagName="B" TagPrefix="uc" "#,
        ]);
        assert_eq!(block, "@page \"/\"\n@namespace Shop");
        assert_eq!(
            services.imports.snapshot(),
            vec!["Shop.Controls".to_string(), "System.Linq".to_string()]
        );
    }

    #[test]
    fn view_without_directive_still_gets_general_results() {
        let services = MigrationServices::new();
        let path = Path::new("About.aspx");
        let block = converter(path, ViewKind::Page, &services).convert_all(Vec::<String>::new());
        assert_eq!(block, "@page \"/About\"\n@namespace Shop");
    }

    proptest! {
        #[test]
        fn results_are_sorted_and_unique(
            attrs in proptest::collection::vec(
                prop_oneof![
                    Just("Title=\"T\""),
                    Just("Inherits=\"X\""),
                    Just("Foo=\"1\""),
                    Just("MasterPageFile=\"~/Site.Master\""),
                    Just("Language=\"C#\""),
                    Just("MetaKeywords=\"a,b\""),
                ],
                0..8,
            ),
        ) {
            let services = MigrationServices::new();
            let path = Path::new("Default.aspx");
            let body = format!(" Page {}", attrs.join(" "));
            let results = converter(path, ViewKind::Page, &services).convert(&body);
            for pair in results.windows(2) {
                prop_assert!(pair[0].kind <= pair[1].kind);
            }
            for (idx, result) in results.iter().enumerate() {
                prop_assert!(!results[idx + 1..].contains(result));
            }
        }
    }
}
