use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

use parking_lot::RwLock;
use tracing::{debug, warn};
use tree_sitter::{Node, Parser, Tree};

use super::{
    CodeUnit, Member, MemberKind, MethodDecl, Parameter, SourceAnalysis, SourceText, TypeDecl,
    TypeKind, UsingDirective, looks_like_interface, simple_name,
};
use crate::error::MigrationError;

/// Base classes and interfaces of the legacy framework types the
/// classifier cares about.
struct FrameworkType {
    name: &'static str,
    bases: &'static [&'static str],
    capabilities: &'static [&'static str],
}

const FRAMEWORK_TYPES: &[FrameworkType] = &[
    FrameworkType {
        name: "Page",
        bases: &["TemplateControl", "Control"],
        capabilities: &["IHttpHandler"],
    },
    FrameworkType {
        name: "UserControl",
        bases: &["TemplateControl", "Control"],
        capabilities: &[],
    },
    FrameworkType {
        name: "MasterPage",
        bases: &["UserControl", "TemplateControl", "Control"],
        capabilities: &[],
    },
    FrameworkType {
        name: "TemplateControl",
        bases: &["Control"],
        capabilities: &[],
    },
    FrameworkType {
        name: "Control",
        bases: &[],
        capabilities: &[],
    },
    FrameworkType {
        name: "HttpApplication",
        bases: &[],
        capabilities: &["IHttpAsyncHandler", "IHttpHandler"],
    },
];

fn framework_type(name: &str) -> Option<&'static FrameworkType> {
    FRAMEWORK_TYPES.iter().find(|known| known.name == name)
}

#[derive(Clone, Debug)]
struct IndexedType {
    kind: TypeKind,
    base_list: Vec<String>,
}

/// Tree-sitter backed analysis of C# sources. Base-type resolution sees every
/// type indexed by [`SourceAnalysis::prepare`] plus the legacy framework
/// types.
#[derive(Default)]
pub struct CSharpAnalysis {
    index: RwLock<HashMap<String, IndexedType>>,
}

impl CSharpAnalysis {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn indexed_types(&self) -> usize {
        self.index.read().len()
    }

    fn parse_tree(path: &Path, text: &str) -> Result<Tree, MigrationError> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_c_sharp::language())
            .map_err(|err| MigrationError::Analysis(format!("failed to load grammar: {err}")))?;
        parser.parse(text, None).ok_or_else(|| {
            MigrationError::Analysis(format!("parser gave up on {}", path.display()))
        })
    }

    /// Only the first base-list entry can name a base class.
    fn base_class_of(
        base_list: &[String],
        index: &HashMap<String, IndexedType>,
    ) -> Option<String> {
        let first = simple_name(base_list.first()?);
        match index.get(first) {
            Some(indexed) if indexed.kind == TypeKind::Interface => None,
            Some(_) => Some(first.to_string()),
            None if framework_type(first).is_some() => Some(first.to_string()),
            None if looks_like_interface(first) => None,
            None => Some(first.to_string()),
        }
    }

    fn collect_capabilities(
        base_list: &[String],
        index: &HashMap<String, IndexedType>,
        capabilities: &mut BTreeSet<String>,
        visited: &mut HashSet<String>,
    ) {
        for raw in base_list {
            let name = simple_name(raw);
            if !visited.insert(name.to_string()) {
                continue;
            }
            match index.get(name) {
                Some(indexed) => {
                    if indexed.kind == TypeKind::Interface {
                        capabilities.insert(name.to_string());
                    }
                    Self::collect_capabilities(&indexed.base_list, index, capabilities, visited);
                }
                None => {
                    if let Some(known) = framework_type(name) {
                        capabilities.extend(known.capabilities.iter().map(|cap| cap.to_string()));
                        for base in known.bases {
                            if let Some(inherited) = framework_type(base) {
                                capabilities.extend(
                                    inherited.capabilities.iter().map(|cap| cap.to_string()),
                                );
                            }
                        }
                    } else if looks_like_interface(name) {
                        capabilities.insert(name.to_string());
                    }
                }
            }
        }
    }
}

impl SourceAnalysis for CSharpAnalysis {
    fn prepare(&self, sources: &[SourceText]) -> Result<(), MigrationError> {
        let mut indexed = HashMap::new();
        for source in sources {
            let unit = match self.parse(&source.path, &source.text) {
                Ok(unit) => unit,
                Err(err) => {
                    warn!(path = %source.path.display(), error = %err, "skipping unparsable source");
                    continue;
                }
            };
            for decl in unit.types {
                indexed.insert(
                    decl.name.clone(),
                    IndexedType {
                        kind: decl.kind,
                        base_list: decl.base_list,
                    },
                );
            }
        }
        debug!(types = indexed.len(), "indexed project types");
        *self.index.write() = indexed;
        Ok(())
    }

    fn parse(&self, path: &Path, text: &str) -> Result<CodeUnit, MigrationError> {
        let tree = Self::parse_tree(path, text)?;
        let root = tree.root_node();
        let mut unit = CodeUnit {
            has_errors: root.has_error(),
            ..CodeUnit::default()
        };
        if unit.has_errors {
            warn!(path = %path.display(), "source has syntax errors, continuing with recovered tree");
        }
        visit_scope(root, text, None, &mut unit);
        Ok(unit)
    }

    fn base_type_chain(&self, decl: &TypeDecl) -> Vec<String> {
        let index = self.index.read();
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        visited.insert(decl.name.clone());

        let mut next = Self::base_class_of(&decl.base_list, &index);
        while let Some(name) = next {
            if !visited.insert(name.clone()) {
                break;
            }
            chain.push(name.clone());
            if let Some(indexed) = index.get(&name) {
                next = Self::base_class_of(&indexed.base_list, &index);
            } else {
                if let Some(known) = framework_type(&name) {
                    chain.extend(known.bases.iter().map(|base| base.to_string()));
                }
                next = None;
            }
        }
        chain
    }

    fn capabilities(&self, decl: &TypeDecl) -> BTreeSet<String> {
        let index = self.index.read();
        let mut capabilities = BTreeSet::new();
        let mut visited = HashSet::new();
        visited.insert(decl.name.clone());
        Self::collect_capabilities(&decl.base_list, &index, &mut capabilities, &mut visited);
        capabilities
    }
}

fn children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

fn text_of<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    source.get(node.start_byte()..node.end_byte()).unwrap_or("")
}

fn child_of_kind<'t>(node: Node<'t>, kinds: &[&str]) -> Option<Node<'t>> {
    children(node)
        .into_iter()
        .find(|child| kinds.contains(&child.kind()))
}

fn field_or_kind<'t>(node: Node<'t>, field: &str, kinds: &[&str]) -> Option<Node<'t>> {
    node.child_by_field_name(field)
        .or_else(|| child_of_kind(node, kinds))
}

/// Node text with continuation lines shifted left by up to `column` bytes of
/// leading whitespace.
fn dedented(node: Node<'_>, source: &str, column: usize) -> String {
    let text = text_of(node, source);
    let mut lines = text.lines();
    let mut out = lines.next().unwrap_or("").trim_end().to_string();
    for line in lines {
        out.push('\n');
        let strip = line
            .char_indices()
            .take_while(|&(idx, c)| idx < column && c.is_whitespace())
            .last()
            .map_or(0, |(idx, c)| idx + c.len_utf8());
        out.push_str(line[strip..].trim_end());
    }
    out
}

fn join_namespace(outer: Option<&str>, inner: &str) -> String {
    match outer {
        Some(outer) if !outer.is_empty() => format!("{outer}.{inner}"),
        _ => inner.to_string(),
    }
}

fn visit_scope(node: Node<'_>, source: &str, namespace: Option<String>, unit: &mut CodeUnit) {
    let mut current = namespace.clone();
    for child in children(node) {
        match child.kind() {
            "using_directive" => unit.usings.push(parse_using(text_of(child, source))),
            "namespace_declaration" => {
                let Some(name) = field_or_kind(child, "name", &["qualified_name", "identifier"])
                else {
                    continue;
                };
                let full = join_namespace(namespace.as_deref(), text_of(name, source));
                if let Some(body) = field_or_kind(child, "body", &["declaration_list"]) {
                    visit_scope(body, source, Some(full), unit);
                }
            }
            "file_scoped_namespace_declaration" => {
                if let Some(name) = field_or_kind(child, "name", &["qualified_name", "identifier"]) {
                    current = Some(join_namespace(namespace.as_deref(), text_of(name, source)));
                }
                visit_scope(child, source, current.clone(), unit);
            }
            "class_declaration" | "interface_declaration" | "struct_declaration"
            | "record_declaration" | "record_struct_declaration" | "enum_declaration" => {
                if let Some(decl) = type_decl(child, source, current.clone()) {
                    unit.types.push(decl);
                }
            }
            _ => {}
        }
    }
}

fn parse_using(text: &str) -> UsingDirective {
    let body = text
        .trim()
        .trim_end_matches(';')
        .trim_start_matches("global ")
        .trim_start()
        .trim_start_matches("using")
        .trim();
    let body = body.strip_prefix("static ").unwrap_or(body).trim();
    let namespace = match body.split_once('=') {
        Some((_, target)) => target.trim(),
        None => body,
    };
    UsingDirective {
        text: text.trim().to_string(),
        namespace: namespace.to_string(),
    }
}

fn type_kind(kind: &str) -> Option<TypeKind> {
    match kind {
        "class_declaration" => Some(TypeKind::Class),
        "interface_declaration" => Some(TypeKind::Interface),
        "struct_declaration" | "record_struct_declaration" => Some(TypeKind::Struct),
        "record_declaration" => Some(TypeKind::Record),
        "enum_declaration" => Some(TypeKind::Enum),
        _ => None,
    }
}

fn modifiers(node: Node<'_>, source: &str) -> Vec<String> {
    children(node)
        .into_iter()
        .filter(|child| child.kind() == "modifier")
        .map(|child| text_of(child, source).trim().to_string())
        .collect()
}

fn type_decl(node: Node<'_>, source: &str, namespace: Option<String>) -> Option<TypeDecl> {
    let kind = type_kind(node.kind())?;
    let name = field_or_kind(node, "name", &["identifier"])?;
    let column = node.start_position().column;

    let attributes = children(node)
        .into_iter()
        .filter(|child| child.kind() == "attribute_list")
        .map(|child| text_of(child, source).to_string())
        .collect();
    let base_list = child_of_kind(node, &["base_list"])
        .map(|bases| {
            named_children(bases)
                .into_iter()
                .filter(|base| base.kind() != "argument_list")
                .map(|base| text_of(base, source).trim().to_string())
                .filter(|base| !base.is_empty())
                .collect()
        })
        .unwrap_or_default();
    let members = field_or_kind(
        node,
        "body",
        &["declaration_list", "enum_member_declaration_list"],
    )
    .map(|body| {
        named_children(body)
            .into_iter()
            .map(|member| member_of(member, source))
            .collect()
    })
    .unwrap_or_default();

    Some(TypeDecl {
        name: text_of(name, source).to_string(),
        namespace,
        kind,
        modifiers: modifiers(node, source),
        attributes,
        base_list,
        members,
        text: dedented(node, source, column),
    })
}

fn member_of(node: Node<'_>, source: &str) -> Member {
    let column = node.start_position().column;
    let kind = match node.kind() {
        "method_declaration" => method_decl(node, source, column)
            .map(MemberKind::Method)
            .unwrap_or(MemberKind::Other),
        "constructor_declaration" => MemberKind::Constructor,
        _ => MemberKind::Other,
    };
    Member {
        kind,
        text: dedented(node, source, column),
    }
}

fn method_decl(node: Node<'_>, source: &str, column: usize) -> Option<MethodDecl> {
    let name = field_or_kind(node, "name", &["identifier"])?;
    let return_type = node
        .child_by_field_name("returns")
        .or_else(|| node.child_by_field_name("type"))
        .map(|ty| text_of(ty, source).trim().to_string())
        .unwrap_or_else(|| "void".to_string());
    let parameters = field_or_kind(node, "parameters", &["parameter_list"])
        .map(|list| {
            named_children(list)
                .into_iter()
                .filter(|param| param.kind() == "parameter")
                .filter_map(|param| {
                    let name = field_or_kind(param, "name", &["identifier"])?;
                    let type_name = param
                        .child_by_field_name("type")
                        .map(|ty| text_of(ty, source).trim().to_string())
                        .unwrap_or_default();
                    Some(Parameter {
                        type_name,
                        name: text_of(name, source).to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    let body = field_or_kind(node, "body", &["block"])
        .filter(|body| body.kind() == "block")
        .map(|body| dedented(body, source, column));

    Some(MethodDecl {
        name: text_of(name, source).to_string(),
        modifiers: modifiers(node, source),
        return_type,
        parameters,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    const HOME: &str = r#"using System;
using System.Web.UI;

namespace Shop.Admin
{
    public partial class Home : BasePage, IAuditable
    {
        private int count;

        protected void Page_Load(object sender, EventArgs e)
        {
            count++;
            if (count > 1)
            {
                Audit();
            }
        }

        public void Audit() { }
    }
}
"#;

    const BASE: &str = r#"namespace Shop
{
    public class BasePage : System.Web.UI.Page
    {
    }

    public interface IAuditable : IDisposable
    {
    }
}
"#;

    fn source(path: &str, text: &str) -> SourceText {
        SourceText {
            path: PathBuf::from(path),
            text: text.to_string(),
        }
    }

    #[test]
    fn parses_usings_namespaces_and_members() {
        let analysis = CSharpAnalysis::new();
        let unit = analysis.parse(Path::new("Admin/Home.aspx.cs"), HOME).unwrap();

        let usings: Vec<_> = unit.usings.iter().map(|u| u.namespace.as_str()).collect();
        assert_eq!(usings, vec!["System", "System.Web.UI"]);
        assert_eq!(unit.types.len(), 1);

        let home = &unit.types[0];
        assert_eq!(home.name, "Home");
        assert_eq!(home.namespace.as_deref(), Some("Shop.Admin"));
        assert_eq!(home.kind, TypeKind::Class);
        assert_eq!(home.modifiers, vec!["public", "partial"]);
        assert_eq!(home.base_list, vec!["BasePage", "IAuditable"]);
        assert_eq!(home.members.len(), 3);
        assert_eq!(home.members[0].text, "private int count;");

        let load = home.methods().next().unwrap();
        assert_eq!(load.name, "Page_Load");
        assert_eq!(load.return_type, "void");
        assert!(load.is_event_handler());
        assert_eq!(
            load.body_lines(),
            vec!["count++;", "if (count > 1)", "{", "    Audit();", "}"]
        );
    }

    #[test]
    fn chains_resolve_through_project_and_framework_types() {
        let analysis = CSharpAnalysis::new();
        analysis
            .prepare(&[source("BasePage.cs", BASE), source("Admin/Home.aspx.cs", HOME)])
            .unwrap();
        assert_eq!(analysis.indexed_types(), 3);

        let unit = analysis.parse(Path::new("Admin/Home.aspx.cs"), HOME).unwrap();
        let home = &unit.types[0];
        assert_eq!(
            analysis.base_type_chain(home),
            vec!["BasePage", "Page", "TemplateControl", "Control"]
        );
        let capabilities: Vec<_> = analysis.capabilities(home).into_iter().collect();
        assert_eq!(capabilities, vec!["IAuditable", "IDisposable", "IHttpHandler"]);
    }

    #[test]
    fn interface_only_base_list_has_empty_chain() {
        let analysis = CSharpAnalysis::new();
        let unit = analysis
            .parse(
                Path::new("Handlers/Ping.ashx.cs"),
                "public class Ping : IHttpHandler { public bool IsReusable => true; }",
            )
            .unwrap();
        let ping = &unit.types[0];
        assert!(ping.namespace.is_none());
        assert!(analysis.base_type_chain(ping).is_empty());
        assert!(analysis.capabilities(ping).contains("IHttpHandler"));
    }

    #[test]
    fn multibyte_indentation_is_dedented_on_char_boundaries() {
        let analysis = CSharpAnalysis::new();
        let unit = analysis
            .parse(
                Path::new("C.cs"),
                "namespace A\n{\n    public class C\n    {\n\u{a0}\u{a0}\u{a0}int x;\n    }\n}\n",
            )
            .unwrap();
        assert_eq!(unit.types[0].name, "C");
        assert!(unit.types[0].text.contains("int x;"));
    }

    #[test]
    fn file_scoped_namespaces_apply_to_following_types() {
        let analysis = CSharpAnalysis::new();
        let unit = analysis
            .parse(
                Path::new("Global.asax.cs"),
                "namespace Shop;\n\npublic class Global : System.Web.HttpApplication\n{\n}\n",
            )
            .unwrap();
        assert_eq!(unit.types[0].namespace.as_deref(), Some("Shop"));
        assert_eq!(
            analysis.base_type_chain(&unit.types[0]),
            vec!["HttpApplication"]
        );
    }

    #[test]
    fn using_aliases_and_static_imports() {
        assert_eq!(parse_using("using static System.Math;").namespace, "System.Math");
        assert_eq!(parse_using("using Ui = System.Web.UI;").namespace, "System.Web.UI");
        assert_eq!(parse_using("global using System.Linq;").namespace, "System.Linq");
    }
}
