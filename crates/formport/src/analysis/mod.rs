//! Source analysis collaborator: syntax model, base-type chains and
//! capability queries for code files.

mod csharp;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::MigrationError;

pub use csharp::CSharpAnalysis;

/// Raw text of one code file, handed to [`SourceAnalysis::prepare`].
#[derive(Clone, Debug)]
pub struct SourceText {
    pub path: PathBuf,
    pub text: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CodeUnit {
    pub usings: Vec<UsingDirective>,
    pub types: Vec<TypeDecl>,
    /// Set when the parser had to recover from syntax errors.
    pub has_errors: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UsingDirective {
    /// Directive as written, including the trailing semicolon.
    pub text: String,
    pub namespace: String,
}

impl UsingDirective {
    pub fn new(namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        Self {
            text: format!("using {namespace};"),
            namespace,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    Class,
    Interface,
    Struct,
    Record,
    Enum,
}

/// A namespace-level type declaration. Member and type text is dedented to
/// column zero.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeDecl {
    pub name: String,
    pub namespace: Option<String>,
    pub kind: TypeKind,
    pub modifiers: Vec<String>,
    pub attributes: Vec<String>,
    pub base_list: Vec<String>,
    pub members: Vec<Member>,
    pub text: String,
}

impl TypeDecl {
    pub fn qualified_name(&self) -> String {
        match &self.namespace {
            Some(namespace) => format!("{namespace}.{}", self.name),
            None => self.name.clone(),
        }
    }

    pub fn methods(&self) -> impl Iterator<Item = &MethodDecl> {
        self.members.iter().filter_map(|member| match &member.kind {
            MemberKind::Method(method) => Some(method),
            _ => None,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Member {
    pub kind: MemberKind,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemberKind {
    Method(MethodDecl),
    Constructor,
    Other,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodDecl {
    pub name: String,
    pub modifiers: Vec<String>,
    pub return_type: String,
    pub parameters: Vec<Parameter>,
    /// Block body including its braces, or `None` for abstract and
    /// expression-bodied methods.
    pub body: Option<String>,
}

impl MethodDecl {
    /// Matches the `(object sender, XxxEventArgs e)` handler convention.
    pub fn is_event_handler(&self) -> bool {
        let [sender, args] = self.parameters.as_slice() else {
            return false;
        };
        let sender_like =
            sender.name == "sender" || simple_name(&sender.type_name).eq_ignore_ascii_case("object");
        sender_like && simple_name(&args.type_name).ends_with("EventArgs")
    }

    /// Statements of the block body, dedented, without the braces.
    pub fn body_lines(&self) -> Vec<String> {
        self.body.as_deref().map(block_lines).unwrap_or_default()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Parameter {
    pub type_name: String,
    pub name: String,
}

/// Semantic queries supplied to the class converter.
pub trait SourceAnalysis: Send + Sync {
    /// Sees every code file of the project before any file is parsed for
    /// conversion.
    fn prepare(&self, _sources: &[SourceText]) -> Result<(), MigrationError> {
        Ok(())
    }

    fn parse(&self, path: &Path, text: &str) -> Result<CodeUnit, MigrationError>;

    /// Simple names of every base class, nearest first.
    fn base_type_chain(&self, decl: &TypeDecl) -> Vec<String>;

    /// Simple names of every implemented interface, inherited ones included.
    fn capabilities(&self, decl: &TypeDecl) -> BTreeSet<String>;
}

/// `System.Web.UI.Page` → `Page`, `List<int>` → `List`.
pub fn simple_name(type_name: &str) -> &str {
    let without_generics = type_name
        .split_once('<')
        .map_or(type_name, |(head, _)| head)
        .trim();
    let without_global = without_generics
        .strip_prefix("global::")
        .unwrap_or(without_generics);
    without_global
        .rsplit('.')
        .next()
        .unwrap_or(without_global)
        .trim()
}

/// Interface naming convention: `I` followed by an upper-case letter.
pub fn looks_like_interface(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next() == Some('I') && chars.next().is_some_and(|c| c.is_ascii_uppercase())
}

/// Inner lines of a `{ ... }` block, dedented by their common indentation.
/// Blank lines at either end are dropped.
pub fn block_lines(block: &str) -> Vec<String> {
    let trimmed = block.trim();
    let inner = trimmed
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
        .unwrap_or(trimmed);
    let mut lines: Vec<&str> = inner.lines().collect();
    while lines.first().is_some_and(|line| line.trim().is_empty()) {
        lines.remove(0);
    }
    while lines.last().is_some_and(|line| line.trim().is_empty()) {
        lines.pop();
    }
    dedent_lines(&lines)
}

/// Removes the smallest common leading whitespace of non-blank lines.
pub fn dedent_lines(lines: &[&str]) -> Vec<String> {
    let indent = lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.chars().take_while(|c| c.is_whitespace()).count())
        .min()
        .unwrap_or(0);
    lines
        .iter()
        .map(|line| {
            if line.trim().is_empty() {
                String::new()
            } else {
                line.chars()
                    .skip(indent)
                    .collect::<String>()
                    .trim_end()
                    .to_string()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method(params: &[(&str, &str)]) -> MethodDecl {
        MethodDecl {
            name: "Page_Load".into(),
            modifiers: vec!["protected".into()],
            return_type: "void".into(),
            parameters: params
                .iter()
                .map(|(type_name, name)| Parameter {
                    type_name: (*type_name).into(),
                    name: (*name).into(),
                })
                .collect(),
            body: Some("{\n    Work();\n}".into()),
        }
    }

    #[test]
    fn handler_convention_requires_sender_and_event_args() {
        assert!(method(&[("object", "sender"), ("EventArgs", "e")]).is_event_handler());
        assert!(method(&[("System.Object", "s"), ("System.EventArgs", "e")]).is_event_handler());
        assert!(method(&[("object", "sender"), ("ImageClickEventArgs", "e")]).is_event_handler());
        assert!(!method(&[("object", "sender")]).is_event_handler());
        assert!(!method(&[("string", "name"), ("EventArgs", "e")]).is_event_handler());
        assert!(!method(&[("object", "sender"), ("int", "e")]).is_event_handler());
    }

    #[test]
    fn names_and_blocks() {
        assert_eq!(simple_name("System.Web.UI.Page"), "Page");
        assert_eq!(simple_name("global::System.IDisposable"), "IDisposable");
        assert_eq!(simple_name("List<int>"), "List");
        assert!(looks_like_interface("IHttpHandler"));
        assert!(!looks_like_interface("Index"));

        let lines = block_lines("{\n        if (x)\n        {\n            Go();\n        }\n    }");
        assert_eq!(lines, vec!["if (x)", "{", "    Go();", "}"]);
        assert!(block_lines("{ }").is_empty());
    }

    #[test]
    fn dedent_counts_multibyte_whitespace_as_one_column() {
        let lines = dedent_lines(&["\u{3000}\u{3000}a();", "\u{3000}\u{3000}\u{3000}b();", ""]);
        assert_eq!(lines, vec!["a();", "\u{3000}b();", ""]);
    }
}
