//! C# source emission for converted types.

use super::lifecycle::MovedHandler;

const INDENT: &str = "    ";

/// Everything needed to print one type declaration as a standalone file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClassOutline {
    pub usings: Vec<String>,
    pub namespace: Option<String>,
    pub attributes: Vec<String>,
    pub modifiers: Vec<String>,
    pub keyword: String,
    pub name: String,
    pub bases: Vec<String>,
    /// Member texts, dedented to column zero.
    pub members: Vec<String>,
}

impl ClassOutline {
    pub fn render(&self) -> String {
        let mut body = String::new();
        for attribute in &self.attributes {
            body.push_str(attribute);
            body.push('\n');
        }
        let mut header: Vec<&str> = self.modifiers.iter().map(String::as_str).collect();
        header.push(&self.keyword);
        header.push(&self.name);
        body.push_str(&header.join(" "));
        if !self.bases.is_empty() {
            body.push_str(" : ");
            body.push_str(&self.bases.join(", "));
        }
        body.push_str("\n{\n");
        body.push_str(&indent(&join_members(&self.members), 1));
        body.push_str("}\n");
        wrap_in_file(&self.usings, self.namespace.as_deref(), &body)
    }
}

/// Prints usings and an optional namespace block around `body`.
pub fn wrap_in_file(usings: &[String], namespace: Option<&str>, body: &str) -> String {
    let mut out = String::new();
    for using in usings {
        out.push_str(using);
        out.push('\n');
    }
    if !usings.is_empty() {
        out.push('\n');
    }
    match namespace {
        Some(namespace) => {
            out.push_str("namespace ");
            out.push_str(namespace);
            out.push_str("\n{\n");
            out.push_str(&indent(body, 1));
            out.push_str("}\n");
        }
        None => out.push_str(body),
    }
    out
}

/// Members separated by blank lines; comments stay glued to what follows.
pub fn join_members(members: &[String]) -> String {
    let mut out = String::new();
    let mut previous_was_comment = false;
    for (idx, member) in members.iter().enumerate() {
        if idx > 0 && !previous_was_comment {
            out.push('\n');
        }
        out.push_str(member.trim_end());
        out.push('\n');
        let trimmed = member.trim_start();
        previous_was_comment = trimmed.starts_with("//") || trimmed.starts_with("/*");
    }
    out
}

/// Indents every non-blank line by `level` steps.
pub fn indent(text: &str, level: usize) -> String {
    let prefix = INDENT.repeat(level);
    let mut out = String::new();
    for line in text.lines() {
        if !line.trim().is_empty() {
            out.push_str(&prefix);
            out.push_str(line);
        }
        out.push('\n');
    }
    out
}

/// `signature` followed by a braced block of `lines`.
pub fn method(signature: &str, lines: &[String]) -> String {
    let mut out = String::from(signature);
    out.push_str("\n{\n");
    for line in lines {
        if !line.trim().is_empty() {
            out.push_str(INDENT);
            out.push_str(line);
        }
        out.push('\n');
    }
    out.push('}');
    out
}

/// A moved handler body prefixed with its origin.
pub fn handler_section(handler: &MovedHandler) -> Vec<String> {
    let mut lines = vec![format!("// {}", handler.name)];
    lines.extend(handler.lines.iter().cloned());
    lines
}

/// Concatenated sections of several handlers.
pub fn handler_sections(handlers: &[MovedHandler]) -> Vec<String> {
    handlers.iter().flat_map(handler_section).collect()
}

/// Lines nested one level deeper, for inline lambdas.
pub fn nested(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .map(|line| {
            if line.trim().is_empty() {
                String::new()
            } else {
                format!("{INDENT}{line}")
            }
        })
        .collect()
}
