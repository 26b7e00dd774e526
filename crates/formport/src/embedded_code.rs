use std::sync::OnceLock;

use regex::Regex;

use crate::conversion::razor_comment;
use crate::markup::CodeBlockKind;

fn binding_regex() -> &'static Regex {
    static BINDING: OnceLock<Regex> = OnceLock::new();
    BINDING.get_or_init(|| {
        Regex::new(r#"\b(?:Eval|Bind)\(\s*"([A-Za-z_][A-Za-z0-9_.]*)"\s*(?:,\s*"[^"]*"\s*)?\)"#)
            .expect("binding regex is valid")
    })
}

fn inline_block_regex() -> &'static Regex {
    static INLINE: OnceLock<Regex> = OnceLock::new();
    INLINE.get_or_init(|| {
        Regex::new(r"(?s)<%(--.*?--|[=:#$]?.*?)%>").expect("inline block regex is valid")
    })
}

/// Converts a single server code block into its razor equivalent.
pub fn convert_code_block(kind: CodeBlockKind, code: &str) -> String {
    let code = code.trim();
    match kind {
        CodeBlockKind::Expression | CodeBlockKind::EncodedExpression => format!("@({code})"),
        CodeBlockKind::DataBinding => format!("@({})", rewrite_bindings(code)),
        CodeBlockKind::ExpressionBuilder => {
            razor_comment(&format!("Expression builder <%$ {code} %> is not supported"))
        }
        CodeBlockKind::Statement => format!("@{{ {code} }}"),
    }
}

pub fn convert_server_comment(text: &str) -> String {
    razor_comment(text.trim())
}

/// Rewrites `Eval("X")`/`Bind("X")` to the templated `context.X` form.
pub fn rewrite_bindings(code: &str) -> String {
    binding_regex()
        .replace_all(code, "context.$1")
        .into_owned()
}

/// Converts server blocks embedded in an attribute value and maps the
/// application-root prefix `~/` to `/`.
pub fn convert_inline(value: &str) -> String {
    let converted = inline_block_regex().replace_all(value, |caps: &regex::Captures<'_>| {
        let body = &caps[1];
        if let Some(comment) = body.strip_prefix("--") {
            return convert_server_comment(comment.trim_end_matches("--"));
        }
        let (kind, code) = match body.chars().next() {
            Some('=') => (CodeBlockKind::Expression, &body[1..]),
            Some(':') => (CodeBlockKind::EncodedExpression, &body[1..]),
            Some('#') => (CodeBlockKind::DataBinding, &body[1..]),
            Some('$') => (CodeBlockKind::ExpressionBuilder, &body[1..]),
            _ => (CodeBlockKind::Statement, body),
        };
        convert_code_block(kind, code)
    });
    match converted.strip_prefix("~/") {
        Some(stripped) => format!("/{stripped}"),
        None => converted.into_owned(),
    }
}
