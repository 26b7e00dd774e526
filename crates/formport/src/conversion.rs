use serde::{Deserialize, Serialize};

/// Kind of a single conversion result. The derived ordering is the order in which
/// results are emitted: imports first, markup last.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConversionKind {
    Import,
    Directive,
    Comment,
    MarkupNode,
}

/// One line of output produced by a directive or attribute conversion.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ConversionResult {
    pub kind: ConversionKind,
    pub content: String,
}

impl ConversionResult {
    pub fn import(namespace: impl AsRef<str>) -> Self {
        Self {
            kind: ConversionKind::Import,
            content: format!("@using {}", namespace.as_ref()),
        }
    }

    pub fn directive(content: impl Into<String>) -> Self {
        Self {
            kind: ConversionKind::Directive,
            content: content.into(),
        }
    }

    /// Wraps `text` in a razor comment.
    pub fn comment(text: impl AsRef<str>) -> Self {
        Self {
            kind: ConversionKind::Comment,
            content: razor_comment(text.as_ref()),
        }
    }

    pub fn markup(content: impl Into<String>) -> Self {
        Self {
            kind: ConversionKind::MarkupNode,
            content: content.into(),
        }
    }

    pub fn is_import(&self) -> bool {
        self.kind == ConversionKind::Import
    }

    /// Namespace carried by an import result.
    pub fn imported_namespace(&self) -> Option<&str> {
        if !self.is_import() {
            return None;
        }
        self.content.strip_prefix("@using ").map(str::trim)
    }
}

/// Formats `text` as a razor comment, breaking any embedded terminator.
pub fn razor_comment(text: &str) -> String {
    format!("@* {} *@", text.replace("*@", "* @"))
}

/// Sorts results by kind and drops duplicates. Relative order within a kind is kept
/// and the first occurrence of a duplicate wins.
pub fn normalize_results(results: Vec<ConversionResult>) -> Vec<ConversionResult> {
    let mut unique: Vec<ConversionResult> = Vec::with_capacity(results.len());
    for result in results {
        if !unique.contains(&result) {
            unique.push(result);
        }
    }
    unique.sort_by_key(|result| result.kind);
    unique
}

/// Splits normalized results into (imports, in-place lines).
pub fn partition_imports(
    results: Vec<ConversionResult>,
) -> (Vec<ConversionResult>, Vec<ConversionResult>) {
    results.into_iter().partition(ConversionResult::is_import)
}

/// Joins in-place results into a directive block, one result per line.
pub fn join_results(results: &[ConversionResult]) -> String {
    results
        .iter()
        .map(|result| result.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}
