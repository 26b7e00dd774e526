//! Path, namespace and route derivation shared by the converters.

use std::path::{Component, Path, PathBuf};

use crate::error::MigrationError;

/// Maps arbitrary text onto a valid identifier segment.
pub fn sanitize_identifier(raw: &str) -> String {
    let mut out: String = raw
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.is_empty() {
        out.push('_');
    }
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Root namespace for a project directory.
pub fn root_namespace_for(project_root: &Path) -> String {
    let name = project_root
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("App");
    name.split('.')
        .map(sanitize_identifier)
        .collect::<Vec<_>>()
        .join(".")
}

/// Namespace for a project-relative directory.
pub fn namespace_for_dir(root_namespace: &str, relative_dir: &Path) -> String {
    let mut parts = vec![root_namespace.to_string()];
    for component in relative_dir.components() {
        if let Component::Normal(segment) = component {
            parts.push(sanitize_identifier(&segment.to_string_lossy()));
        }
    }
    parts.retain(|part| !part.is_empty());
    parts.join(".")
}

/// Resolves an application path from a directive (`~/a/b.ascx`, `/a/b.ascx`
/// or `../b.ascx`) to a project-relative path.
pub fn resolve_app_path(raw: &str, current_dir: &Path) -> Result<PathBuf, MigrationError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(MigrationError::Conversion("empty source path".into()));
    }
    if raw.contains("://") || raw.contains('<') {
        return Err(MigrationError::Conversion(format!(
            "{raw} is not a project path"
        )));
    }

    let normalized = raw.replace('\\', "/");
    let (base, rest) = if let Some(rest) = normalized.strip_prefix("~/") {
        (PathBuf::new(), rest.to_string())
    } else if let Some(rest) = normalized.strip_prefix('/') {
        (PathBuf::new(), rest.to_string())
    } else {
        (current_dir.to_path_buf(), normalized)
    };

    let mut resolved: Vec<String> = base
        .components()
        .filter_map(|component| match component {
            Component::Normal(segment) => Some(segment.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    for segment in rest.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if resolved.pop().is_none() {
                    return Err(MigrationError::Conversion(format!(
                        "{raw} escapes the project root"
                    )));
                }
            }
            other => resolved.push(other.to_string()),
        }
    }
    if resolved.is_empty() {
        return Err(MigrationError::Conversion(format!("{raw} names no file")));
    }
    Ok(resolved.iter().collect())
}

/// Namespace of the directory holding the file named by a directive path.
pub fn namespace_for_source(
    root_namespace: &str,
    raw: &str,
    current_dir: &Path,
) -> Result<String, MigrationError> {
    let resolved = resolve_app_path(raw, current_dir)?;
    let dir = resolved.parent().unwrap_or_else(|| Path::new(""));
    Ok(namespace_for_dir(root_namespace, dir))
}

/// File name with every extension removed: `Site.Master.cs` → `Site`.
pub fn bare_stem(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.split_once('.') {
        Some((stem, _)) => stem.to_string(),
        None => name,
    }
}

/// Component name derived from a file path.
pub fn component_name(path: &Path) -> String {
    sanitize_identifier(&bare_stem(path))
}

/// Directory part of a project-relative path.
pub fn relative_dir(relative: &Path) -> PathBuf {
    relative
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default()
}

/// Route for a page: `Admin/Users.aspx` → `/Admin/Users`, with `Default`
/// mapped to its folder.
pub fn route_for(relative: &Path) -> String {
    let mut segments: Vec<String> = relative_dir(relative)
        .components()
        .filter_map(|component| match component {
            Component::Normal(segment) => Some(segment.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    let stem = bare_stem(relative);
    if !stem.eq_ignore_ascii_case("default") && !stem.eq_ignore_ascii_case("index") {
        segments.push(stem);
    }
    format!("/{}", segments.join("/"))
}

/// Lower-cased full extension chain: `Site.Master.cs` → `master.cs`.
pub fn extension_chain(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match name.split_once('.') {
        Some((_, chain)) => chain.to_string(),
        None => String::new(),
    }
}

/// Output area for a view extension.
pub fn view_area(extension: &str) -> Option<&'static str> {
    match extension.to_ascii_lowercase().as_str() {
        "aspx" => Some("Pages"),
        "ascx" => Some("Components"),
        "master" => Some("Shared"),
        _ => None,
    }
}

/// `Pages/<dir>/<Stem>.<extension>` style output path.
pub fn area_path(area: &str, relative: &Path, file_name: &str) -> PathBuf {
    let mut path = PathBuf::from(area);
    path.push(relative_dir(relative));
    path.push(file_name);
    path
}

/// Forward-slash rendering of a relative path.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(segment) => Some(segment.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
