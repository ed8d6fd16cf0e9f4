//! Finding class names in a compiled-classes directory.

use anyhow::{Context, Result};
use std::path::Path;

/// List the fully-qualified names of top-level classes under `dir`.
///
/// Nested classes (`Outer$Inner.class`) are skipped. `include` and `exclude`
/// are glob patterns matched against the dotted name; an empty `include`
/// keeps everything. `*` does not stop at package separators, so
/// `org.example.*` also covers sub-packages.
pub fn discover_classes(dir: &Path, include: &[String], exclude: &[String]) -> Result<Vec<String>> {
    let mut classes = Vec::new();

    if !dir.is_dir() {
        return Ok(classes);
    }

    for entry in walkdir::WalkDir::new(dir).follow_links(false) {
        let entry =
            entry.with_context(|| format!("Failed to walk classes directory {}", dir.display()))?;
        let path = entry.path();

        if !entry.file_type().is_file() || !path.extension().is_some_and(|ext| ext == "class") {
            continue;
        }

        let Some(class_name) = class_name(dir, path) else {
            continue;
        };

        let included = include.is_empty()
            || include
                .iter()
                .any(|pattern| glob_match::glob_match(pattern, &class_name));
        let excluded = exclude
            .iter()
            .any(|pattern| glob_match::glob_match(pattern, &class_name));

        if included && !excluded {
            classes.push(class_name);
        }
    }

    classes.sort();
    Ok(classes)
}

fn class_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?.with_extension("");
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    let simple_name = parts.last()?;
    if simple_name.is_empty() || simple_name.contains('$') {
        return None;
    }
    Some(parts.join("."))
}
