/// Placeholder for path separators in a module key.
pub const SEPARATOR_PLACEHOLDER: char = '@';

/// Placeholder for extension separators in a module key.
pub const EXTENSION_PLACEHOLDER: char = '$';

/// Turn a module's logical path into a single filename component.
///
/// `a/b.cc` becomes `a@b$cc`. Distinct paths are assumed to map to distinct
/// keys within one build; collisions are not detected.
pub fn canonicalize(path: &str) -> String {
    path.chars()
        .map(|c| {
            if std::path::is_separator(c) {
                SEPARATOR_PLACEHOLDER
            } else if c == '.' {
                EXTENSION_PLACEHOLDER
            } else {
                c
            }
        })
        .collect()
}
