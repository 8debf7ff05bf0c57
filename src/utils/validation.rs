/// Paths presented to the engine are relative and joined to the local base
/// path; anything absolute, empty or traversing is refused.
pub fn is_clean_path(path: &str) -> bool {
    !path.is_empty()
        && !path.starts_with('/')
        && path
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}
