use std::path::PathBuf;

/// Expands a leading `~` against `home` so key and known_hosts paths can be
/// written the way operators write them in shell profiles.
pub fn expand_home_path(raw: &str, home: Option<&str>) -> PathBuf {
    let trimmed = raw.trim();
    match (trimmed, home) {
        ("~", Some(home)) => PathBuf::from(home),
        (path, Some(home)) if path.starts_with("~/") => PathBuf::from(home).join(&path[2..]),
        (path, _) => PathBuf::from(path),
    }
}
