use std::path::{Component, Path};

/// Normalizes a relative file path or request path into its canonical cache key.
///
/// The key consists of the normal components of `path`, each prefixed with a `/`. Leading
/// slashes, repeated separators and `.` components are dropped, so `/lib//./app.js` and
/// `lib/app.js` both normalize to `/lib/app.js`.
///
/// Returns `None` for paths that contain `..` or a prefix, and for paths without any normal
/// component.
pub fn normalize_key(path: impl AsRef<Path>) -> Option<String> {
    let mut key = String::new();
    for component in path.as_ref().components() {
        match component {
            Component::Normal(segment) => {
                key.push('/');
                key.push_str(&segment.to_string_lossy());
            }
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir | Component::Prefix(_) => return None,
        }
    }
    (!key.is_empty()).then_some(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("/lib/app.js").as_deref(), Some("/lib/app.js"));
        assert_eq!(normalize_key("lib/app.js").as_deref(), Some("/lib/app.js"));
        assert_eq!(normalize_key("/lib//app.js").as_deref(), Some("/lib/app.js"));
        assert_eq!(normalize_key("/lib/./app.js").as_deref(), Some("/lib/app.js"));
        assert_eq!(normalize_key("//lib/app.js").as_deref(), Some("/lib/app.js"));
    }

    #[test]
    fn test_normalize_key_rejects() {
        assert_eq!(normalize_key("/../secret.js"), None);
        assert_eq!(normalize_key("/lib/../app.js"), None);
        assert_eq!(normalize_key("/"), None);
        assert_eq!(normalize_key(""), None);
    }
}
