use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::watcher::ChangeWatcher;

use super::{CoalescingCache, ExternalLoader, LoadResult, normalize_key};

/// Maps the path of a changed file to the cache key it was loaded under.
#[derive(Clone)]
pub enum KeyScheme {
    /// The key is the changed path itself.
    Identity,
    /// The key is the changed path relative to the given root, normalized by
    /// [`normalize_key`], the way it appears in a request URL.
    ///
    /// Paths outside of the root do not map to any key.
    RelativeTo(PathBuf),
    /// A caller-supplied mapping.
    Custom(Arc<dyn Fn(&Path) -> Option<String> + Send + Sync>),
}

impl KeyScheme {
    /// Returns the cache key for `changed`, if there is one.
    pub fn key_for(&self, changed: &Path) -> Option<String> {
        match self {
            Self::Identity => Some(changed.to_string_lossy().into_owned()),
            Self::RelativeTo(root) => {
                let relative = changed.strip_prefix(root).ok()?;
                normalize_key(relative)
            }
            Self::Custom(f) => f(changed),
        }
    }
}

impl fmt::Debug for KeyScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity => f.write_str("Identity"),
            Self::RelativeTo(root) => f.debug_tuple("RelativeTo").field(root).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// A [`CoalescingCache`] that drops entries whenever their source changes on disk.
///
/// The [`ChangeWatcher`] is owned by this type, the cache is shared with whoever else holds a
/// handle to it. Dropping the `InvalidatingCache` stops the invalidation.
pub struct InvalidatingCache<L: ExternalLoader> {
    cache: CoalescingCache<L>,
    watcher: ChangeWatcher,
}

impl<L: ExternalLoader> InvalidatingCache<L> {
    /// Binds `watcher` to `cache`, invalidating the key that `scheme` maps every change to.
    pub fn new(cache: CoalescingCache<L>, watcher: ChangeWatcher, scheme: KeyScheme) -> Self {
        let handle = cache.clone();
        watcher.on_change(move |event| match scheme.key_for(&event.changed) {
            Some(key) => {
                handle.invalidate(&key);
            }
            None => {
                tracing::trace!(
                    "Ignoring change of {}, it maps to no cache key",
                    event.changed.display()
                );
            }
        });

        Self { cache, watcher }
    }

    /// See [`CoalescingCache::get`].
    pub async fn get(&self, key: &str) -> LoadResult<L::Value> {
        self.cache.get(key).await
    }

    pub fn cache(&self) -> &CoalescingCache<L> {
        &self.cache
    }

    pub fn watcher(&self) -> &ChangeWatcher {
        &self.watcher
    }
}

impl<L: ExternalLoader> fmt::Debug for InvalidatingCache<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvalidatingCache")
            .field("cache", &self.cache)
            .field("watcher", &self.watcher)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_scheme() {
        let key = KeyScheme::Identity.key_for(Path::new("changed_file"));
        assert_eq!(key.as_deref(), Some("changed_file"));
    }

    #[test]
    fn test_relative_scheme() {
        let scheme = KeyScheme::RelativeTo(PathBuf::from("/srv/public"));

        let key = scheme.key_for(Path::new("/srv/public/lib/a.js"));
        assert_eq!(key.as_deref(), Some("/lib/a.js"));

        let key = scheme.key_for(Path::new("/srv/public/lib/./a.js"));
        assert_eq!(key.as_deref(), Some("/lib/a.js"));

        assert_eq!(scheme.key_for(Path::new("/srv/other/a.js")), None);
        assert_eq!(scheme.key_for(Path::new("/srv/public")), None);
    }

    #[test]
    fn test_custom_scheme() {
        let scheme = KeyScheme::Custom(Arc::new(|path: &Path| {
            path.file_name()
                .map(|name| format!("file:{}", name.to_string_lossy()))
        }));

        let key = scheme.key_for(Path::new("/srv/public/lib/a.js"));
        assert_eq!(key.as_deref(), Some("file:a.js"));
    }
}
