//! Loading instrumented source files.
//!
//! The [`InstrumentLoader`] is the [`ExternalLoader`] behind the instrument cache. It resolves a
//! request path below the configured root directory, reads the file and hands its contents to
//! an [`Instrumenter`], which performs the actual code transformation.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;

use crate::caching::{ExternalLoader, LoadError, LoadResult, normalize_key};

mod command;

pub use command::CommandInstrumenter;

/// Transforms a source file into its instrumented form.
pub trait Instrumenter: Send + Sync + 'static {
    /// Instruments `source`, which is known to the client as `script_name`.
    fn instrument<'a>(
        &'a self,
        source: String,
        script_name: &'a str,
    ) -> BoxFuture<'a, LoadResult<String>>;

    /// A name for this instrumenter, used in logs.
    fn name(&self) -> &'static str;
}

/// An [`Instrumenter`] that serves sources unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl Instrumenter for Passthrough {
    fn instrument<'a>(
        &'a self,
        source: String,
        _script_name: &'a str,
    ) -> BoxFuture<'a, LoadResult<String>> {
        Box::pin(async move { Ok(source) })
    }

    fn name(&self) -> &'static str {
        "passthrough"
    }
}

/// Loads files below a root directory and instruments them.
///
/// Keys are request paths like `/lib/app.js`, which are resolved relative to the root.
#[derive(Clone)]
pub struct InstrumentLoader {
    root_dir: PathBuf,
    instrumenter: Arc<dyn Instrumenter>,
}

impl InstrumentLoader {
    pub fn new(root_dir: impl Into<PathBuf>, instrumenter: Arc<dyn Instrumenter>) -> Self {
        Self {
            root_dir: root_dir.into(),
            instrumenter,
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn instrumenter_name(&self) -> &'static str {
        self.instrumenter.name()
    }

    /// Resolves `key` to a path below the root directory.
    ///
    /// Keys that would escape the root, via `..` or otherwise, resolve to
    /// [`LoadError::NotFound`].
    pub fn map_to_fs(&self, key: &str) -> LoadResult<PathBuf> {
        let Some(normalized) = normalize_key(key) else {
            tracing::debug!(key, "Rejecting key outside of the root directory");
            return Err(LoadError::NotFound);
        };
        Ok(self.root_dir.join(normalized.trim_start_matches('/')))
    }

    async fn load_instrumented(&self, key: &str) -> LoadResult<Arc<str>> {
        let path = self.map_to_fs(key)?;
        let start = Instant::now();

        let bytes = tokio::fs::read(&path).await?;
        let source = String::from_utf8(bytes)
            .map_err(|_| LoadError::Malformed("source is not valid UTF-8".into()))?;

        let instrumented = self.instrumenter.instrument(source, key).await?;

        tracing::debug!(
            key,
            instrumenter = self.instrumenter.name(),
            "Instrumented {} in {:?}",
            path.display(),
            start.elapsed()
        );
        Ok(instrumented.into())
    }
}

impl fmt::Debug for InstrumentLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentLoader")
            .field("root_dir", &self.root_dir)
            .field("instrumenter", &self.instrumenter.name())
            .finish()
    }
}

impl ExternalLoader for InstrumentLoader {
    type Value = Arc<str>;

    fn load<'a>(&'a self, key: &'a str) -> BoxFuture<'a, LoadResult<Self::Value>> {
        Box::pin(self.load_instrumented(key))
    }

    fn name(&self) -> &'static str {
        "instrument"
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    struct Uppercase;

    impl Instrumenter for Uppercase {
        fn instrument<'a>(
            &'a self,
            source: String,
            script_name: &'a str,
        ) -> BoxFuture<'a, LoadResult<String>> {
            Box::pin(async move { Ok(format!("// {script_name}\n{}", source.to_uppercase())) })
        }

        fn name(&self) -> &'static str {
            "uppercase"
        }
    }

    fn loader(root: &Path) -> InstrumentLoader {
        InstrumentLoader::new(root, Arc::new(Uppercase))
    }

    #[test]
    fn test_map_to_fs() {
        let loader = loader(Path::new("/srv/public"));

        assert_eq!(
            loader.map_to_fs("/lib/a.js").unwrap(),
            Path::new("/srv/public/lib/a.js")
        );
        assert_eq!(
            loader.map_to_fs("lib/./a.js").unwrap(),
            Path::new("/srv/public/lib/a.js")
        );
    }

    #[test]
    fn test_map_to_fs_rejects_escapes() {
        let loader = loader(Path::new("/srv/public"));

        assert_eq!(loader.map_to_fs("/../secret.js"), Err(LoadError::NotFound));
        assert_eq!(loader.map_to_fs("/lib/../../a.js"), Err(LoadError::NotFound));
        assert_eq!(loader.map_to_fs("/lib/../a.js"), Err(LoadError::NotFound));
        assert_eq!(loader.map_to_fs("/"), Err(LoadError::NotFound));
    }

    #[tokio::test]
    async fn test_load_instruments_source() {
        instrumentor_test::setup();
        let dir = instrumentor_test::tempdir();
        fs::create_dir(dir.path().join("lib")).unwrap();
        fs::write(dir.path().join("lib/a.js"), "var a = 1;").unwrap();

        let loaded = loader(dir.path()).load("/lib/a.js").await.unwrap();
        insta::assert_snapshot!(loaded, @r###"
        // /lib/a.js
        VAR A = 1;
        "###);
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        instrumentor_test::setup();
        let dir = instrumentor_test::tempdir();

        let result = loader(dir.path()).load("/missing.js").await;
        assert_eq!(result, Err(LoadError::NotFound));
    }

    #[tokio::test]
    async fn test_load_invalid_utf8() {
        instrumentor_test::setup();
        let dir = instrumentor_test::tempdir();
        fs::write(dir.path().join("binary.js"), [0xff, 0xfe, 0x00]).unwrap();

        let result = loader(dir.path()).load("/binary.js").await;
        assert!(matches!(result, Err(LoadError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_passthrough() {
        let result = Passthrough.instrument("var a;".into(), "/a.js").await;
        assert_eq!(result.unwrap(), "var a;");
    }
}
