//! Provides the internal instrumentor services and a way to initialize them.
//!
//! The main [`SharedServices::create`] fn builds the instrument cache according to the provided
//! [`Config`], and, unless watching is disabled, binds it to a watcher on the source directory so
//! that edited files are instrumented again on their next request.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::caching::{
    CoalescingCache, InvalidatingCache, KeyScheme, LoadError, LoadResult, normalize_key,
};
use crate::config::{Config, InstrumenterConfig};
use crate::instrument::{CommandInstrumenter, InstrumentLoader, Instrumenter, Passthrough};
use crate::watcher::{ChangeWatcher, NotifyWatch, WatchPrimitive};

/// The cache of instrumented sources, keyed by request path.
pub type InstrumentCache = CoalescingCache<InstrumentLoader>;

/// The services shared by all requests.
#[derive(Clone, Debug)]
pub struct SharedServices {
    config: Arc<Config>,
    root_dir: PathBuf,
    cache: InstrumentCache,
    invalidation: Option<Arc<InvalidatingCache<InstrumentLoader>>>,
}

impl SharedServices {
    /// Creates the services, watching the filesystem with [`NotifyWatch`].
    pub fn create(config: Config) -> Result<Self> {
        Self::create_with_watch(config, &NotifyWatch)
    }

    /// Creates the services, using `primitive` to watch for changes.
    pub fn create_with_watch(config: Config, primitive: &impl WatchPrimitive) -> Result<Self> {
        let root_dir = fs::canonicalize(&config.root_dir).with_context(|| {
            format!("failed to resolve root_dir {}", config.root_dir.display())
        })?;

        let loader = InstrumentLoader::new(&root_dir, create_instrumenter(&config.instrumenter));
        let cache = CoalescingCache::new(loader);

        let invalidation = if config.watch {
            let source_dir = fs::canonicalize(config.source_dir()).with_context(|| {
                format!(
                    "failed to resolve source_dir {}",
                    config.source_dir().display()
                )
            })?;
            let watcher = ChangeWatcher::new(source_dir, primitive)
                .context("failed to watch the source directory")?;
            let scheme = KeyScheme::RelativeTo(root_dir.clone());
            Some(Arc::new(InvalidatingCache::new(
                cache.clone(),
                watcher,
                scheme,
            )))
        } else {
            tracing::info!("Watching is disabled, sources are cached until restart");
            None
        };

        tracing::info!(
            "Serving {} with the {} instrumenter",
            root_dir.display(),
            cache.loader().instrumenter_name()
        );

        Ok(Self {
            config: Arc::new(config),
            root_dir,
            cache,
            invalidation,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The canonical root directory that requests are served from.
    pub fn root_dir(&self) -> &PathBuf {
        &self.root_dir
    }

    pub fn cache(&self) -> &InstrumentCache {
        &self.cache
    }

    /// Returns the instrumented source for the request `path`.
    ///
    /// The path is normalized first, so that every spelling of a file shares one cache entry,
    /// which is also the entry that changes to the file invalidate.
    pub async fn instrument(&self, path: &str) -> LoadResult<Arc<str>> {
        let key = normalize_key(path).ok_or(LoadError::NotFound)?;
        self.cache.get(&key).await
    }

    /// The watcher invalidating the cache, if watching is enabled.
    pub fn watcher(&self) -> Option<&ChangeWatcher> {
        self.invalidation.as_deref().map(|binding| binding.watcher())
    }
}

fn create_instrumenter(config: &InstrumenterConfig) -> Arc<dyn Instrumenter> {
    match config {
        InstrumenterConfig::Passthrough => Arc::new(Passthrough),
        InstrumenterConfig::Command {
            program,
            args,
            timeout,
        } => Arc::new(CommandInstrumenter::new(
            program.clone(),
            args.clone(),
            *timeout,
        )),
    }
}
