use std::fs;
use std::time::Duration;

use instrumentor_service::watcher::{ManualWatch, NotifyWatch};

use crate::setup_services;

#[tokio::test]
async fn test_change_reloads_source() {
    let primitive = ManualWatch::new();
    let (services, public) = setup_services(&primitive, |_| {});
    let cache = services.cache();

    let source = cache.get("/lib/app.js").await.unwrap();
    assert!(source.contains("function greet"));

    fs::write(public.path().join("lib/app.js"), "function farewell() {}").unwrap();
    primitive.trigger(services.root_dir().join("lib/app.js"));

    let source = cache.get("/lib/app.js").await.unwrap();
    assert_eq!(&*source, "function farewell() {}");
}

#[tokio::test]
async fn test_change_reloads_non_canonical_paths() {
    let primitive = ManualWatch::new();
    let (services, public) = setup_services(&primitive, |_| {});

    let source = services.instrument("/lib//app.js").await.unwrap();
    assert!(source.contains("function greet"));
    services.instrument("/lib/./app.js").await.unwrap();
    assert_eq!(services.cache().cached_keys(), ["/lib/app.js"]);

    fs::write(public.path().join("lib/app.js"), "function farewell() {}").unwrap();
    primitive.trigger(services.root_dir().join("lib/app.js"));

    let source = services.instrument("/lib//app.js").await.unwrap();
    assert_eq!(&*source, "function farewell() {}");
}

#[tokio::test]
async fn test_changes_outside_root_are_ignored() {
    let primitive = ManualWatch::new();
    let (services, _public) = setup_services(&primitive, |_| {});
    let cache = services.cache();

    cache.get("/lib/app.js").await.unwrap();
    primitive.trigger("/somewhere/else/lib/app.js");

    assert!(cache.contains("/lib/app.js"));
}

#[tokio::test]
async fn test_watches_source_dir() {
    let primitive = ManualWatch::new();
    let (services, public) = setup_services(&primitive, |config| {
        config.source_dir = Some(config.root_dir.join("lib"));
    });

    let expected = fs::canonicalize(public.path().join("lib")).unwrap();
    assert_eq!(primitive.watched_roots(), [expected]);

    let cache = services.cache();
    cache.get("/lib/util.js").await.unwrap();
    primitive.trigger(services.root_dir().join("lib/util.js"));
    assert!(!cache.contains("/lib/util.js"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_filesystem_changes() {
    let (services, public) = setup_services(&NotifyWatch, |_| {});
    let cache = services.cache();

    let source = cache.get("/lib/util.js").await.unwrap();
    assert!(source.contains("capitalize"));

    fs::write(public.path().join("lib/util.js"), "window.util = {};").unwrap();

    tokio::time::timeout(Duration::from_secs(10), async {
        while cache.contains("/lib/util.js") {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("change was not picked up by the watcher");

    let source = cache.get("/lib/util.js").await.unwrap();
    assert_eq!(&*source, "window.util = {};");
}
