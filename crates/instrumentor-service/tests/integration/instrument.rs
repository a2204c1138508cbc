use std::fs;
use std::time::Duration;

use instrumentor_service::caching::LoadError;
use instrumentor_service::config::InstrumenterConfig;
use instrumentor_service::watcher::ManualWatch;

use crate::setup_services;

#[tokio::test]
async fn test_serves_sources() {
    let (services, _public) = setup_services(&ManualWatch::new(), |_| {});

    let source = services.cache().get("/lib/util.js").await.unwrap();
    insta::assert_snapshot!(source, @r###"
    window.util = {
        capitalize: function (s) {
            return s.charAt(0).toUpperCase() + s.slice(1);
        }
    };
    "###);
}

#[tokio::test]
async fn test_concurrent_requests_share_one_load() {
    let (services, _public) = setup_services(&ManualWatch::new(), |_| {});
    let cache = services.cache();

    let (a, b, c) = tokio::join!(
        cache.get("/lib/app.js"),
        cache.get("/lib/app.js"),
        cache.get("/lib/app.js"),
    );

    let a = a.unwrap();
    assert_eq!(a, b.unwrap());
    assert_eq!(a, c.unwrap());
    assert_eq!(cache.cached_keys(), ["/lib/app.js"]);
}

#[tokio::test]
async fn test_missing_source_is_retried() {
    let (services, public) = setup_services(&ManualWatch::new(), |_| {});
    let cache = services.cache();

    assert_eq!(cache.get("/lib/late.js").await, Err(LoadError::NotFound));
    assert!(!cache.contains("/lib/late.js"));

    fs::write(public.path().join("lib/late.js"), "var late = true;").unwrap();
    let source = cache.get("/lib/late.js").await.unwrap();
    assert_eq!(&*source, "var late = true;");
}

#[tokio::test]
async fn test_escaping_root_is_not_found() {
    let (services, _public) = setup_services(&ManualWatch::new(), |_| {});

    let result = services.cache().get("/../public/lib/app.js").await;
    assert_eq!(result, Err(LoadError::NotFound));
}

#[cfg(unix)]
#[tokio::test]
async fn test_command_instrumenter() {
    let (services, _public) = setup_services(&ManualWatch::new(), |config| {
        config.instrumenter = InstrumenterConfig::Command {
            program: "sh".into(),
            args: vec![
                "-c".into(),
                r#"echo "__coverage__['$1'] = {};"; cat"#.into(),
                "instrument".into(),
                "{name}".into(),
            ],
            timeout: Duration::from_secs(10),
        };
    });

    let source = services.cache().get("/lib/util.js").await.unwrap();
    insta::assert_snapshot!(source, @r###"
    __coverage__['/lib/util.js'] = {};
    window.util = {
        capitalize: function (s) {
            return s.charAt(0).toUpperCase() + s.slice(1);
        }
    };
    "###);
}

#[cfg(unix)]
#[tokio::test]
async fn test_failing_instrumenter_is_not_cached() {
    let (services, _public) = setup_services(&ManualWatch::new(), |config| {
        config.instrumenter = InstrumenterConfig::Command {
            program: "sh".into(),
            args: vec!["-c".into(), "echo 'SyntaxError' >&2; exit 2".into()],
            timeout: Duration::from_secs(10),
        };
    });
    let cache = services.cache();

    let result = cache.get("/lib/app.js").await;
    assert_eq!(result, Err(LoadError::Malformed("SyntaxError".into())));
    assert!(cache.cached_keys().is_empty());
}
