use std::fs;
use std::path::Path;

use walkdir::WalkDir;

use instrumentor_service::config::Config;
use instrumentor_service::services::SharedServices;
use instrumentor_service::watcher::WatchPrimitive;
use instrumentor_test as test;

pub use test::{TempDir, fixture};

/// Copies the fixture directory `name` into a fresh temporary directory.
///
/// Tests are free to modify the copy. Keep the returned [`TempDir`] alive until the test has
/// finished.
pub fn public_dir(name: &str) -> TempDir {
    let dir = test::tempdir();
    copy_dir(&fixture(name), dir.path());
    dir
}

fn copy_dir(from: &Path, to: &Path) {
    for entry in WalkDir::new(from).min_depth(1) {
        let entry = entry.unwrap();
        let target = to.join(entry.path().strip_prefix(from).unwrap());
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).unwrap();
        } else {
            fs::copy(entry.path(), &target).unwrap();
        }
    }
}

/// Setup tests and create the services, serving a copy of the `public` fixtures.
///
/// The `update_config` closure can modify any default configuration if needed before the
/// services are created.
pub fn setup_services(
    primitive: &impl WatchPrimitive,
    update_config: impl FnOnce(&mut Config),
) -> (SharedServices, TempDir) {
    test::setup();

    let public = public_dir("public");
    let mut config = Config {
        root_dir: public.path().to_owned(),
        ..Default::default()
    };
    update_config(&mut config);

    let services = SharedServices::create_with_watch(config, primitive).unwrap();
    (services, public)
}
