//! Reference resolution and cache behavior of `AssetsManager`.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use mlvault::mock::{DriverOp, MockDriver};
use mlvault::{AssetError, AssetsManager, StorageDriver, StorageProvider};
use tempfile::TempDir;

struct Harness {
    driver: Arc<MockDriver>,
    manager: AssetsManager,
    cache: TempDir,
}

fn harness() -> Harness {
    let driver = Arc::new(MockDriver::new());
    let provider = StorageProvider::new(driver.clone(), "dev").unwrap();
    let cache = TempDir::new().unwrap();
    Harness {
        manager: AssetsManager::new(provider, cache.path()),
        driver,
        cache,
    }
}

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn push_sample(h: &Harness, name: &str, version: &str) {
    let src = TempDir::new().unwrap();
    write(src.path(), "a.txt", &format!("alpha {}", version));
    write(src.path(), "sub/b.txt", "beta");
    let provider = h.manager.provider();
    if provider.get_versions_info(name).unwrap().is_empty() {
        provider.new_asset(src.path(), name, version, false).unwrap();
    } else {
        provider.update(src.path(), name, version, false).unwrap();
    }
}

#[test]
fn test_fetch_roundtrip() {
    let h = harness();
    push_sample(&h, "model", "0.0");

    let fetched = h.manager.fetch_asset("model:0.0", true, false).unwrap();
    assert!(!fetched.from_cache);
    assert_eq!(fetched.version, "0.0");
    assert_eq!(fetched.path, h.cache.path().join("dev/model/0.0"));
    assert_eq!(
        fs::read_to_string(fetched.path.join("a.txt")).unwrap(),
        "alpha 0.0"
    );
    assert_eq!(
        fs::read_to_string(fetched.path.join("sub/b.txt")).unwrap(),
        "beta"
    );

    let info = fetched.info.unwrap();
    assert_eq!(info.env, "dev");
    let paths: Vec<&str> = info.files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["a.txt", "sub/b.txt"]);
    assert_eq!(info.files[1].size, 4);
}

#[test]
fn test_resolve_latest_and_partial() {
    let h = harness();
    push_sample(&h, "model", "0.0");
    push_sample(&h, "model", "0.1");
    push_sample(&h, "model", "1.0");
    push_sample(&h, "model", "1.3");

    assert_eq!(h.manager.fetch_asset("model", false, false).unwrap().version, "1.3");
    assert_eq!(h.manager.fetch_asset("model:0", false, false).unwrap().version, "0.1");
    assert_eq!(h.manager.fetch_asset("model:1.0", false, false).unwrap().version, "1.0");

    let err = h.manager.fetch_asset("model:2", false, false).unwrap_err();
    assert!(err.is_not_found(), "{err}");
    let err = h.manager.fetch_asset("ghost", false, false).unwrap_err();
    assert!(err.is_not_found(), "{err}");
}

#[test]
fn test_minor_versions_sort_numerically() {
    let h = harness();
    push_sample(&h, "model", "1.2");
    push_sample(&h, "model", "1.10");

    let fetched = h.manager.fetch_asset("model:1", false, false).unwrap();
    assert_eq!(fetched.version, "1.10");
}

#[test]
fn test_plan_update_from_existing() {
    let h = harness();
    push_sample(&h, "model", "2.5");
    let policy = h.manager.provider().policy();
    let existing = h.manager.provider().get_versions_info("model").unwrap();

    assert_eq!(policy.plan_update(None, &existing, false).unwrap().new_version, "2.6");
    assert_eq!(policy.plan_update(None, &existing, true).unwrap().new_version, "3.0");
}

#[test]
fn test_warm_cache_makes_no_backend_calls() {
    let h = harness();
    push_sample(&h, "model", "0.0");
    h.manager.fetch_asset("model:0.0", false, false).unwrap();

    h.driver.reset_calls();
    let fetched = h.manager.fetch_asset("model:0.0", true, false).unwrap();
    assert!(fetched.from_cache);
    assert_eq!(h.driver.total_calls(), 0);
    assert_eq!(fetched.info.unwrap().manifest.contents, vec!["a.txt", "sub/b.txt"]);
}

#[test]
fn test_force_download_refreshes_cache() {
    let h = harness();
    push_sample(&h, "model", "0.0");
    let fetched = h.manager.fetch_asset("model:0.0", false, false).unwrap();
    fs::write(fetched.path.join("a.txt"), "local edit").unwrap();

    h.driver.reset_calls();
    let fetched = h.manager.fetch_asset("model:0.0", false, true).unwrap();
    assert!(!fetched.from_cache);
    assert!(h.driver.calls(DriverOp::Download) > 0);
    assert_eq!(
        fs::read_to_string(fetched.path.join("a.txt")).unwrap(),
        "alpha 0.0"
    );
}

#[test]
fn test_single_file_asset_resolves_to_file() {
    let h = harness();
    let src = TempDir::new().unwrap();
    write(src.path(), "weights.bin", "0101");
    h.manager
        .provider()
        .new_asset(&src.path().join("weights.bin"), "weights", "0.0", false)
        .unwrap();

    let fetched = h.manager.fetch_asset("weights", false, false).unwrap();
    assert_eq!(fetched.path, h.cache.path().join("dev/weights/0.0/weights.bin"));
    assert_eq!(fs::read_to_string(&fetched.path).unwrap(), "0101");

    // Second fetch goes through the cached manifest.
    let cached = h.manager.fetch_asset("weights:0.0", false, false).unwrap();
    assert!(cached.from_cache);
    assert_eq!(cached.path, fetched.path);
}

#[test]
fn test_tampered_remote_fails_verification() {
    let h = harness();
    push_sample(&h, "model", "0.0");
    h.driver.put_bytes("dev/model/0.0/sub/b.txt", "BETA");

    let err = h.manager.fetch_asset("model:0.0", false, false).unwrap_err();
    match err {
        AssetError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::InvalidData),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!h.manager.cache_path("model", "0.0").exists());
    let leftovers: Vec<_> = fs::read_dir(h.cache.path().join("dev/model"))
        .unwrap()
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn test_missing_remote_object_leaves_no_cache() {
    let h = harness();
    push_sample(&h, "model", "0.0");
    // Remove a listed file behind the manifest's back.
    h.driver.delete_object("dev/model/0.0/a.txt").unwrap();

    let err = h.manager.fetch_asset("model:0.0", false, false).unwrap_err();
    assert!(err.is_not_found(), "{err}");
    assert!(!h.manager.cache_path("model", "0.0").exists());
}

#[test]
fn test_cached_versions() {
    let h = harness();
    assert!(h.manager.cached_versions("model").unwrap().is_empty());

    push_sample(&h, "model", "0.10");
    push_sample(&h, "model", "0.2");
    h.manager.fetch_asset("model:0.10", false, false).unwrap();
    h.manager.fetch_asset("model:0.2", false, false).unwrap();

    assert_eq!(h.manager.cached_versions("model").unwrap(), vec!["0.2", "0.10"]);
}

#[test]
fn test_invalid_reference() {
    let h = harness();
    let err = h.manager.fetch_asset("model:x.y", false, false).unwrap_err();
    assert!(matches!(err, AssetError::InvalidReference(_)), "{err}");
}

#[test]
fn test_nested_name_cannot_reach_version_cache() {
    let h = harness();
    push_sample(&h, "a", "1.0");
    let fetched = h.manager.fetch_asset("a:1.0", false, false).unwrap();

    let err = h.manager.fetch_asset("a/1.0:2.0", false, false).unwrap_err();
    assert!(matches!(err, AssetError::InvalidReference(_)), "{err}");

    // The cached version of `a` is untouched and still a real hit.
    let again = h.manager.fetch_asset("a:1.0", true, false).unwrap();
    assert!(again.from_cache);
    assert_eq!(again.path, fetched.path);
    assert_eq!(again.info.unwrap().manifest.contents, vec!["a.txt", "sub/b.txt"]);
    assert!(!fetched.path.join("2.0").exists());
}

#[test]
fn test_unpinned_reference_resolves_to_stored_token() {
    let h = harness();
    push_sample(&h, "m", "1.2");
    push_sample(&h, "m", "1.10");

    for reference in ["m", "m:1"] {
        let fetched = h.manager.fetch_asset(reference, false, true).unwrap();
        assert_eq!(fetched.version, "1.10");
        assert!(fetched.path.join("a.txt").is_file());
    }

    let err = h.manager.fetch_asset("m:1.02", false, false).unwrap_err();
    assert!(matches!(err, AssetError::InvalidReference(_)), "{err}");
}
