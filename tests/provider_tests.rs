//! Push, listing and guard behavior of `StorageProvider`.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mlvault::driver::LocalStorageDriver;
use mlvault::mock::{DriverOp, FailureConfig, MockDriver};
use mlvault::{AssetError, AssumeYes, Confirm, RetryPolicy, StorageDriver, StorageProvider};
use tempfile::TempDir;

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn sample_asset() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.txt", "alpha");
    write(dir.path(), "sub/b.txt", "beta");
    dir
}

fn mock_provider() -> (Arc<MockDriver>, StorageProvider) {
    let driver = Arc::new(MockDriver::new());
    let provider = StorageProvider::new(driver.clone(), "dev").unwrap();
    (driver, provider)
}

/// Answers yes and counts how often it was asked.
#[derive(Debug, Default)]
struct CountingConfirm(AtomicUsize);

impl Confirm for CountingConfirm {
    fn confirm(&self, _message: &str, _prompt: &str) -> bool {
        self.0.fetch_add(1, Ordering::SeqCst);
        true
    }
}

#[test]
fn test_manifest_lists_exactly_the_remote_files() {
    let bucket = TempDir::new().unwrap();
    let driver = Arc::new(LocalStorageDriver::new(bucket.path()).unwrap());
    let provider = StorageProvider::new(driver.clone(), "dev").unwrap();
    let src = sample_asset();

    let report = provider.new_asset(src.path(), "model", "0.0", false).unwrap();
    assert_eq!(report.manifest.contents, vec!["a.txt", "sub/b.txt"]);

    let prefix = provider.version_prefix("model", "0.0");
    let mut remote: Vec<String> = driver
        .iterate_objects(&prefix)
        .map(|k| k.unwrap()[prefix.len()..].to_string())
        .collect();
    remote.sort();
    assert_eq!(remote, report.manifest.contents);

    let fetched = provider.get_asset_meta("model", "0.0").unwrap();
    assert_eq!(fetched.contents, report.manifest.contents);
    assert_eq!(fetched.metadata.files["sub/b.txt"].size, 4);
}

#[test]
fn test_update_of_unknown_asset_is_not_found() {
    let (driver, provider) = mock_provider();
    let src = sample_asset();

    let err = provider.update(src.path(), "ghost", "0.1", false).unwrap_err();
    assert!(err.is_not_found(), "{err}");
    assert_eq!(driver.calls(DriverOp::Upload), 0);
}

#[test]
fn test_new_on_existing_version_already_exists() {
    let (_driver, provider) = mock_provider();
    let src = sample_asset();

    provider.new_asset(src.path(), "model", "0.0", false).unwrap();
    let err = provider
        .new_asset(src.path(), "model", "0.0", false)
        .unwrap_err();
    assert!(matches!(err, AssetError::AlreadyExists { .. }), "{err}");
}

#[test]
fn test_update_replaces_version_contents() {
    let (driver, provider) = mock_provider();
    let first = TempDir::new().unwrap();
    write(first.path(), "a.txt", "alpha");
    write(first.path(), "old.txt", "stale");
    provider.new_asset(first.path(), "model", "0.0", false).unwrap();

    let second = TempDir::new().unwrap();
    write(second.path(), "a.txt", "alpha v2");
    let report = provider.update(second.path(), "model", "0.0", false).unwrap();

    assert_eq!(report.removed, vec!["dev/model/0.0/old.txt"]);
    assert_eq!(report.manifest.contents, vec!["a.txt"]);
    assert!(driver.get_bytes("dev/model/0.0/old.txt").is_none());
    assert_eq!(
        driver.get_bytes("dev/model/0.0/a.txt").unwrap(),
        b"alpha v2".to_vec()
    );
}

#[test]
fn test_dry_run_writes_nothing() {
    let (driver, provider) = mock_provider();
    let src = sample_asset();

    let report = provider.new_asset(src.path(), "model", "0.0", true).unwrap();
    assert!(report.dry_run);
    assert_eq!(report.manifest.contents.len(), 2);
    assert_eq!(driver.calls(DriverOp::Upload), 0);
    assert_eq!(driver.calls(DriverOp::Delete), 0);
    assert!(driver.keys().is_empty());
}

#[test]
fn test_missing_destination_object_fails_without_manifest() {
    let (driver, provider) = mock_provider();
    let src = sample_asset();
    driver.drop_uploads_of("dev/model/0.0/sub/b.txt");

    let err = provider
        .new_asset(src.path(), "model", "0.0", false)
        .unwrap_err();
    match err {
        AssetError::PushIncomplete { missing } => {
            assert_eq!(missing, vec!["dev/model/0.0/sub/b.txt"])
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(driver
        .get_bytes(&provider.manifest_key("model", "0.0"))
        .is_none());
    assert!(provider.get_versions_info("model").unwrap().is_empty());
}

#[test]
fn test_too_many_files_aborts_without_confirmation() {
    let (driver, provider) = mock_provider();
    let src = TempDir::new().unwrap();
    for i in 0..51 {
        write(src.path(), &format!("f{:02}.txt", i), "x");
    }

    let err = provider
        .new_asset(src.path(), "big", "0.0", false)
        .unwrap_err();
    assert!(matches!(err, AssetError::Aborted(_)), "{err}");
    assert_eq!(driver.calls(DriverOp::Upload), 0);

    let provider = provider.with_confirm(Arc::new(AssumeYes));
    let report = provider.new_asset(src.path(), "big", "0.0", false).unwrap();
    assert_eq!(report.manifest.contents.len(), 51);
    assert_eq!(driver.calls(DriverOp::Upload), 52);
}

#[test]
fn test_fifty_files_needs_no_confirmation() {
    let (_driver, provider) = mock_provider();
    let confirm = Arc::new(CountingConfirm::default());
    let provider = provider.with_confirm(confirm.clone());
    let src = TempDir::new().unwrap();
    for i in 0..50 {
        write(src.path(), &format!("f{:02}.txt", i), "x");
    }

    provider.new_asset(src.path(), "fifty", "0.0", false).unwrap();
    assert_eq!(confirm.0.load(Ordering::SeqCst), 0);
}

#[test]
fn test_iterate_assets() {
    let (_driver, provider) = mock_provider();
    assert_eq!(provider.iterate_assets().count(), 0);

    let src = sample_asset();
    provider.new_asset(src.path(), "cv/resnet", "0.0", false).unwrap();
    provider.update(src.path(), "cv/resnet", "0.1", false).unwrap();
    provider.new_asset(src.path(), "ranker", "1.0", false).unwrap();

    let mut assets: Vec<(String, Vec<String>)> =
        provider.iterate_assets().map(|a| a.unwrap()).collect();
    assets.sort();
    assert_eq!(assets.len(), 2);
    assert_eq!(assets[0].0, "cv/resnet");
    let mut versions = assets[0].1.clone();
    versions.sort();
    assert_eq!(versions, vec!["0.0", "0.1"]);
    assert_eq!(assets[1], ("ranker".to_string(), vec!["1.0".to_string()]));
}

#[test]
fn test_environments_are_isolated() {
    let driver = Arc::new(MockDriver::new());
    let dev = StorageProvider::new(driver.clone(), "dev").unwrap();
    let prod = StorageProvider::new(driver.clone(), "prod").unwrap();
    let src = sample_asset();

    dev.new_asset(src.path(), "model", "0.0", false).unwrap();
    assert_eq!(dev.get_versions_info("model").unwrap(), vec!["0.0"]);
    assert!(prod.get_versions_info("model").unwrap().is_empty());
}

#[test]
fn test_push_survives_transient_failures() {
    let driver = Arc::new(
        MockDriver::new().with_retry(RetryPolicy::new(3, Duration::ZERO, Duration::ZERO)),
    );
    let provider = StorageProvider::new(driver.clone(), "dev").unwrap();
    driver.inject(
        DriverOp::Upload,
        FailureConfig::transient("connection reset").with_fail_count(2),
    );

    let src = sample_asset();
    let report = provider.new_asset(src.path(), "model", "0.0", false).unwrap();
    assert_eq!(report.manifest.contents.len(), 2);
    // Two failed attempts, then two files and the manifest.
    assert_eq!(driver.calls(DriverOp::Upload), 5);
}

#[test]
fn test_definitive_failure_is_not_retried() {
    let driver = Arc::new(
        MockDriver::new().with_retry(RetryPolicy::new(5, Duration::ZERO, Duration::ZERO)),
    );
    let provider = StorageProvider::new(driver.clone(), "dev").unwrap();
    driver.inject(DriverOp::Upload, FailureConfig::http(403, "forbidden"));

    let src = sample_asset();
    let err = provider
        .new_asset(src.path(), "model", "0.0", false)
        .unwrap_err();
    assert!(matches!(err, AssetError::Http { status: 403, .. }), "{err}");
    assert_eq!(driver.calls(DriverOp::Upload), 1);
}

#[test]
fn test_single_file_asset() {
    let (_driver, provider) = mock_provider();
    let dir = TempDir::new().unwrap();
    write(dir.path(), "weights.bin", "0101");

    let report = provider
        .new_asset(&dir.path().join("weights.bin"), "model", "0.0", false)
        .unwrap();
    assert_eq!(report.manifest.contents, vec!["weights.bin"]);
    assert!(report.manifest.is_single_file());
}

#[test]
fn test_name_segments_cannot_shadow_versions() {
    let (driver, provider) = mock_provider();
    let src = sample_asset();

    provider.new_asset(src.path(), "a", "1.0", false).unwrap();
    for nested in ["a/1.0", "a/1", "a/1.0.meta"] {
        let err = provider
            .new_asset(src.path(), nested, "2.0", false)
            .unwrap_err();
        assert!(matches!(err, AssetError::InvalidReference(_)), "{nested}: {err}");
    }

    // Re-pushing `a:1.0` only ever sees its own objects.
    let report = provider.update(src.path(), "a", "1.0", false).unwrap();
    assert!(report.removed.is_empty());
    assert_eq!(
        driver.keys(),
        vec!["dev/.meta/a/1.0.meta", "dev/a/1.0/a.txt", "dev/a/1.0/sub/b.txt"]
    );
}

#[test]
fn test_non_canonical_versions_rejected() {
    let (driver, provider) = mock_provider();
    let src = sample_asset();

    for version in ["1.02", "01.2", "1.00"] {
        let err = provider
            .new_asset(src.path(), "m", version, false)
            .unwrap_err();
        assert!(matches!(err, AssetError::InvalidReference(_)), "{version}: {err}");
    }
    assert!(driver.keys().is_empty());
}

#[test]
fn test_pushed_version_is_resolvable() {
    let (_driver, provider) = mock_provider();
    let src = sample_asset();
    provider.new_asset(src.path(), "m", "1.2", false).unwrap();

    let versions = provider.get_versions_info("m").unwrap();
    let latest = provider.policy().latest(Some("1"), &versions).unwrap().unwrap();
    assert_eq!(latest, "1.2");
    provider.get_asset_meta("m", &latest).unwrap();
}
