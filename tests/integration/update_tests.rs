use std::fs;
use std::path::Path;
use std::sync::Arc;

use filetime::{set_file_mtime, FileTime};
use tempfile::{tempdir, TempDir};
use treesum::engine::{GenerateConfig, GenerateError, ManifestGenerator, RunMode, RunSummary};
use treesum::manifest::Manifest;
use treesum::scanner::Algorithm;

struct Fixture {
    root: TempDir,
    _out: TempDir,
    manifest: std::path::PathBuf,
}

impl Fixture {
    fn new(files: &[(&str, &str)]) -> Self {
        let root = tempdir().unwrap();
        for (rel, content) in files {
            let path = root.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, content).unwrap();
        }
        let out = tempdir().unwrap();
        let manifest = out.path().join(".hashes");
        Self {
            root,
            _out: out,
            manifest,
        }
    }

    fn run(&self, config: GenerateConfig) -> Result<RunSummary, GenerateError> {
        ManifestGenerator::new(config).run(self.root.path(), &self.manifest)
    }

    fn path(&self, rel: &str) -> std::path::PathBuf {
        self.root.path().join(rel)
    }

    fn digest_of(&self, filename: &str) -> Option<String> {
        Manifest::load(&self.manifest)
            .unwrap()
            .records
            .into_iter()
            .find(|r| r.filename == filename)
            .map(|r| r.digest)
    }
}

fn touch(path: &Path, seconds: i64) {
    set_file_mtime(path, FileTime::from_unix_time(seconds, 0)).unwrap();
}

#[test]
fn test_unchanged_tree_reads_no_bytes() {
    let fx = Fixture::new(&[("a", "alpha"), ("d/b", "beta"), ("d/e/c", "gamma")]);
    fx.run(GenerateConfig::new(RunMode::Generate)).unwrap();

    let summary = fx.run(GenerateConfig::new(RunMode::Update)).unwrap();

    assert_eq!(summary.files_reused, 3);
    assert_eq!(summary.files_hashed, 0);
    assert_eq!(summary.bytes_read, 0);
    assert_eq!(summary.records_written, 3);
    assert_eq!(summary.vanished, 0);
}

#[test]
fn test_modified_file_is_rehashed() {
    let fx = Fixture::new(&[("a", "alpha"), ("b", "beta")]);
    fx.run(GenerateConfig::new(RunMode::Generate)).unwrap();
    let old = fx.digest_of("a").unwrap();

    fs::write(fx.path("a"), b"ALPHA!").unwrap();
    touch(&fx.path("a"), 1_900_000_000);
    let summary = fx.run(GenerateConfig::new(RunMode::Update)).unwrap();

    assert_eq!(summary.files_hashed, 1);
    assert_eq!(summary.files_reused, 1);
    assert_eq!(summary.bytes_read, 6);
    // The old identity key no longer matches, so it counts as vanished.
    assert_eq!(summary.vanished, 1);
    assert_ne!(fx.digest_of("a").unwrap(), old);
}

#[test]
fn test_same_size_content_change_needs_mtime_change() {
    let fx = Fixture::new(&[("a", "aaaa")]);
    touch(&fx.path("a"), 1_700_000_000);
    fx.run(GenerateConfig::new(RunMode::Generate)).unwrap();
    let original = fx.digest_of("a").unwrap();

    // Same size and mtime: the cached digest is trusted.
    fs::write(fx.path("a"), b"bbbb").unwrap();
    touch(&fx.path("a"), 1_700_000_000);
    fx.run(GenerateConfig::new(RunMode::Update)).unwrap();
    assert_eq!(fx.digest_of("a").unwrap(), original);

    touch(&fx.path("a"), 1_700_000_001);
    fx.run(GenerateConfig::new(RunMode::Update)).unwrap();
    assert_ne!(fx.digest_of("a").unwrap(), original);
}

#[test]
fn test_old_mtime_is_never_trusted() {
    let fx = Fixture::new(&[("ancient", "old")]);
    touch(&fx.path("ancient"), 315_532_800); // 1980-01-01
    fx.run(GenerateConfig::new(RunMode::Generate)).unwrap();

    let summary = fx.run(GenerateConfig::new(RunMode::Update)).unwrap();
    assert_eq!(summary.files_hashed, 1);
    assert_eq!(summary.files_reused, 0);

    // Lowering the epoch makes the same record reusable.
    let summary = fx
        .run(GenerateConfig::new(RunMode::Update).with_sanity_epoch(0.0))
        .unwrap();
    assert_eq!(summary.files_reused, 1);
}

#[test]
fn test_deleted_file_is_dropped_and_counted() {
    let fx = Fixture::new(&[("keep", "k"), ("gone", "g")]);
    fx.run(GenerateConfig::new(RunMode::Generate)).unwrap();

    fs::remove_file(fx.path("gone")).unwrap();
    let summary = fx.run(GenerateConfig::new(RunMode::Update)).unwrap();

    assert_eq!(summary.vanished, 1);
    assert_eq!(summary.records_written, 1);
    assert!(fx.digest_of("gone").is_none());
    assert!(fx.digest_of("keep").is_some());
}

#[test]
fn test_append_adds_only_new_files() {
    let fx = Fixture::new(&[("a", "alpha"), ("b", "beta")]);
    fx.run(GenerateConfig::new(RunMode::Generate)).unwrap();

    fs::write(fx.path("c"), b"gamma").unwrap();
    let summary = fx.run(GenerateConfig::new(RunMode::Append)).unwrap();

    assert_eq!(summary.files_reused, 2);
    assert_eq!(summary.files_hashed, 1);
    assert_eq!(summary.records_written, 1);

    let text = fs::read_to_string(&fx.manifest).unwrap();
    assert_eq!(text.matches("# Algorithm:").count(), 1);
    assert_eq!(Manifest::load(&fx.manifest).unwrap().len(), 3);
}

#[test]
fn test_append_creates_missing_manifest() {
    let fx = Fixture::new(&[("a", "alpha")]);
    let summary = fx.run(GenerateConfig::new(RunMode::Append)).unwrap();
    assert_eq!(summary.records_written, 1);

    let loaded = Manifest::load(&fx.manifest).unwrap();
    assert_eq!(loaded.algorithm.as_deref(), Some("md5"));
    assert_eq!(loaded.len(), 1);
}

#[test]
fn test_algorithm_switch_requires_confirmation() {
    let fx = Fixture::new(&[("a", "alpha")]);
    fx.run(GenerateConfig::new(RunMode::Generate)).unwrap();
    let before = fs::read_to_string(&fx.manifest).unwrap();

    let declined = fx.run(
        GenerateConfig::new(RunMode::Update)
            .with_algorithm(Algorithm::Sha256)
            .with_confirm(Arc::new(|_: &str, _: Algorithm| false)),
    );
    assert!(matches!(
        declined,
        Err(GenerateError::AlgorithmMismatch { ref previous, requested: Algorithm::Sha256 })
            if previous == "md5"
    ));
    assert_eq!(fs::read_to_string(&fx.manifest).unwrap(), before);

    let summary = fx
        .run(
            GenerateConfig::new(RunMode::Update)
                .with_algorithm(Algorithm::Sha256)
                .with_confirm(Arc::new(|_: &str, _: Algorithm| true)),
        )
        .unwrap();
    assert_eq!(summary.files_hashed, 1);
    assert_eq!(summary.files_reused, 0);
    let loaded = Manifest::load(&fx.manifest).unwrap();
    assert_eq!(loaded.algorithm.as_deref(), Some("sha256"));
    assert_eq!(loaded.records[0].digest.len(), 64);
}

#[test]
fn test_headerless_manifest_is_used_as_cache() {
    let fx = Fixture::new(&[("a", "alpha")]);
    fx.run(GenerateConfig::new(RunMode::Generate)).unwrap();
    let text = fs::read_to_string(&fx.manifest).unwrap();
    let body: String = text.lines().skip(1).map(|l| format!("{l}\n")).collect();
    fs::write(&fx.manifest, body).unwrap();

    let summary = fx.run(GenerateConfig::new(RunMode::Update)).unwrap();
    assert_eq!(summary.files_reused, 1);
    assert_eq!(
        Manifest::load(&fx.manifest).unwrap().algorithm.as_deref(),
        Some("md5")
    );
}
