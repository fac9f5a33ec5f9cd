use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tempfile::tempdir;
use treesum::engine::{GenerateConfig, GenerateError, ManifestGenerator, RunMode, WorkerProgress};
use treesum::manifest::{decode_line, temp_path, Line, Manifest};
use treesum::progress::ProgressCallback;
use treesum::scanner::Algorithm;

fn write(root: &Path, rel: &str, content: &[u8]) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn sorted_paths(manifest: &Manifest) -> Vec<String> {
    let mut paths: Vec<String> = manifest.records.iter().map(|r| r.path()).collect();
    paths.sort();
    paths
}

#[test]
fn test_generate_records_every_file() {
    let root = tempdir().unwrap();
    write(root.path(), "a.txt", b"hello");
    write(root.path(), "sub/b.txt", b"world");
    write(root.path(), "sub/deeper/empty", b"");
    let out = tempdir().unwrap();
    let manifest = out.path().join("snap.hashes");

    let summary = ManifestGenerator::new(GenerateConfig::new(RunMode::Generate).with_workers(2))
        .run(root.path(), &manifest)
        .unwrap();

    assert_eq!(summary.files_discovered, 3);
    assert_eq!(summary.files_hashed, 3);
    assert_eq!(summary.records_written, 3);
    assert_eq!(summary.bytes_read, 10);

    let loaded = Manifest::load(&manifest).unwrap();
    assert_eq!(loaded.algorithm.as_deref(), Some("md5"));
    assert_eq!(
        sorted_paths(&loaded),
        vec!["./a.txt", "sub/b.txt", "sub/deeper/empty"]
    );
    let hello = loaded.records.iter().find(|r| r.filename == "a.txt").unwrap();
    assert_eq!(hello.digest, "5d41402abc4b2a76b9719d911017c592");
    assert_eq!(hello.size, 5);
    assert!(!temp_path(&manifest).exists());
}

#[test]
fn test_manifest_inside_root_is_not_recorded() {
    let root = tempdir().unwrap();
    write(root.path(), "a.txt", b"hello");
    write(root.path(), ".git/HEAD", b"ref: refs/heads/main");
    let manifest = root.path().join(".hashes");

    ManifestGenerator::new(GenerateConfig::new(RunMode::Generate))
        .run(root.path(), &manifest)
        .unwrap();
    // A second run must not pick up the manifest written by the first.
    ManifestGenerator::new(GenerateConfig::new(RunMode::Generate))
        .run(root.path(), &manifest)
        .unwrap();

    let loaded = Manifest::load(&manifest).unwrap();
    assert_eq!(sorted_paths(&loaded), vec!["./a.txt"]);
}

#[test]
fn test_every_line_is_well_formed() {
    let root = tempdir().unwrap();
    write(root.path(), "pipe|name", b"1");
    write(root.path(), "line\nbreak", b"2");
    write(root.path(), "back\\slash", b"3");
    let out = tempdir().unwrap();
    let manifest = out.path().join("m");

    ManifestGenerator::new(GenerateConfig::new(RunMode::Generate).with_algorithm(Algorithm::Sha1))
        .run(root.path(), &manifest)
        .unwrap();

    let text = fs::read_to_string(&manifest).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("# Algorithm: sha1"));
    let mut records = 0;
    for line in lines {
        assert_eq!(line.split('|').count(), 7, "bad line: {line:?}");
        match decode_line(line).unwrap() {
            Line::Record(record) => {
                assert_eq!(record.digest.len(), 40);
                records += 1;
            }
            other => panic!("unexpected line {other:?}"),
        }
    }
    assert_eq!(records, 3);
}

/// Raises the shutdown flag as soon as any worker reports progress.
struct InterruptOnProgress(Arc<AtomicBool>);

impl ProgressCallback for InterruptOnProgress {
    fn on_worker_start(&self, _worker: usize, _progress: &WorkerProgress) {}
    fn on_worker_progress(&self, _worker: usize, _progress: &WorkerProgress) {
        self.0.store(true, Ordering::SeqCst);
    }
    fn on_worker_done(&self, _worker: usize, _progress: &WorkerProgress) {}
}

#[test]
fn test_interrupt_mid_run_leaves_no_partial_lines() {
    let root = tempdir().unwrap();
    for i in 0..200 {
        write(root.path(), &format!("d{}/f{i}", i % 7), format!("{i}").as_bytes());
    }
    let out = tempdir().unwrap();
    let manifest = out.path().join("m");
    let flag = Arc::new(AtomicBool::new(false));

    let config = GenerateConfig::new(RunMode::Generate)
        .with_workers(1)
        .with_write_frequency(5)
        .with_shutdown_flag(Arc::clone(&flag))
        .with_progress_callback(Arc::new(InterruptOnProgress(Arc::clone(&flag))));
    let result = ManifestGenerator::new(config).run(root.path(), &manifest);

    assert!(matches!(result, Err(GenerateError::Interrupted)));
    assert!(!temp_path(&manifest).exists());
    if manifest.exists() {
        let text = fs::read_to_string(&manifest).unwrap();
        assert!(text.ends_with('\n'));
        for line in text.lines().skip(1) {
            assert!(matches!(decode_line(line), Ok(Line::Record(_))), "bad line: {line:?}");
        }
    }
}

#[test]
fn test_interrupt_keeps_previous_manifest_when_nothing_written() {
    let root = tempdir().unwrap();
    write(root.path(), "a", b"a");
    let out = tempdir().unwrap();
    let manifest = out.path().join("m");
    ManifestGenerator::new(GenerateConfig::new(RunMode::Generate))
        .run(root.path(), &manifest)
        .unwrap();
    let before = fs::read_to_string(&manifest).unwrap();

    let flag = Arc::new(AtomicBool::new(true));
    let result = ManifestGenerator::new(
        GenerateConfig::new(RunMode::Generate).with_shutdown_flag(flag),
    )
    .run(root.path(), &manifest);

    assert!(matches!(result, Err(GenerateError::Interrupted)));
    assert_eq!(fs::read_to_string(&manifest).unwrap(), before);
}

#[test]
fn test_worker_counts_do_not_change_digests() {
    let root = tempdir().unwrap();
    for i in 0..40 {
        write(root.path(), &format!("f{i:02}"), &vec![b'x'; i * 100]);
    }
    let out = tempdir().unwrap();

    let mut results = Vec::new();
    for workers in [1, 3, 8] {
        let manifest = out.path().join(format!("m{workers}"));
        ManifestGenerator::new(GenerateConfig::new(RunMode::Generate).with_workers(workers))
            .run(root.path(), &manifest)
            .unwrap();
        let mut pairs: Vec<(String, String)> = Manifest::load(&manifest)
            .unwrap()
            .records
            .into_iter()
            .map(|r| (r.path(), r.digest))
            .collect();
        pairs.sort();
        results.push(pairs);
    }
    assert_eq!(results[0].len(), 40);
    assert_eq!(results[0], results[1]);
    assert_eq!(results[1], results[2]);
}

#[test]
fn test_generate_after_tree_emptied_drops_old_records() {
    let root = tempdir().unwrap();
    write(root.path(), "a.txt", b"hello");
    let out = tempdir().unwrap();
    let manifest = out.path().join("snap.hashes");

    ManifestGenerator::new(GenerateConfig::new(RunMode::Generate))
        .run(root.path(), &manifest)
        .unwrap();
    assert_eq!(Manifest::load(&manifest).unwrap().len(), 1);

    fs::remove_file(root.path().join("a.txt")).unwrap();
    let summary = ManifestGenerator::new(GenerateConfig::new(RunMode::Generate))
        .run(root.path(), &manifest)
        .unwrap();

    assert_eq!(summary.files_discovered, 0);
    let loaded = Manifest::load(&manifest).unwrap();
    assert!(loaded.is_empty());
    assert_eq!(loaded.algorithm.as_deref(), Some("md5"));
    assert!(!temp_path(&manifest).exists());
}
