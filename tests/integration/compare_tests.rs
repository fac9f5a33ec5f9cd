use std::fs;
use std::path::{Path, PathBuf};

use tempfile::tempdir;
use treesum::compare::{ComparePhase, ManifestComparer};
use treesum::engine::{GenerateConfig, ManifestGenerator, RunMode};

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn snapshot(root: &Path, manifest: &Path) {
    ManifestGenerator::new(GenerateConfig::new(RunMode::Generate))
        .run(root, manifest)
        .unwrap();
}

fn compare(left: &Path, right: Option<&Path>, script: &Path) -> (String, Option<PathBuf>) {
    let mut console = Vec::new();
    let mut comparer = ManifestComparer::new(script);
    let summary = comparer.run(left, right, &mut console).unwrap();
    assert_eq!(comparer.phase(), ComparePhase::Done);
    (String::from_utf8(console).unwrap(), summary.script)
}

#[test]
fn test_reorganised_tree_produces_move_script() {
    let root = tempdir().unwrap();
    let out = tempdir().unwrap();
    write(root.path(), "dir1/a.txt", "first");
    write(root.path(), "dir1/b.txt", "second");
    write(root.path(), "top.txt", "third");
    let before = out.path().join("before.hashes");
    snapshot(root.path(), &before);

    fs::create_dir_all(root.path().join("dir2")).unwrap();
    fs::rename(root.path().join("dir1/a.txt"), root.path().join("dir2/a.txt")).unwrap();
    fs::rename(root.path().join("dir1/b.txt"), root.path().join("dir2/b.txt")).unwrap();
    fs::remove_dir(root.path().join("dir1")).unwrap();
    fs::rename(root.path().join("top.txt"), root.path().join("renamed.txt")).unwrap();
    let after = out.path().join("after.hashes");
    snapshot(root.path(), &after);

    let script = out.path().join("moves.sh");
    let (console, written) = compare(&before, Some(&after), &script);
    assert_eq!(written.as_deref(), Some(script.as_path()));

    let text = fs::read_to_string(&script).unwrap();
    assert!(text.starts_with("#!/bin/sh\n# Generated by treesum on "));
    let body: Vec<&str> = text.lines().skip(2).collect();
    assert_eq!(
        body,
        vec![
            "",
            "# Commands to execute in console:",
            "",
            "# mkdir statements.",
            "mkdir -pv 'dir2'",
            "",
            "# mv statements.",
            "mv -v './top.txt' './renamed.txt'",
            "mv -v 'dir1/a.txt' 'dir2/a.txt'",
            "mv -v 'dir1/b.txt' 'dir2/b.txt'",
            "",
            "# Directories possibly empty from now. Please check.",
            "#rmdir -v 'dir1'",
        ]
    );
    assert!(console.contains("mv -v 'dir1/a.txt' 'dir2/a.txt'"));
    assert!(!console.contains("#!/bin/sh"));
}

#[test]
fn test_replaying_the_script_reproduces_the_layout() {
    let root = tempdir().unwrap();
    let out = tempdir().unwrap();
    write(root.path(), "src/one", "1");
    write(root.path(), "src/two", "2");
    let before = out.path().join("before.hashes");
    snapshot(root.path(), &before);

    fs::create_dir_all(root.path().join("dst/nested")).unwrap();
    fs::rename(root.path().join("src/one"), root.path().join("dst/nested/one")).unwrap();
    fs::rename(root.path().join("src/two"), root.path().join("dst/two")).unwrap();
    let after = out.path().join("after.hashes");
    snapshot(root.path(), &after);

    let script = out.path().join("moves.sh");
    let _ = compare(&before, Some(&after), &script);
    let text = fs::read_to_string(&script).unwrap();
    assert!(text.contains("mkdir -pv 'dst'\n"));
    assert!(text.contains("mkdir -pv 'dst/nested'\n"));
    assert!(text.contains("mv -v 'src/one' 'dst/nested/one'\n"));
    assert!(text.contains("mv -v 'src/two' 'dst/two'\n"));
    assert_eq!(text.matches("#rmdir -v 'src'").count(), 1);
}

#[test]
fn test_identical_snapshots_write_no_script() {
    let root = tempdir().unwrap();
    let out = tempdir().unwrap();
    write(root.path(), "a", "a");
    write(root.path(), "b", "b");
    let left = out.path().join("l");
    let right = out.path().join("r");
    snapshot(root.path(), &left);
    snapshot(root.path(), &right);

    let script = out.path().join("moves.sh");
    let (console, written) = compare(&left, Some(&right), &script);
    assert!(written.is_none());
    assert!(!script.exists());
    assert!(console.is_empty());
}

#[test]
fn test_only_in_listing_goes_to_console() {
    let root = tempdir().unwrap();
    let out = tempdir().unwrap();
    write(root.path(), "kept", "kept");
    write(root.path(), "removed", "removed");
    let left = out.path().join("left.hashes");
    snapshot(root.path(), &left);

    fs::remove_file(root.path().join("removed")).unwrap();
    write(root.path(), "added", "added");
    let right = out.path().join("right.hashes");
    snapshot(root.path(), &right);

    let script = out.path().join("moves.sh");
    let (console, written) = compare(&left, Some(&right), &script);
    assert!(written.is_none());
    assert!(console.contains(&format!(
        "# Those files only exist in {}\n./removed\n",
        left.display()
    )));
    assert!(console.contains(&format!(
        "# Those files only exist in {}\n./added\n",
        right.display()
    )));
}

#[test]
fn test_duplicates_within_one_tree() {
    let root = tempdir().unwrap();
    let out = tempdir().unwrap();
    write(root.path(), "x/copy", "same bytes");
    write(root.path(), "a/orig", "same bytes");
    write(root.path(), "unique", "different");
    let manifest = out.path().join("m.hashes");
    snapshot(root.path(), &manifest);

    let script = out.path().join("dups.sh");
    let (console, written) = compare(&manifest, None, &script);
    assert!(written.is_some());

    let text = fs::read_to_string(&script).unwrap();
    assert!(text.contains(
        "# Those files are repeated. You can remove one or many of them if you wish:\n\
         # (Note: if the inode is the same, there is no space wasted)\n"
    ));
    // md5("same bytes")
    let digest = treesum::scanner::Algorithm::Md5.digest_bytes(b"same bytes");
    assert!(text.contains(&format!("# Key: {digest} - Size: 10\n# rm 'a/orig' # inode: ")));
    assert!(text.contains("# rm 'x/copy' # inode: "));
    assert!(!text.contains("unique"));
    assert!(!console.contains("Those files only exist"));
}

#[test]
fn test_hard_links_share_inode_in_report() {
    let root = tempdir().unwrap();
    let out = tempdir().unwrap();
    write(root.path(), "a", "linked content");
    fs::hard_link(root.path().join("a"), root.path().join("b")).unwrap();
    let manifest = out.path().join("m.hashes");
    snapshot(root.path(), &manifest);

    let script = out.path().join("dups.sh");
    let _ = compare(&manifest, None, &script);
    let text = fs::read_to_string(&script).unwrap();
    let inodes: Vec<&str> = text
        .lines()
        .filter(|l| l.starts_with("# rm "))
        .filter_map(|l| l.rsplit("# inode: ").next())
        .collect();
    assert_eq!(inodes.len(), 2);
    assert_eq!(inodes[0], inodes[1]);
}

#[test]
fn test_manifest_compared_with_itself() {
    let root = tempdir().unwrap();
    let out = tempdir().unwrap();
    write(root.path(), "a.txt", "hello");
    write(root.path(), "b.txt", "hello");
    write(root.path(), "c.txt", "something else");
    let manifest = out.path().join("m.hashes");
    snapshot(root.path(), &manifest);

    let script = out.path().join("self.sh");
    let (console, written) = compare(&manifest, Some(&manifest), &script);
    assert_eq!(written.as_deref(), Some(script.as_path()));
    assert!(!console.contains("Those files only exist"));

    let text = fs::read_to_string(&script).unwrap();
    assert!(!text.contains("mv -v"));
    assert!(!text.contains("mkdir -pv"));
    let digest = treesum::scanner::Algorithm::Md5.digest_bytes(b"hello");
    assert_eq!(text.matches("# Key: ").count(), 1);
    assert!(text.contains(&format!("# Key: {digest} - Size: 5\n")));
    let removals: Vec<&str> = text.lines().filter(|l| l.starts_with("# rm ")).collect();
    assert_eq!(removals.len(), 2);
    assert!(removals[0].starts_with("# rm './a.txt' # inode: "));
    assert!(removals[1].starts_with("# rm './b.txt' # inode: "));
}

#[test]
fn test_update_after_move_is_replayed() {
    let root = tempdir().unwrap();
    let out = tempdir().unwrap();
    write(root.path(), "inbox/report.pdf", "quarterly numbers");
    write(root.path(), "notes.txt", "stays put");
    let before = out.path().join("before.hashes");
    snapshot(root.path(), &before);

    let after = out.path().join("after.hashes");
    fs::copy(&before, &after).unwrap();
    fs::create_dir_all(root.path().join("archive/2024")).unwrap();
    fs::rename(
        root.path().join("inbox/report.pdf"),
        root.path().join("archive/2024/report.pdf"),
    )
    .unwrap();
    let summary = ManifestGenerator::new(GenerateConfig::new(RunMode::Update))
        .run(root.path(), &after)
        .unwrap();
    assert_eq!(summary.files_discovered, 2);

    let script = out.path().join("moves.sh");
    let (console, written) = compare(&before, Some(&after), &script);
    assert!(written.is_some());
    assert!(!console.contains("Those files only exist"));

    let text = fs::read_to_string(&script).unwrap();
    assert!(text.contains("mkdir -pv 'archive/2024'\n"));
    assert!(text.contains("mv -v 'inbox/report.pdf' 'archive/2024/report.pdf'\n"));
    assert!(text.contains("#rmdir -v 'inbox'\n"));
    assert!(!text.contains("notes.txt"));
}
