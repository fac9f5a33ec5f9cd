use std::fs;

use clap::Parser;
use tempfile::tempdir;
use treesum::cli::Cli;
use treesum::error::ExitCode;
use treesum::manifest::Manifest;

fn run(args: &[&str]) -> anyhow::Result<ExitCode> {
    let mut argv = vec!["treesum", "-q", "--no-progress"];
    argv.extend_from_slice(args);
    treesum::run_app(Cli::try_parse_from(argv).unwrap())
}

#[test]
fn test_generate_then_update_through_cli() {
    let root = tempdir().unwrap();
    let out = tempdir().unwrap();
    fs::write(root.path().join("a"), "alpha").unwrap();
    let manifest = out.path().join("snap.hashes");
    let manifest_arg = manifest.to_str().unwrap();
    let root_arg = root.path().to_str().unwrap();

    let code = run(&["generate", manifest_arg, "--root", root_arg, "-a", "sha1"]).unwrap();
    assert_eq!(code, ExitCode::Success);
    assert_eq!(
        Manifest::load(&manifest).unwrap().algorithm.as_deref(),
        Some("sha1")
    );

    fs::write(root.path().join("b"), "beta").unwrap();
    let code = run(&["update", manifest_arg, "--root", root_arg, "-a", "sha1", "-j", "2"]).unwrap();
    assert_eq!(code, ExitCode::Success);
    assert_eq!(Manifest::load(&manifest).unwrap().len(), 2);
}

#[test]
fn test_algorithm_switch_without_yes_is_aborted() {
    let root = tempdir().unwrap();
    let out = tempdir().unwrap();
    fs::write(root.path().join("a"), "alpha").unwrap();
    let manifest = out.path().join("snap.hashes");
    let manifest_arg = manifest.to_str().unwrap();
    let root_arg = root.path().to_str().unwrap();

    run(&["generate", manifest_arg, "--root", root_arg, "-a", "md5"]).unwrap();
    let err = run(&["append", manifest_arg, "--root", root_arg, "-a", "blake3", "--yes"])
        .unwrap_err();
    assert_eq!(ExitCode::from_error(&err), ExitCode::Aborted);

    let code = run(&["update", manifest_arg, "--root", root_arg, "-a", "blake3", "--yes"]).unwrap();
    assert_eq!(code, ExitCode::Success);
    assert_eq!(
        Manifest::load(&manifest).unwrap().algorithm.as_deref(),
        Some("blake3")
    );
}

#[test]
fn test_missing_root_is_general_error() {
    let out = tempdir().unwrap();
    let manifest = out.path().join("m");
    let missing = out.path().join("does-not-exist");
    let err = run(&[
        "generate",
        manifest.to_str().unwrap(),
        "--root",
        missing.to_str().unwrap(),
    ])
    .unwrap_err();
    assert_eq!(ExitCode::from_error(&err), ExitCode::GeneralError);
    assert!(!manifest.exists());
}

#[test]
fn test_compare_missing_manifest_is_manifest_error() {
    let out = tempdir().unwrap();
    let missing = out.path().join("none.hashes");
    let script = out.path().join("s.sh");
    let err = run(&[
        "compare",
        missing.to_str().unwrap(),
        "--script",
        script.to_str().unwrap(),
    ])
    .unwrap_err();
    assert_eq!(ExitCode::from_error(&err), ExitCode::ManifestIo);
}

#[test]
fn test_config_file_sets_defaults() {
    let root = tempdir().unwrap();
    let out = tempdir().unwrap();
    fs::write(root.path().join("a"), "alpha").unwrap();
    let config = out.path().join("treesum.toml");
    fs::write(&config, "algorithm = \"sha512\"\nwrite_frequency = 1\n").unwrap();
    let manifest = out.path().join("m");

    run(&[
        "--config",
        config.to_str().unwrap(),
        "generate",
        manifest.to_str().unwrap(),
        "--root",
        root.path().to_str().unwrap(),
    ])
    .unwrap();
    assert_eq!(
        Manifest::load(&manifest).unwrap().algorithm.as_deref(),
        Some("sha512")
    );
}

#[test]
fn test_invalid_config_is_rejected() {
    let out = tempdir().unwrap();
    let config = out.path().join("bad.toml");
    fs::write(&config, "write_frequency = 0\n").unwrap();
    let root = tempdir().unwrap();

    let err = run(&[
        "--config",
        config.to_str().unwrap(),
        "generate",
        out.path().join("m").to_str().unwrap(),
        "--root",
        root.path().to_str().unwrap(),
    ])
    .unwrap_err();
    assert_eq!(ExitCode::from_error(&err), ExitCode::GeneralError);
    assert!(format!("{err:#}").contains("write_frequency"));
}
