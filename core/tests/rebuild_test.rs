mod support;

use bro_core::{Bro, BroError, SelfBuild};
use filetime::{set_file_mtime, FileTime};
use std::path::Path;
use std::time::{Duration, SystemTime};

use support::{context, RecordingLauncher};

struct Fixture {
    _dir: tempfile::TempDir,
    source: std::path::PathBuf,
    header: std::path::PathBuf,
    binary: std::path::PathBuf,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("bro.rs");
    let header = dir.path().join("bro_core.rs");
    let binary = dir.path().join("bro");
    for path in [&source, &header, &binary] {
        std::fs::write(path, "x").unwrap();
    }

    let base = SystemTime::now() - Duration::from_secs(1000);
    set_file_mtime(&source, FileTime::from_system_time(base)).unwrap();
    set_file_mtime(&header, FileTime::from_system_time(base)).unwrap();
    set_file_mtime(&binary, FileTime::from_system_time(base + Duration::from_secs(10))).unwrap();

    Fixture {
        _dir: dir,
        source,
        header,
        binary,
    }
}

fn touch(path: &Path) {
    let later = SystemTime::now() - Duration::from_secs(500);
    set_file_mtime(path, FileTime::from_system_time(later)).unwrap();
}

fn bro(fx: &Fixture, flags: &[&str]) -> Bro {
    let binary = fx.binary.display().to_string();
    let args = std::iter::once(binary.as_str()).chain(flags.iter().copied());
    Bro::new(args).with_self_build(SelfBuild::new(&fx.source, &fx.binary).with_header(&fx.header))
}

#[test]
fn test_fresh_when_binary_is_newest() {
    let fx = fixture();
    assert!(bro(&fx, &[]).is_fresh());
}

#[test]
fn test_stale_source_or_header() {
    let fx = fixture();
    touch(&fx.source);
    assert!(!bro(&fx, &[]).is_fresh());

    let fx = fixture();
    touch(&fx.header);
    assert!(!bro(&fx, &[]).is_fresh());
}

#[test]
fn test_missing_header_counts_as_fresh() {
    let fx = fixture();
    std::fs::remove_file(&fx.header).unwrap();
    assert!(bro(&fx, &[]).is_fresh());
}

#[test]
fn test_fresh_override() {
    let fx = fixture();
    assert!(!bro(&fx, &["~FRESH=false"]).is_fresh());

    touch(&fx.source);
    assert!(bro(&fx, &["~FRESH"]).is_fresh());
}

#[test]
fn test_rebuild_backs_up_compiles_and_reruns() {
    let fx = fixture();
    let launcher = RecordingLauncher::new();
    let bro = bro(&fx, &["cc=clang", "app", "~RMOLD=false"]).with_context(context(&launcher));

    assert_eq!(bro.rebuild().unwrap(), 0);

    let backup = bro.self_build().backup();
    assert!(backup.exists());

    let lines = launcher.lines();
    assert_eq!(lines.len(), 2);
    assert_eq!(
        lines[0],
        format!(
            "rustc --edition 2021 -O {} -o {}",
            fx.source.display(),
            fx.binary.display()
        )
    );
    assert!(lines[1].starts_with(&fx.binary.display().to_string()));
    assert!(lines[1].contains(" cc=clang"));
    assert!(lines[1].contains(" app=true"));
    assert!(!lines[1].contains("~RMOLD"));
}

#[test]
fn test_rebuild_removes_backup_when_asked() {
    let fx = fixture();
    let launcher = RecordingLauncher::new();
    let bro = bro(&fx, &["~RMOLD"]).with_context(context(&launcher));

    assert_eq!(bro.rebuild().unwrap(), 0);
    assert!(!bro.self_build().backup().exists());
}

#[test]
fn test_failed_compile_keeps_backup_and_skips_rerun() {
    let fx = fixture();
    let launcher = RecordingLauncher::new();
    let bro = bro(&fx, &["rustc=fail-rustc", "~RMOLD"]).with_context(context(&launcher));

    assert!(matches!(bro.rebuild(), Err(BroError::Rebuild(1))));
    assert!(bro.self_build().backup().exists());
    assert_eq!(launcher.lines().len(), 1);
}

#[test]
fn test_missing_binary_fails_backup() {
    let fx = fixture();
    std::fs::remove_file(&fx.binary).unwrap();
    let launcher = RecordingLauncher::new();
    let bro = bro(&fx, &[]).with_context(context(&launcher));

    assert!(matches!(bro.rebuild(), Err(BroError::MissingFile(_))));
    assert!(launcher.lines().is_empty());
}
