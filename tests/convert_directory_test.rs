//! Integration tests for directory-to-manifest conversion, in-place
//! manifest population, and manifest update/reconciliation.

use std::fs;
use std::path::Path;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use testmanifest::{
    convert, populate_directory_manifests, ConvertOptions, Manifest, ManifestError,
    ManifestEntry,
};

/// Stub out a directory with files in it: `bar`, `fleem`, `foo`, and
/// `subdir/subfile`.
fn create_stub() -> TempDir {
    let stub = TempDir::new().unwrap();
    for name in ["foo", "bar", "fleem"] {
        fs::write(stub.path().join(name), name).unwrap();
    }
    let subdir = stub.path().join("subdir");
    fs::create_dir(&subdir).unwrap();
    fs::write(subdir.join("subfile"), "baz").unwrap();
    stub
}

fn sorted_listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn names(manifest: &Manifest) -> Vec<String> {
    manifest.get("name", &[])
}

#[test]
fn test_directory_to_manifest() {
    let stub = create_stub();
    let manifest = convert(&[stub.path()], &ConvertOptions::new()).unwrap();
    let root = stub.path().display();
    assert_eq!(
        manifest.to_string(),
        format!("[{root}/bar]\n\n[{root}/fleem]\n\n[{root}/foo]\n\n[{root}/subdir/subfile]\n\n")
    );
}

#[test]
fn test_files_emitted_before_subdirectories() {
    // a level's own files come first even when a subdirectory sorts
    // ahead of them by name
    let stub = TempDir::new().unwrap();
    fs::write(stub.path().join("zfile"), "z").unwrap();
    let adir = stub.path().join("adir");
    fs::create_dir(&adir).unwrap();
    fs::write(adir.join("inner"), "i").unwrap();

    let manifest = convert(
        &[stub.path()],
        &ConvertOptions::new().with_relative_to(stub.path()),
    )
    .unwrap();
    assert_eq!(names(&manifest), vec!["zfile", "adir/inner"]);
}

#[test]
fn test_convert_nonexistent_directory() {
    let result = convert(&[Path::new("/nonexistent/path")], &ConvertOptions::new());
    assert!(matches!(result, Err(ManifestError::Path(_))));
}

#[test]
fn test_pattern() {
    let stub = create_stub();

    let options = ConvertOptions::new()
        .with_pattern("f*")
        .with_relative_to(stub.path());
    let manifest = convert(&[stub.path()], &options).unwrap();
    assert_eq!(names(&manifest), vec!["fleem", "foo"]);

    // multiple patterns
    let options = ConvertOptions::new()
        .with_pattern("f*")
        .with_pattern("s*")
        .with_relative_to(stub.path());
    let manifest = convert(&[stub.path()], &options).unwrap();
    assert_eq!(names(&manifest), vec!["fleem", "foo", "subdir/subfile"]);
}

#[test]
fn test_pattern_filters_leaf_files_only() {
    // `subdir` does not match `*file`, but traversal ignores patterns and
    // the matching file inside it is still found.
    let stub = create_stub();
    let options = ConvertOptions::new()
        .with_pattern("*file")
        .with_relative_to(stub.path());
    let manifest = convert(&[stub.path()], &options).unwrap();
    assert_eq!(names(&manifest), vec!["subdir/subfile"]);
}

#[test]
fn test_convert_ignore_prunes_subdirectory() {
    let stub = create_stub();
    let options = ConvertOptions::new()
        .with_ignore("subdir")
        .with_relative_to(stub.path());
    let manifest = convert(&[stub.path()], &options).unwrap();
    assert_eq!(names(&manifest), vec!["bar", "fleem", "foo"]);
}

#[test]
fn test_relative_to_changes_only_names() {
    let stub = create_stub();
    let subdir = stub.path().join("subdir");
    let manifest = convert(
        &[stub.path()],
        &ConvertOptions::new().with_relative_to(&subdir),
    )
    .unwrap();
    assert_eq!(
        names(&manifest),
        vec!["../bar", "../fleem", "../foo", "subfile"]
    );
}

#[test]
fn test_populate_directory_manifests_in_place() {
    let stub = create_stub();
    populate_directory_manifests(&[stub.path()], "manifest.ini", &[]).unwrap();

    assert_eq!(
        sorted_listing(stub.path()),
        vec!["bar", "fleem", "foo", "manifest.ini", "subdir"]
    );

    // each level's manifest lists only its own files
    let parent = Manifest::from_file(stub.path().join("manifest.ini")).unwrap();
    assert_eq!(names(&parent), vec!["bar", "fleem", "foo"]);

    let child = Manifest::from_file(stub.path().join("subdir").join("manifest.ini")).unwrap();
    assert_eq!(names(&child), vec!["subfile"]);

    // parent and child entries are disjoint
    for name in names(&child) {
        assert!(!names(&parent).contains(&name));
    }
}

#[test]
fn test_populate_is_idempotent() {
    let stub = create_stub();
    populate_directory_manifests(&[stub.path()], "manifest.ini", &[]).unwrap();
    populate_directory_manifests(&[stub.path()], "manifest.ini", &[]).unwrap();

    // the manifest file itself never becomes an entry
    let parent = Manifest::from_file(stub.path().join("manifest.ini")).unwrap();
    assert_eq!(names(&parent), vec!["bar", "fleem", "foo"]);
}

#[test]
fn test_populate_ignore() {
    let stub = create_stub();
    populate_directory_manifests(&[stub.path()], "manifest.ini", &["subdir".to_string()])
        .unwrap();

    let parent = Manifest::from_file(stub.path().join("manifest.ini")).unwrap();
    assert_eq!(names(&parent), vec!["bar", "fleem", "foo"]);
    assert!(!stub.path().join("subdir").join("manifest.ini").exists());
}

#[test]
fn test_update() {
    // a directory of ten "tests"
    let tempdir = TempDir::new().unwrap();
    for i in 0..10 {
        fs::write(tempdir.path().join(i.to_string()), i.to_string()).unwrap();
    }

    // an otherwise empty directory with a manifest file
    let newtempdir = TempDir::new().unwrap();
    let manifest_file = newtempdir.path().join("manifest.ini");
    let converted = convert(
        &[tempdir.path()],
        &ConvertOptions::new().with_relative_to(tempdir.path()),
    )
    .unwrap();
    fs::write(&manifest_file, converted.to_string()).unwrap();

    let manifest = Manifest::from_file(&manifest_file).unwrap();

    // all of the tests are initially missing
    let paths: Vec<String> = (0..10).map(|i| i.to_string()).collect();
    let missing: Vec<&str> = manifest.missing().iter().map(|e| e.name()).collect();
    assert_eq!(missing, paths);

    // but then we copy one over
    assert_eq!(manifest.get("name", &[("name", "1")]), vec!["1"]);
    manifest.update(tempdir.path(), &[("name", "1")]).unwrap();
    assert_eq!(sorted_listing(newtempdir.path()), vec!["1", "manifest.ini"]);
    assert!(!manifest.missing().iter().any(|e| e.name() == "1"));

    // update that one file and copy all the tests
    fs::write(tempdir.path().join("1"), "secret door").unwrap();
    manifest.update(tempdir.path(), &[]).unwrap();
    let mut expected: Vec<String> = paths.clone();
    expected.push("manifest.ini".to_string());
    expected.sort();
    assert_eq!(sorted_listing(newtempdir.path()), expected);
    assert_eq!(
        fs::read_to_string(newtempdir.path().join("1")).unwrap(),
        "secret door"
    );
    assert!(manifest.missing().is_empty());
}

#[test]
fn test_update_missing_source_fails() {
    let source = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();

    let mut manifest = Manifest::with_root(dest.path());
    manifest.add(ManifestEntry::new("nope")).unwrap();

    let err = manifest.update(source.path(), &[]).unwrap_err();
    match err {
        ManifestError::SourceNotFound(path) => {
            assert_eq!(path, source.path().join("nope"));
        }
        other => panic!("expected SourceNotFound, got {other}"),
    }
}

#[test]
fn test_update_aborts_on_first_failure() {
    // copies already made stay in place; the failing entry aborts the rest
    let source = TempDir::new().unwrap();
    fs::write(source.path().join("a"), "a").unwrap();
    fs::write(source.path().join("c"), "c").unwrap();
    let dest = TempDir::new().unwrap();

    let mut manifest = Manifest::with_root(dest.path());
    for name in ["a", "b", "c"] {
        manifest.add(ManifestEntry::new(name)).unwrap();
    }

    assert!(manifest.update(source.path(), &[]).is_err());
    assert!(dest.path().join("a").exists());
    assert!(!dest.path().join("c").exists());
}

#[test]
fn test_manifest_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("manifest.ini");
    fs::write(
        &path,
        "# comment\n[foo]\nexpected = fail\n\n[subdir/subfile]\n\n",
    )
    .unwrap();

    let mut manifest = Manifest::from_file(&path).unwrap();
    assert_eq!(names(&manifest), vec!["foo", "subdir/subfile"]);
    assert_eq!(manifest.get("expected", &[]), vec!["fail"]);
    assert_eq!(manifest.rootdir(), Some(dir.path()));

    // serialization preserves order and explicit keys, drops derived ones
    let rewritten = dir.path().join("rewritten.ini");
    manifest.write(&rewritten).unwrap();
    let reread = Manifest::from_file(&rewritten).unwrap();
    assert_eq!(names(&reread), names(&manifest));
    assert_eq!(reread.get("expected", &[("name", "foo")]), vec!["fail"]);
}

#[test]
fn test_manifest_syntax_errors() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("manifest.ini");

    fs::write(&path, "[foo]\n\nwhat is this\n").unwrap();
    match Manifest::from_file(&path).unwrap_err() {
        ManifestError::ManifestSyntax { line, .. } => assert_eq!(line, 3),
        other => panic!("expected a syntax error, got {other}"),
    }

    fs::write(&path, "expected = fail\n").unwrap();
    match Manifest::from_file(&path).unwrap_err() {
        ManifestError::ManifestSyntax { line, .. } => assert_eq!(line, 1),
        other => panic!("expected a syntax error, got {other}"),
    }

    // a duplicate section is attributed to its line like any other
    // read-time failure
    fs::write(&path, "[foo]\n\n[foo]\n").unwrap();
    match Manifest::from_file(&path).unwrap_err() {
        ManifestError::ManifestSyntax { line, message } => {
            assert_eq!(line, 3);
            assert!(message.contains("duplicate"));
        }
        other => panic!("expected a syntax error, got {other}"),
    }
}
