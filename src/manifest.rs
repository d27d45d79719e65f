//! Test manifest model: ordered entries, the on-disk bracket format, and the
//! directory conversion and update engines built on top of it.
//!
//! A manifest is an ordered list of entries, each an ordered key/value
//! mapping that always carries a `name` key. Names are manifest-relative
//! paths with forward-slash separators; they resolve against the directory
//! the manifest was read from (or an explicit root). No two entries may
//! share a resolved path.

use std::fmt;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use glob::Pattern;
use tracing::{debug, info};

use crate::error::{ManifestError, Result};
use crate::paths;

/// Keys derived by the manifest itself, never written back to disk.
const DERIVED_KEYS: &[&str] = &["name", "path", "relpath", "here"];

/// One manifest entry: an ordered string-to-string mapping.
///
/// Insertion order is preserved and significant; setting an existing key
/// updates it in place. Entries hold a handful of keys, so lookups are a
/// linear scan over the backing vector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestEntry {
    keys: Vec<(String, String)>,
}

impl ManifestEntry {
    pub fn new(name: impl Into<String>) -> Self {
        let mut entry = Self::default();
        entry.set("name", name);
        entry
    }

    /// The test identifier, a manifest-relative forward-slash path.
    pub fn name(&self) -> &str {
        self.get("name").unwrap_or_default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.keys
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.keys.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.keys.push((key, value)),
        }
    }

    /// Iterate keys and values in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.keys.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Conversion options for [`convert`].
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    /// Glob patterns applied to file basenames; empty means every file.
    pub pattern: Vec<String>,
    /// Subdirectory names pruned from the walk entirely.
    pub ignore: Vec<String>,
    /// Base directory entry names are made relative to.
    pub relative_to: Option<PathBuf>,
}

impl ConvertOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern.push(pattern.into());
        self
    }

    pub fn with_ignore(mut self, name: impl Into<String>) -> Self {
        self.ignore.push(name.into());
        self
    }

    pub fn with_relative_to(mut self, base: impl Into<PathBuf>) -> Self {
        self.relative_to = Some(base.into());
        self
    }
}

/// An ordered collection of test entries with a resolution root.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
    /// Directory entry names resolve against when an entry carries no
    /// origin of its own.
    rootdir: Option<PathBuf>,
    /// Backing file, once read from or written to disk.
    source: Option<PathBuf>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Manifest {
            rootdir: Some(root.into()),
            ..Self::default()
        }
    }

    /// Create a manifest populated from a manifest file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut manifest = Self::new();
        manifest.read(path)?;
        Ok(manifest)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ManifestEntry> {
        self.entries.iter()
    }

    pub fn rootdir(&self) -> Option<&Path> {
        self.rootdir.as_deref()
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Append one entry, deriving its `relpath`/`path`/`here` keys and
    /// enforcing uniqueness by resolved path.
    pub fn add(&mut self, mut entry: ManifestEntry) -> Result<()> {
        if entry.name().is_empty() {
            return Err(ManifestError::Path("manifest entry has no name".to_string()));
        }
        if entry.get("here").is_none() {
            if let Some(root) = &self.rootdir {
                entry.set("here", paths::normalize(root));
            }
        }
        entry.set("relpath", entry.name().to_string());
        let resolved = self.resolve(&entry);
        entry.set("path", paths::normalize(&resolved));
        if self.entries.iter().any(|e| self.resolve(e) == resolved) {
            return Err(ManifestError::DuplicateEntry(resolved));
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Resolve an entry's name against its own origin: the directory of the
    /// manifest it was read from, else this manifest's root.
    pub fn resolve(&self, entry: &ManifestEntry) -> PathBuf {
        let name = paths::from_slash(entry.name());
        match entry.get("here") {
            Some(here) => Path::new(here).join(name),
            None => match &self.rootdir {
                Some(root) => root.join(name),
                None => name,
            },
        }
    }

    /// Read a manifest file and append its entries.
    ///
    /// The format is line-oriented: `[<name>]` section headers, optional
    /// `key = value` lines beneath a header, `#`/`;` comments, blank lines.
    /// Anything else fails with a line-attributed syntax error.
    pub fn read<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let here = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        if self.rootdir.is_none() {
            self.rootdir = Some(here.clone());
        }
        if self.source.is_none() {
            self.source = Some(path.to_path_buf());
        }

        let before = self.entries.len();
        let mut current = None;
        let mut lineno = 0;
        for line in reader.lines() {
            lineno += 1;
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                let name = name.trim();
                if name.is_empty() {
                    return Err(ManifestError::ManifestSyntax {
                        line: lineno,
                        message: "empty section header".to_string(),
                    });
                }
                let mut entry = ManifestEntry::new(name);
                entry.set("here", paths::normalize(&here));
                self.add(entry).map_err(|err| match err {
                    ManifestError::DuplicateEntry(path) => ManifestError::ManifestSyntax {
                        line: lineno,
                        message: format!("duplicate manifest entry: {}", path.display()),
                    },
                    other => other,
                })?;
                current = Some(self.entries.len() - 1);
            } else if let Some((key, value)) = line.split_once('=') {
                let index = current.ok_or_else(|| ManifestError::ManifestSyntax {
                    line: lineno,
                    message: "key/value pair outside of a section".to_string(),
                })?;
                self.entries[index].set(key.trim(), value.trim());
            } else {
                return Err(ManifestError::ManifestSyntax {
                    line: lineno,
                    message: format!("expected section header or key = value, got {line:?}"),
                });
            }
        }

        debug!("read {} entries from {:?}", self.entries.len() - before, path);
        Ok(())
    }

    /// Serialize to a file and make it this manifest's backing file.
    pub fn write<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.to_string())?;
        self.source = Some(path.to_path_buf());
        if self.rootdir.is_none() {
            self.rootdir = path.parent().map(Path::to_path_buf);
        }
        debug!("wrote manifest {:?}", path);
        Ok(())
    }

    /// Project `key` over entries matching every `(key, value)` filter
    /// exactly, in manifest order. Entries lacking `key` are skipped.
    pub fn get(&self, key: &str, filters: &[(&str, &str)]) -> Vec<String> {
        self.matching(filters)
            .filter_map(|e| e.get(key))
            .map(str::to_string)
            .collect()
    }

    /// Entries whose resolved path does not currently exist on disk, in
    /// manifest order.
    pub fn missing(&self) -> Vec<&ManifestEntry> {
        self.entries
            .iter()
            .filter(|e| !self.resolve(e).exists())
            .collect()
    }

    /// Copy each matching entry's file from `source_dir` into this
    /// manifest's directory, overwriting byte for byte and creating parent
    /// directories as needed. No filters means every entry.
    ///
    /// A missing source file fails with [`ManifestError::SourceNotFound`].
    /// Copies are not transactional: the first failure aborts the rest of
    /// the call and files already copied stay in place.
    pub fn update<P: AsRef<Path>>(&self, source_dir: P, filters: &[(&str, &str)]) -> Result<()> {
        let source_dir = source_dir.as_ref();
        let mut copied = 0;
        for entry in self.matching(filters) {
            let source = source_dir.join(paths::from_slash(entry.name()));
            if !source.is_file() {
                return Err(ManifestError::SourceNotFound(source));
            }
            let destination = self.resolve(entry);
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&source, &destination)?;
            debug!("copied {:?} -> {:?}", source, destination);
            copied += 1;
        }
        info!("updated {} files from {:?}", copied, source_dir);
        Ok(())
    }

    fn matching<'a>(
        &'a self,
        filters: &'a [(&'a str, &'a str)],
    ) -> impl Iterator<Item = &'a ManifestEntry> {
        self.entries
            .iter()
            .filter(move |e| filters.iter().all(|&(k, v)| e.get(k) == Some(v)))
    }
}

impl fmt::Display for Manifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "[{}]", entry.name())?;
            for (key, value) in entry.iter() {
                if DERIVED_KEYS.contains(&key) {
                    continue;
                }
                writeln!(f, "{key} = {value}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Manifest {
    type Item = &'a ManifestEntry;
    type IntoIter = std::slice::Iter<'a, ManifestEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Walk each directory and derive one manifest entry per discovered file.
///
/// At each level the direct files are emitted in lexicographic order, then
/// the subdirectories are recursed in lexicographic order, so identical
/// trees always produce identical manifests. Subdirectories named in
/// `ignore` are pruned entirely; glob patterns filter leaf file basenames
/// only and never affect traversal. Entry names are relative to
/// `relative_to` when given, else the joined directory/file path as passed.
pub fn convert<P: AsRef<Path>>(directories: &[P], options: &ConvertOptions) -> Result<Manifest> {
    let patterns = options
        .pattern
        .iter()
        .map(|p| Pattern::new(p))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut manifest = Manifest::new();
    for directory in directories {
        let directory = directory.as_ref();
        if !directory.is_dir() {
            return Err(ManifestError::Path(format!(
                "not a directory: {}",
                directory.display()
            )));
        }
        convert_level(directory, options, &patterns, &mut manifest)?;
    }

    info!("conversion complete: {} entries", manifest.len());
    Ok(manifest)
}

fn convert_level(
    directory: &Path,
    options: &ConvertOptions,
    patterns: &[Pattern],
    manifest: &mut Manifest,
) -> Result<()> {
    let mut files = Vec::new();
    let mut subdirectories = Vec::new();
    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if file_type.is_dir() {
            if !options.ignore.iter().any(|i| *i == name) {
                subdirectories.push(entry.path());
            }
        } else if file_type.is_file() {
            files.push((name, entry.path()));
        }
    }
    files.sort();
    subdirectories.sort();

    for (basename, path) in files {
        if !patterns.is_empty() && !patterns.iter().any(|p| p.matches(&basename)) {
            continue;
        }
        let name = match &options.relative_to {
            Some(base) => paths::normalize(paths::relative_to(&path, base)),
            None => paths::normalize(&path),
        };
        debug!("discovered test file: {name}");
        manifest.add(ManifestEntry::new(name))?;
    }

    for subdirectory in subdirectories {
        convert_level(&subdirectory, options, patterns, manifest)?;
    }
    Ok(())
}

/// Write a manifest named `filename` into every directory level that has
/// direct file children.
///
/// Each written manifest lists only that level's own files, by basename; a
/// subdirectory's files live in the subdirectory's manifest, never the
/// parent's. The manifest file itself is excluded from the listing, so
/// repopulating a tree is idempotent. Directories named in `ignore` get no
/// manifest and are not descended into.
pub fn populate_directory_manifests<P: AsRef<Path>>(
    directories: &[P],
    filename: &str,
    ignore: &[String],
) -> Result<()> {
    for directory in directories {
        populate_one(directory.as_ref(), filename, ignore)?;
    }
    Ok(())
}

fn populate_one(directory: &Path, filename: &str, ignore: &[String]) -> Result<()> {
    let mut files = Vec::new();
    let mut subdirectories = Vec::new();
    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if file_type.is_dir() {
            if !ignore.iter().any(|i| *i == name) {
                subdirectories.push(entry.path());
            }
        } else if file_type.is_file() && name != filename {
            files.push(name);
        }
    }
    files.sort();
    subdirectories.sort();

    if !files.is_empty() {
        let mut manifest = Manifest::with_root(directory);
        for file in files {
            manifest.add(ManifestEntry::new(file))?;
        }
        manifest.write(directory.join(filename))?;
    }

    for subdirectory in subdirectories {
        populate_one(&subdirectory, filename, ignore)?;
    }
    Ok(())
}
