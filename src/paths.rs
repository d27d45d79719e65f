//! Path helpers for manifest-relative names.
//!
//! Manifest entry names always use forward-slash separators, whatever the
//! host's convention is. These helpers convert between native paths and that
//! representation, and compute base-relative paths lexically.

use std::path::{Component, Path, PathBuf};

/// Render a path with forward-slash separators.
pub fn normalize<P: AsRef<Path>>(path: P) -> String {
    let s = path.as_ref().to_string_lossy();
    if cfg!(windows) {
        s.replace('\\', "/")
    } else {
        s.into_owned()
    }
}

/// Turn a forward-slash manifest name back into a native path.
pub fn from_slash(name: &str) -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(name.replace('/', "\\"))
    } else {
        PathBuf::from(name)
    }
}

/// Compute `path` relative to `base`, lexically.
///
/// The shared prefix is stripped component by component; every remaining
/// component of `base` becomes a `..` ascent. No filesystem access is made,
/// so both paths should be absolute or share the same anchor.
pub fn relative_to<P: AsRef<Path>, B: AsRef<Path>>(path: P, base: B) -> PathBuf {
    let mut path = path.as_ref().components().peekable();
    let mut base = base.as_ref().components().peekable();

    while let (Some(p), Some(b)) = (path.peek(), base.peek()) {
        if p != b {
            break;
        }
        path.next();
        base.next();
    }

    let mut relative = PathBuf::new();
    for component in base {
        match component {
            Component::CurDir => {}
            _ => relative.push(".."),
        }
    }
    for component in path {
        relative.push(component.as_os_str());
    }
    if relative.as_os_str().is_empty() {
        relative.push(".");
    }
    relative
}
