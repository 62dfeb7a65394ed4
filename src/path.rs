//! VfsPath canonicalization and the (dir, name, ext) staging interner.

use std::collections::HashMap;

/// A canonicalized, slash-delimited, leading-slash path: `/a/b/c.ext`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VfsPath(String);

impl VfsPath {
    /// Canonicalize an arbitrary path string: backslashes become slashes, a
    /// leading slash is added if missing. Idempotent.
    pub fn canonicalize(raw: &str) -> Self {
        let slashed = raw.replace('\\', "/");
        let with_root = if slashed.starts_with('/') {
            slashed
        } else {
            format!("/{slashed}")
        };
        VfsPath(with_root)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split into (dir, name, ext) per §4.3: dir includes the trailing slash,
    /// ext includes the leading dot. Paths without a `/` get dir `/`; paths
    /// without a `.` in the basename get an empty ext.
    pub fn split(&self) -> (String, String, String) {
        split_path(&self.0)
    }

    pub fn join(dir: &str, name: &str, ext: &str) -> Self {
        VfsPath(format!("{dir}{name}{ext}"))
    }
}

impl std::fmt::Display for VfsPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn split_path(path: &str) -> (String, String, String) {
    let last_slash = path.rfind('/');
    let (dir, basename) = match last_slash {
        Some(i) => (path[..=i].to_string(), &path[i + 1..]),
        None => ("/".to_string(), path),
    };
    // Last dot within the basename, excluding a leading dot (dotfiles have no ext).
    let search_from = basename.len().min(1);
    let dot = basename[search_from..].rfind('.').map(|i| i + search_from);
    match dot {
        Some(i) => (dir, basename[..i].to_string(), basename[i..].to_string()),
        None => (dir, basename.to_string(), String::new()),
    }
}

/// Assigns 0-based ids to strings in first-seen insertion order, for
/// deterministic string-table serialization during a write.
#[derive(Debug, Default)]
pub struct StringInterner {
    order: Vec<String>,
    ids: HashMap<String, u32>,
}

impl StringInterner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, s: &str) -> u32 {
        if let Some(&id) = self.ids.get(s) {
            return id;
        }
        let id = self.order.len() as u32;
        self.order.push(s.to_string());
        self.ids.insert(s.to_string(), id);
        id
    }

    /// Strings in insertion order, suitable for serializing a string table.
    pub fn ordered(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Read-side counterpart: materialize a full path from table ids.
pub fn restore_path(dirs: &[String], names: &[String], exts: &[String], dir_id: u32, name_id: u32, ext_id: u32) -> String {
    format!(
        "{}{}{}",
        dirs[dir_id as usize], names[name_id as usize], exts[ext_id as usize]
    )
}
