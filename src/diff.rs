//! Tree diff between two content roots (snapshot vs snapshot, or snapshot vs live).
//!
//! Output is a lazy iterator ordered by path in component order (a directory
//! is followed by everything below it before its next sibling). Each path is
//! reported at most once. Files are compared by size and then by bytes; mtimes
//! are not trusted. A change of entry type is reported as `Modified`, and the
//! contents below an added or removed directory are reported one by one.
//!
//! `Diff` only holds the roots, so `iter()` can be called again to restart.

use anyhow::Result;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::fsops::{list_dir, read_link, same_bytes, EntryType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Added,
    Removed,
    Modified,
}

impl ChangeType {
    /// `zfs diff` marker.
    pub fn symbol(&self) -> &'static str {
        match self {
            ChangeType::Added => "+",
            ChangeType::Removed => "-",
            ChangeType::Modified => "M",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChangeType::Added => "added",
            ChangeType::Removed => "removed",
            ChangeType::Modified => "modified",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffEntry {
    pub change: ChangeType,
    /// Relative, '/'-separated.
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct Diff {
    old: PathBuf,
    new: PathBuf,
    old_exclude: Vec<String>,
    new_exclude: Vec<String>,
}

impl Diff {
    /// `exclude` lists top-level names to ignore on each side (child dataset
    /// directories and staging artifacts in live content).
    pub fn new(old: &Path, old_exclude: Vec<String>, new: &Path, new_exclude: Vec<String>) -> Self {
        Self {
            old: old.to_path_buf(),
            new: new.to_path_buf(),
            old_exclude,
            new_exclude,
        }
    }

    pub fn iter(&self) -> DiffIter {
        self.clone().into_iter()
    }

    /// Drain into a vector (tests and small trees).
    pub fn collect_all(&self) -> Result<Vec<DiffEntry>> {
        self.iter().collect()
    }
}

impl IntoIterator for Diff {
    type Item = Result<DiffEntry>;
    type IntoIter = DiffIter;

    fn into_iter(self) -> Self::IntoIter {
        DiffIter {
            diff: self,
            stack: vec![Task::Pair(String::new())],
        }
    }
}

impl IntoIterator for &Diff {
    type Item = Result<DiffEntry>;
    type IntoIter = DiffIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Old,
    New,
}

enum Task {
    /// Directory present on both sides: expand the union of names.
    Pair(String),
    /// Name seen on at least one side.
    Entry(String),
    /// Directory present on one side only: expand its names.
    Walk(Side, String),
    /// Entry present on one side only.
    One(Side, String),
}

/// Owns a copy of the roots, so it can outlive the `Diff` it came from.
pub struct DiffIter {
    diff: Diff,
    stack: Vec<Task>,
}

fn join(rel: &str, name: &str) -> String {
    if rel.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", rel, name)
    }
}

fn kind_of(path: &Path) -> Result<Option<EntryType>> {
    match fs::symlink_metadata(path) {
        Ok(md) => Ok(Some(EntryType::of(&md))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(anyhow::Error::new(e).context(format!("stat {}", path.display()))),
    }
}

impl DiffIter {
    fn root(&self, side: Side) -> &Path {
        match side {
            Side::Old => &self.diff.old,
            Side::New => &self.diff.new,
        }
    }

    fn path(&self, side: Side, rel: &str) -> PathBuf {
        if rel.is_empty() {
            self.root(side).to_path_buf()
        } else {
            self.root(side).join(rel)
        }
    }

    fn names(&self, side: Side, rel: &str) -> Result<Vec<String>> {
        let dir = self.path(side, rel);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = list_dir(&dir)?;
        if rel.is_empty() {
            let exclude = match side {
                Side::Old => &self.diff.old_exclude,
                Side::New => &self.diff.new_exclude,
            };
            names.retain(|n| !exclude.contains(n));
        }
        Ok(names)
    }

    fn push_children(&mut self, names: Vec<String>, mk: impl Fn(String) -> Task) {
        for n in names.into_iter().rev() {
            self.stack.push(mk(n));
        }
    }

    fn same_content(&self, rel: &str, ty: EntryType) -> Result<bool> {
        let a = self.path(Side::Old, rel);
        let b = self.path(Side::New, rel);
        match ty {
            EntryType::Dir => Ok(true),
            EntryType::Symlink => Ok(read_link(&a)? == read_link(&b)?),
            EntryType::File => {
                let la = fs::metadata(&a)?.len();
                let lb = fs::metadata(&b)?.len();
                if la != lb {
                    return Ok(false);
                }
                same_bytes(&a, &b)
            }
        }
    }

    fn step(&mut self, task: Task) -> Result<Option<DiffEntry>> {
        match task {
            Task::Pair(rel) => {
                let mut names = self.names(Side::Old, &rel)?;
                names.extend(self.names(Side::New, &rel)?);
                names.sort();
                names.dedup();
                self.push_children(names, |n| Task::Entry(join(&rel, &n)));
                Ok(None)
            }
            Task::Walk(side, rel) => {
                let names = self.names(side, &rel)?;
                self.push_children(names, |n| Task::One(side, join(&rel, &n)));
                Ok(None)
            }
            Task::One(side, rel) => {
                if kind_of(&self.path(side, &rel))? == Some(EntryType::Dir) {
                    self.stack.push(Task::Walk(side, rel.clone()));
                }
                let change = match side {
                    Side::Old => ChangeType::Removed,
                    Side::New => ChangeType::Added,
                };
                Ok(Some(DiffEntry { change, path: rel }))
            }
            Task::Entry(rel) => {
                let old = kind_of(&self.path(Side::Old, &rel))?;
                let new = kind_of(&self.path(Side::New, &rel))?;
                match (old, new) {
                    (None, None) => Ok(None),
                    (Some(_), None) => self.step(Task::One(Side::Old, rel)),
                    (None, Some(_)) => self.step(Task::One(Side::New, rel)),
                    (Some(a), Some(b)) if a != b => {
                        // new side's subtree is reported after the old side's
                        if b == EntryType::Dir {
                            self.stack.push(Task::Walk(Side::New, rel.clone()));
                        }
                        if a == EntryType::Dir {
                            self.stack.push(Task::Walk(Side::Old, rel.clone()));
                        }
                        Ok(Some(DiffEntry {
                            change: ChangeType::Modified,
                            path: rel,
                        }))
                    }
                    (Some(EntryType::Dir), Some(_)) => {
                        self.stack.push(Task::Pair(rel));
                        Ok(None)
                    }
                    (Some(ty), Some(_)) => {
                        if self.same_content(&rel, ty)? {
                            Ok(None)
                        } else {
                            Ok(Some(DiffEntry {
                                change: ChangeType::Modified,
                                path: rel,
                            }))
                        }
                    }
                }
            }
        }
    }
}

impl Iterator for DiffIter {
    type Item = Result<DiffEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(task) = self.stack.pop() {
            match self.step(task) {
                Ok(Some(e)) => return Some(Ok(e)),
                Ok(None) => continue,
                Err(e) => {
                    self.stack.clear();
                    return Some(Err(e));
                }
            }
        }
        None
    }
}
