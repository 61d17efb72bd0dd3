//! Lexical allow-list check for filesystem paths.
//!
//! The check is purely syntactic: paths are normalized as strings and
//! compared component by component. Nothing touches the filesystem, so a
//! symlink inside an allowed directory can still point outside of it.
//! Callers open the path returned by [`AllowList::resolve`] so the
//! filesystem sees exactly the components that were checked.

use std::path::PathBuf;

/// Immutable set of directory prefixes under which access is permitted.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    prefixes: Vec<NormalizedPath>,
}

impl AllowList {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let prefixes = paths
            .into_iter()
            .map(|p| NormalizedPath::parse(p.as_ref()))
            .filter(|p| !p.is_empty())
            .collect();
        Self { prefixes }
    }

    pub fn is_allowed(&self, candidate: &str) -> bool {
        let candidate = NormalizedPath::parse(candidate);
        if candidate.is_empty() {
            return false;
        }
        self.prefixes
            .iter()
            .any(|prefix| candidate.starts_with(prefix))
    }

    /// Normalized form of `candidate` when it lies under an allowed prefix.
    pub fn resolve(&self, candidate: &str) -> Option<PathBuf> {
        self.is_allowed(candidate)
            .then(|| PathBuf::from(normalize(candidate)))
    }

    pub fn prefixes(&self) -> impl Iterator<Item = String> + '_ {
        self.prefixes.iter().map(NormalizedPath::to_string)
    }
}

/// Normalize a path string: unify separators, drop empty and `.` segments,
/// resolve `..` without climbing above the root.
pub fn normalize(path: &str) -> String {
    NormalizedPath::parse(path).to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct NormalizedPath {
    root: Root,
    segments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Root {
    Relative,
    Absolute,
    /// Drive prefix such as `E:`; `absolute` is set for `E:\...`.
    Drive { letter: String, absolute: bool },
}

impl NormalizedPath {
    fn parse(raw: &str) -> Self {
        let unified = raw.trim().replace('\\', "/");
        let mut rest = unified.as_str();

        let root = match drive_prefix(rest) {
            Some(letter) => {
                rest = &rest[letter.len()..];
                let absolute = rest.starts_with('/');
                Root::Drive {
                    letter: letter.to_owned(),
                    absolute,
                }
            }
            None if rest.starts_with('/') => Root::Absolute,
            None => Root::Relative,
        };

        let mut segments: Vec<String> = Vec::new();
        for part in rest.split('/') {
            match part {
                "" | "." => {}
                ".." => {
                    let can_pop = segments.last().is_some_and(|s| s != "..");
                    if can_pop {
                        segments.pop();
                    } else if root == Root::Relative {
                        segments.push("..".to_owned());
                    }
                }
                other => segments.push(other.to_owned()),
            }
        }

        Self { root, segments }
    }

    fn is_empty(&self) -> bool {
        self.root == Root::Relative && self.segments.is_empty()
    }

    fn starts_with(&self, prefix: &NormalizedPath) -> bool {
        self.root == prefix.root
            && self.segments.len() >= prefix.segments.len()
            && self
                .segments
                .iter()
                .zip(&prefix.segments)
                .all(|(a, b)| a == b)
    }
}

impl std::fmt::Display for NormalizedPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.root {
            Root::Relative => {}
            Root::Absolute => f.write_str("/")?,
            Root::Drive { letter, absolute } => {
                f.write_str(letter)?;
                if *absolute {
                    f.write_str("/")?;
                }
            }
        }
        if self.root == Root::Relative && self.segments.is_empty() {
            return f.write_str(".");
        }
        f.write_str(&self.segments.join("/"))
    }
}

fn drive_prefix(path: &str) -> Option<&str> {
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        Some(&path[..2])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_paths_are_checked_by_component() {
        let guard = AllowList::new([r"E:\temp\root"]);
        assert!(guard.is_allowed(r"E:\temp\root"));
        assert!(guard.is_allowed(r"E:\temp\root\sub"));
        assert!(guard.is_allowed("E:/temp/root/sub/deeper"));
        assert!(!guard.is_allowed(r"E:\temp\rootother"));
        assert!(!guard.is_allowed(r"E:\other"));
        assert!(!guard.is_allowed(r"F:\temp\root\sub"));
    }

    #[test]
    fn dot_dot_cannot_escape_the_prefix() {
        let guard = AllowList::new(["/data/trials"]);
        assert!(guard.is_allowed("/data/trials/a/../b"));
        assert!(!guard.is_allowed("/data/trials/../secrets"));
        assert!(!guard.is_allowed("/data/trials/../../../etc/passwd"));
        assert!(guard.is_allowed("/data//trials/./x/"));
    }

    #[test]
    fn empty_candidates_are_rejected() {
        let guard = AllowList::new(["/data"]);
        assert!(!guard.is_allowed(""));
        assert!(!guard.is_allowed("   "));
    }

    #[test]
    fn normalize_unifies_separators_and_resolves_dots() {
        assert_eq!(normalize(r"E:\a\.\b\..\c\"), "E:/a/c");
        assert_eq!(normalize("/a//b/../../.."), "/");
        assert_eq!(normalize("a/../../b"), "../b");
        assert_eq!(normalize("./"), ".");
    }

    #[test]
    fn resolve_returns_the_checked_path() {
        let guard = AllowList::new(["/srv/data"]);
        assert_eq!(
            guard.resolve(r"/srv/data/a\b\..\c"),
            Some(PathBuf::from("/srv/data/a/c"))
        );
        assert_eq!(
            guard.resolve("/srv/data/./x//"),
            Some(PathBuf::from("/srv/data/x"))
        );
        assert_eq!(guard.resolve(r"/srv/data\..\..\etc"), None);
        assert_eq!(guard.resolve(""), None);
    }

    #[test]
    fn non_ascii_segments_are_compared_exactly() {
        let guard = AllowList::new([r"E:\temp\氨氯地平-demo"]);
        assert!(guard.is_allowed(r"E:\temp\氨氯地平-demo\国外试验文献调研"));
        assert!(!guard.is_allowed(r"E:\temp\氨氯地平"));
    }
}
