use std::{cmp::Ordering, fmt, ops::Deref};

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Identity of a component version, used as the graph node key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NameVersion {
    name: String,
    version: String,
}

impl NameVersion {
    /// Creates a new `NameVersion`.
    ///
    /// # Arguments
    ///
    /// * `name` - Component name, e.g. `acme.org/app`.
    /// * `version` - Component version, semantic or free form.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Component name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Component version as recorded, without normalisation.
    pub fn version(&self) -> &str {
        &self.version
    }
}

/// Versions parsing as semantic versions (optionally `v` prefixed) are
/// compared semantically, everything else falls back to string order.
fn compare_versions(a: &str, b: &str) -> Ordering {
    let parse = |v: &str| Version::parse(v.strip_prefix('v').unwrap_or(v));
    match (parse(a), parse(b)) {
        (Ok(va), Ok(vb)) => va.cmp(&vb).then_with(|| a.cmp(b)),
        _ => a.cmp(b),
    }
}

impl Ord for NameVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| compare_versions(&self.version, &other.version))
    }
}

impl PartialOrd for NameVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for NameVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

/// The path of component versions from a traversal root to the current node.
///
/// Insertion order is traversal order. An element never appears twice; a
/// second [`History::add`] of the same element is a recursion error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History(Vec<NameVersion>);

impl History {
    /// Creates an empty path, the history of a traversal root.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Checks if `nv` is part of the path.
    pub fn contains(&self, nv: &NameVersion) -> bool {
        self.0.iter().any(|e| e == nv)
    }

    /// Checks if the path starts with all elements of `prefix`.
    pub fn has_prefix(&self, prefix: &History) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Appends `nv`, failing with a recursion error of `kind` if it is
    /// already part of the path.
    pub fn add(&mut self, kind: &str, nv: NameVersion) -> Result<()> {
        if self.contains(&nv) {
            return Err(Error::recursion(kind, nv, self.clone()));
        }
        self.0.push(nv);
        Ok(())
    }

    /// Returns an extended copy for a child frame, leaving `self` untouched.
    pub fn with(&self, kind: &str, nv: NameVersion) -> Result<History> {
        let mut child = self.clone();
        child.add(kind, nv)?;
        Ok(child)
    }

    /// Strips the leading elements shared with `prefix`.
    ///
    /// # Returns
    ///
    /// The remainder of the path, starting at the first element that differs
    /// from `prefix` or after its last element.
    pub fn remove_prefix(&self, prefix: &History) -> History {
        for (i, e) in prefix.0.iter().enumerate() {
            if self.0.len() <= i || *e != self.0[i] {
                return History(self.0[i..].to_vec());
            }
        }
        History(self.0[prefix.0.len()..].to_vec())
    }

    /// Orders paths element by element, a prefix before its extensions.
    pub fn compare(&self, other: &History) -> Ordering {
        let (c, _) = self.compare2(other);
        c.cmp(&0)
    }

    /// Element-wise comparison. The flag is `true` if a mismatching element
    /// decided the result; `false` means one path is a prefix of the other
    /// and the value is the length difference.
    pub fn compare2(&self, other: &History) -> (isize, bool) {
        for (i, e) in self.0.iter().enumerate() {
            if other.0.len() <= i {
                break;
            }
            let c = e.cmp(&other.0[i]);
            if c != Ordering::Equal {
                return (c as isize, true);
            }
        }
        (self.0.len() as isize - other.0.len() as isize, false)
    }
}

impl Deref for History {
    type Target = [NameVersion];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<NameVersion>> for History {
    fn from(v: Vec<NameVersion>) -> Self {
        Self(v)
    }
}

impl fmt::Display for History {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sep = "";
        for e in &self.0 {
            write!(f, "{sep}{e}")?;
            sep = "->";
        }
        Ok(())
    }
}

/// Anything that knows the path it was reached through.
pub trait HistorySource {
    fn history(&self) -> &History;
}

/// An element reached through a history; its key is the element itself,
/// the history is the path leading to it.
pub trait HistoryElement: HistorySource {
    fn key(&self) -> &NameVersion;
}

/// Orders `a` and `b` by their paths.
pub fn compare_history_sources<T: HistorySource + ?Sized>(a: &T, b: &T) -> Ordering {
    a.history().compare(b.history())
}

/// Orders elements so that siblings sharing an ancestor path come out in
/// a reproducible order, independent of the order they were produced in.
pub fn compare_history_elements<T: HistoryElement + ?Sized>(a: &T, b: &T) -> Ordering {
    let ha = a.history();
    let hb = b.history();

    let (c, decided) = ha.compare2(hb);
    if decided {
        return c.cmp(&0);
    }
    let k = match c.cmp(&0) {
        Ordering::Less => a.key().cmp(&hb[ha.len()]),
        Ordering::Greater => ha[hb.len()].cmp(b.key()),
        Ordering::Equal => return a.key().cmp(b.key()),
    };
    if k != Ordering::Equal {
        return k;
    }
    c.cmp(&0)
}

/// Sorts elements by path, then by key, so reports list parents first.
pub fn sort_history_elements<T: HistoryElement>(elements: &mut [T]) {
    elements.sort_by(|a, b| compare_history_elements(a, b));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{find_recursion, ErrorKind};

    const KIND: &str = "component version";

    fn nv(name: &str) -> NameVersion {
        NameVersion::new(name, "1.0.0")
    }

    fn hist(names: &[&str]) -> History {
        names.iter().map(|n| nv(n)).collect::<Vec<_>>().into()
    }

    #[test]
    fn name_version_orders_semantic_versions() {
        let a = NameVersion::new("acme.org/app", "1.9.0");
        let b = NameVersion::new("acme.org/app", "1.10.0");
        assert!(a < b);

        let c = NameVersion::new("acme.org/app", "v2.0.0");
        assert!(b < c);

        let d = NameVersion::new("acme.org/app", "latest");
        let e = NameVersion::new("acme.org/app", "nightly");
        assert!(d < e);
    }

    #[test]
    fn add_is_order_sensitive() {
        let mut ab = History::new();
        ab.add(KIND, nv("a")).unwrap();
        ab.add(KIND, nv("b")).unwrap();

        let mut ba = History::new();
        ba.add(KIND, nv("b")).unwrap();
        ba.add(KIND, nv("a")).unwrap();

        assert_ne!(ab, ba);
        assert_eq!(ab.to_string(), "a:1.0.0->b:1.0.0");
    }

    #[test]
    fn add_twice_fails_with_recursion() {
        for mut h in [hist(&["a", "b"]), hist(&["b", "a"])] {
            let before = h.clone();
            let err = h.add(KIND, nv("a")).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Recursion);
            let rec = find_recursion(&err).unwrap();
            assert_eq!(rec.element(), &nv("a"));
            assert_eq!(rec.history(), &before);
            assert_eq!(h, before);
        }
    }

    #[test]
    fn with_copies() {
        let parent = hist(&["a"]);
        let left = parent.with(KIND, nv("b")).unwrap();
        let right = parent.with(KIND, nv("c")).unwrap();

        assert_eq!(parent, hist(&["a"]));
        assert_eq!(left, hist(&["a", "b"]));
        assert_eq!(right, hist(&["a", "c"]));
        assert!(left.has_prefix(&parent));
        assert!(!left.has_prefix(&right));
    }

    #[test]
    fn compare2_prefix_and_mismatch() {
        assert_eq!(hist(&["a", "b"]).compare2(&hist(&["a", "b", "c"])), (-1, false));
        assert_eq!(hist(&["a", "b", "c"]).compare2(&hist(&["a", "b"])), (1, false));
        assert_eq!(hist(&["a", "b"]).compare2(&hist(&["a", "b"])), (0, false));

        let (c, decided) = hist(&["a", "b"]).compare2(&hist(&["a", "c"]));
        assert!(c < 0);
        assert!(decided);
        assert_eq!(hist(&["a", "c"]).compare(&hist(&["a", "b", "z"])), Ordering::Greater);
    }

    #[test]
    fn remove_prefix() {
        let h = hist(&["a", "b", "c"]);
        assert_eq!(h.remove_prefix(&hist(&["a"])), hist(&["b", "c"]));
        assert_eq!(h.remove_prefix(&hist(&["a", "x"])), hist(&["b", "c"]));
        assert_eq!(h.remove_prefix(&hist(&["x"])), h);
    }

    struct Elem {
        history: History,
        key: NameVersion,
    }

    impl HistorySource for Elem {
        fn history(&self) -> &History {
            &self.history
        }
    }

    impl HistoryElement for Elem {
        fn key(&self) -> &NameVersion {
            &self.key
        }
    }

    fn elem(path: &[&str], key: &str) -> Elem {
        Elem {
            history: hist(path),
            key: nv(key),
        }
    }

    #[test]
    fn sort_is_independent_of_input_order() {
        let expected = vec!["a", "b", "d", "c", "e"];

        let mut elems = vec![
            elem(&["a", "c"], "e"),
            elem(&["a"], "c"),
            elem(&["a", "b"], "d"),
            elem(&[], "a"),
            elem(&["a"], "b"),
        ];
        sort_history_elements(&mut elems);
        let keys: Vec<_> = elems.iter().map(|e| e.key.name().to_owned()).collect();
        assert_eq!(keys, expected);

        elems.reverse();
        sort_history_elements(&mut elems);
        let keys: Vec<_> = elems.iter().map(|e| e.key.name().to_owned()).collect();
        assert_eq!(keys, expected);
    }
}
