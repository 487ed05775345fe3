// Directory abstraction targeted by `ApplySink`, plus an in-memory
// implementation keyed by normalised DN.

use std::collections::{BTreeMap, HashMap};

use crate::dn::{self, DnError};
use crate::engine;
use crate::entry::{Entry, Modification};

/// Errors a directory reports for a single operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    #[error("operation not allowed on non-leaf: {0}")]
    NotAllowedOnNonLeaf(String),
    #[error("no such object: {0}")]
    NoSuchObject(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error(transparent)]
    InvalidDn(#[from] DnError),
    #[error("{0}")]
    Other(String),
}

/// A writable directory.
pub trait Directory {
    /// Create `entry` at its DN.
    fn add(&mut self, entry: &Entry) -> Result<(), DirectoryError>;

    /// Remove the leaf entry at `dn`.
    fn delete(&mut self, dn: &str) -> Result<(), DirectoryError>;

    /// Apply attribute directives to the entry at `dn`.
    fn modify(&mut self, dn: &str, mods: &[Modification]) -> Result<(), DirectoryError>;

    /// Give the entry at `dn` a new leading RDN and optionally a new parent.
    /// `Some("")` moves the entry to the root.
    fn rename(
        &mut self,
        dn: &str,
        new_rdn: &str,
        new_superior: Option<&str>,
        delete_old_rdn: bool,
    ) -> Result<(), DirectoryError>;
}

// ---------------------------------------------------------------------------
// MemoryDirectory
// ---------------------------------------------------------------------------

/// A directory held in memory.
///
/// Parents must exist before children are added, except for entries
/// directly below the root. Only leaves may be deleted or renamed.
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    entries: BTreeMap<String, Entry>,
    /// Number of entries directly below each normalised DN.
    children: HashMap<String, usize>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load entries without parent checks. Later duplicates replace
    /// earlier ones.
    pub fn from_entries(entries: impl IntoIterator<Item = Entry>) -> Result<Self, DnError> {
        let mut dir = Self::new();
        for entry in entries {
            dir.insert(dn::normalize(entry.dn())?, entry);
        }
        Ok(dir)
    }

    pub fn get(&self, dn: &str) -> Option<&Entry> {
        self.entries.get(&dn::normalize(dn).ok()?)
    }

    pub fn contains(&self, dn: &str) -> bool {
        self.get(dn).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in normalised-DN order.
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    /// Entries ordered so that every parent precedes its children.
    pub fn entries_top_down(&self) -> Vec<&Entry> {
        let mut out: Vec<(usize, &Entry)> = self
            .entries
            .iter()
            .map(|(key, e)| (depth(key), e))
            .collect();
        out.sort_by_key(|(d, _)| *d);
        out.into_iter().map(|(_, e)| e).collect()
    }

    fn has_children(&self, key: &str) -> bool {
        self.children.get(key).is_some_and(|&n| n > 0)
    }

    fn insert(&mut self, key: String, entry: Entry) {
        if let Some(parent) = parent_key(&key)
            && !self.entries.contains_key(&key)
        {
            *self.children.entry(parent.to_string()).or_default() += 1;
        }
        self.entries.insert(key, entry);
    }

    fn remove(&mut self, key: &str) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        if let Some(parent) = parent_key(key)
            && let Some(n) = self.children.get_mut(parent)
        {
            *n -= 1;
            if *n == 0 {
                self.children.remove(parent);
            }
        }
        Some(entry)
    }

    fn existing_key(&self, dn: &str) -> Result<String, DirectoryError> {
        let key = dn::normalize(dn)?;
        if self.entries.contains_key(&key) {
            Ok(key)
        } else {
            Err(DirectoryError::NoSuchObject(dn.to_string()))
        }
    }

    fn check_parent(&self, dn: &str) -> Result<(), DirectoryError> {
        if let Some(parent) = dn::parent(dn)
            && !self.entries.contains_key(&dn::normalize(parent)?)
        {
            return Err(DirectoryError::NoSuchObject(parent.to_string()));
        }
        Ok(())
    }
}

/// Parent of a normalised DN. Commas inside values are hex-escaped by
/// `dn::normalize`, so the first comma always separates RDNs.
fn parent_key(normalized: &str) -> Option<&str> {
    normalized.split_once(',').map(|(_, parent)| parent)
}

fn depth(normalized: &str) -> usize {
    dn::explode(normalized).map(|rdns| rdns.len()).unwrap_or(0)
}

impl Directory for MemoryDirectory {
    fn add(&mut self, entry: &Entry) -> Result<(), DirectoryError> {
        let key = dn::normalize(entry.dn())?;
        if self.entries.contains_key(&key) {
            return Err(DirectoryError::AlreadyExists(entry.dn().to_string()));
        }
        self.check_parent(entry.dn())?;
        self.insert(key, entry.clone());
        Ok(())
    }

    fn delete(&mut self, dn: &str) -> Result<(), DirectoryError> {
        let key = self.existing_key(dn)?;
        if self.has_children(&key) {
            return Err(DirectoryError::NotAllowedOnNonLeaf(dn.to_string()));
        }
        self.remove(&key);
        Ok(())
    }

    fn modify(&mut self, dn: &str, mods: &[Modification]) -> Result<(), DirectoryError> {
        let key = self.existing_key(dn)?;
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.apply(mods);
        }
        Ok(())
    }

    fn rename(
        &mut self,
        dn: &str,
        new_rdn: &str,
        new_superior: Option<&str>,
        delete_old_rdn: bool,
    ) -> Result<(), DirectoryError> {
        let key = self.existing_key(dn)?;
        if self.has_children(&key) {
            return Err(DirectoryError::NotAllowedOnNonLeaf(dn.to_string()));
        }
        let parent = match new_superior {
            Some(sup) => Some(sup),
            None => dn::parent(dn),
        };
        let new_dn = dn::join(new_rdn, parent);
        let new_key = dn::normalize(&new_dn)?;
        if new_key != key && self.entries.contains_key(&new_key) {
            return Err(DirectoryError::AlreadyExists(new_dn));
        }
        self.check_parent(&new_dn)?;
        let Some(mut entry) = self.remove(&key) else {
            return Err(DirectoryError::NoSuchObject(dn.to_string()));
        };
        engine::rename_entry(&mut entry, &new_dn, delete_old_rdn)?;
        self.insert(new_key, entry);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::ModOp;

    fn tree() -> MemoryDirectory {
        let mut dir = MemoryDirectory::new();
        dir.add(&Entry::new("dc=x").with("dc", "x")).unwrap();
        dir.add(&Entry::new("ou=people,dc=x").with("ou", "people"))
            .unwrap();
        dir.add(&Entry::new("cn=alice,ou=people,dc=x").with("cn", "alice"))
            .unwrap();
        dir
    }

    #[test]
    fn add_requires_parent_and_uniqueness() {
        let mut dir = tree();
        assert!(matches!(
            dir.add(&Entry::new("cn=bob,ou=missing,dc=x")),
            Err(DirectoryError::NoSuchObject(p)) if p == "ou=missing,dc=x"
        ));
        assert!(matches!(
            dir.add(&Entry::new("CN=Alice, ou=people,dc=x")),
            Err(DirectoryError::AlreadyExists(_))
        ));
        assert_eq!(dir.len(), 3);
    }

    #[test]
    fn delete_only_leaves() {
        let mut dir = tree();
        assert!(matches!(
            dir.delete("ou=people,dc=x"),
            Err(DirectoryError::NotAllowedOnNonLeaf(_))
        ));
        dir.delete("cn=alice,ou=people,dc=x").unwrap();
        dir.delete("ou=people,dc=x").unwrap();
        assert!(matches!(
            dir.delete("cn=nobody,dc=x"),
            Err(DirectoryError::NoSuchObject(_))
        ));
    }

    #[test]
    fn modify_applies_directives() {
        let mut dir = tree();
        dir.modify(
            "cn=alice,ou=people,dc=x",
            &[Modification::new("mail", ModOp::Add, vec![b"a@x".to_vec()])],
        )
        .unwrap();
        assert!(dir
            .get("cn=alice,ou=people,dc=x")
            .unwrap()
            .has_value("mail", b"a@x"));
    }

    #[test]
    fn rename_moves_entry_and_rdn_values() {
        let mut dir = tree();
        dir.rename("cn=alice,ou=people,dc=x", "cn=alicia", None, true)
            .unwrap();
        assert!(!dir.contains("cn=alice,ou=people,dc=x"));
        let e = dir.get("cn=alicia,ou=people,dc=x").unwrap();
        assert_eq!(e.dn(), "cn=alicia,ou=people,dc=x");
        assert!(e.has_value("cn", b"alicia"));
        assert!(!e.has_value("cn", b"alice"));

        dir.rename("cn=alicia,ou=people,dc=x", "cn=alicia", Some("dc=x"), false)
            .unwrap();
        assert!(dir.contains("cn=alicia,dc=x"));
        assert!(matches!(
            dir.rename("dc=x", "dc=y", None, false),
            Err(DirectoryError::NotAllowedOnNonLeaf(_))
        ));
    }

    #[test]
    fn child_counts_follow_moves_and_escaped_commas() {
        let mut dir = tree();
        dir.add(&Entry::new("ou=a\\,b,dc=x").with("ou", "a,b")).unwrap();
        dir.add(&Entry::new("cn=c,ou=a\\,b,dc=x").with("cn", "c"))
            .unwrap();
        assert!(matches!(
            dir.delete("ou=a\\,b,dc=x"),
            Err(DirectoryError::NotAllowedOnNonLeaf(_))
        ));
        dir.rename("cn=c,ou=a\\,b,dc=x", "cn=c", Some("dc=x"), false)
            .unwrap();
        dir.delete("ou=a\\,b,dc=x").unwrap();
        dir.rename("cn=alice,ou=people,dc=x", "cn=alice", Some("dc=x"), false)
            .unwrap();
        dir.delete("ou=people,dc=x").unwrap();
        assert!(matches!(
            dir.delete("dc=x"),
            Err(DirectoryError::NotAllowedOnNonLeaf(_))
        ));
        dir.delete("cn=c,dc=x").unwrap();
        dir.delete("cn=alice,dc=x").unwrap();
        dir.delete("dc=x").unwrap();
        assert!(dir.is_empty());
    }

    #[test]
    fn from_entries_counts_children_once() {
        let mut dir = MemoryDirectory::from_entries([
            Entry::new("dc=x"),
            Entry::new("cn=a,dc=x"),
            Entry::new("CN=A,dc=x"),
        ])
        .unwrap();
        assert_eq!(dir.len(), 2);
        dir.delete("cn=a,dc=x").unwrap();
        dir.delete("dc=x").unwrap();
    }

    #[test]
    fn top_down_order() {
        let dir = tree();
        let dns: Vec<_> = dir.entries_top_down().iter().map(|e| e.dn()).collect();
        assert_eq!(dns, ["dc=x", "ou=people,dc=x", "cn=alice,ou=people,dc=x"]);
    }
}
