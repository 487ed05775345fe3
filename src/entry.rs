// Directory entry model: values, attributes, entries and modification
// directives, plus the attribute-level diff used by the reconciler.
//
// Values are opaque byte strings. Attribute names keep the spelling they
// were first seen with but are looked up ASCII case-insensitively, so an
// entry never holds two attributes that differ only in case.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A single attribute value. Never assumed to be text.
pub type Value = Vec<u8>;

// ---------------------------------------------------------------------------
// Attribute
// ---------------------------------------------------------------------------

/// A named, unordered collection of values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    name: String,
    values: Vec<Value>,
}

impl Attribute {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
        }
    }

    pub fn with_values(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// True if `name` designates this attribute (ASCII case-insensitive).
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub fn push(&mut self, value: impl Into<Value>) {
        self.values.push(value.into());
    }

    pub fn contains(&self, value: &[u8]) -> bool {
        self.values.iter().any(|v| v.as_slice() == value)
    }

    /// Remove one occurrence of `value`. Returns whether it was present.
    pub fn remove(&mut self, value: &[u8]) -> bool {
        match self.values.iter().position(|v| v.as_slice() == value) {
            Some(i) => {
                self.values.swap_remove(i);
                true
            }
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Set equality of the value collections: order and duplicates do not
    /// matter, each value is compared byte for byte.
    pub fn value_set_eq(&self, other: &Attribute) -> bool {
        sorted_set(&self.values) == sorted_set(&other.values)
    }
}

fn sorted_set(values: &[Value]) -> Vec<&[u8]> {
    let mut set: Vec<&[u8]> = values.iter().map(Vec::as_slice).collect();
    set.sort_unstable();
    set.dedup();
    set
}

// ---------------------------------------------------------------------------
// Entry
// ---------------------------------------------------------------------------

/// A distinguished name plus its attributes, unique by name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Entry {
    dn: String,
    attributes: Vec<Attribute>,
}

impl Entry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: Vec::new(),
        }
    }

    pub fn dn(&self) -> &str {
        &self.dn
    }

    pub fn set_dn(&mut self, dn: impl Into<String>) {
        self.dn = dn.into();
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.is_named(name))
    }

    pub fn attribute_mut(&mut self, name: &str) -> Option<&mut Attribute> {
        self.attributes.iter_mut().find(|a| a.is_named(name))
    }

    /// Look up `name`, creating an empty attribute at the end if missing.
    pub fn attribute_or_insert(&mut self, name: &str) -> &mut Attribute {
        let idx = match self.attributes.iter().position(|a| a.is_named(name)) {
            Some(i) => i,
            None => {
                self.attributes.push(Attribute::new(name));
                self.attributes.len() - 1
            }
        };
        &mut self.attributes[idx]
    }

    /// Append a value. Re-adding an existing name extends that attribute.
    pub fn add_value(&mut self, name: &str, value: impl Into<Value>) {
        self.attribute_or_insert(name).push(value);
    }

    /// Builder form of [`Entry::add_value`], handy in tests and fixtures.
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.add_value(name, value);
        self
    }

    pub fn has_value(&self, name: &str, value: &[u8]) -> bool {
        self.attribute(name).is_some_and(|a| a.contains(value))
    }

    /// Remove one value; drops the attribute once it has no values left.
    pub fn remove_value(&mut self, name: &str, value: &[u8]) -> bool {
        let Some(idx) = self.attributes.iter().position(|a| a.is_named(name)) else {
            return false;
        };
        let removed = self.attributes[idx].remove(value);
        if self.attributes[idx].is_empty() {
            self.attributes.remove(idx);
        }
        removed
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<Attribute> {
        let idx = self.attributes.iter().position(|a| a.is_named(name))?;
        Some(self.attributes.remove(idx))
    }

    /// Replace the whole value set of `name`; an empty set removes it.
    pub fn replace_attribute(&mut self, name: &str, values: Vec<Value>) {
        if values.is_empty() {
            self.remove_attribute(name);
            return;
        }
        let attr = self.attribute_or_insert(name);
        attr.values = values;
    }

    /// The entry expressed as add directives, one per attribute.
    pub fn to_modifications(&self) -> Vec<Modification> {
        self.attributes
            .iter()
            .map(|a| Modification::new(a.name.clone(), ModOp::Add, a.values.clone()))
            .collect()
    }

    /// Apply modification directives in order.
    pub fn apply(&mut self, mods: &[Modification]) {
        for m in mods {
            match m.op {
                ModOp::Add => {
                    for v in &m.values {
                        if !self.has_value(&m.attr, v) {
                            self.add_value(&m.attr, v.clone());
                        }
                    }
                }
                ModOp::Delete if m.values.is_empty() => {
                    self.remove_attribute(&m.attr);
                }
                ModOp::Delete => {
                    for v in &m.values {
                        self.remove_value(&m.attr, v);
                    }
                }
                ModOp::Replace => self.replace_attribute(&m.attr, m.values.clone()),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Modification directives
// ---------------------------------------------------------------------------

/// What a modification does to its attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModOp {
    Add,
    Delete,
    Replace,
}

impl ModOp {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Delete => "delete",
            Self::Replace => "replace",
        }
    }
}

impl fmt::Display for ModOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unrecognised change marker.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid change marker: {0}")]
pub struct InvalidModOp(pub String);

impl FromStr for ModOp {
    type Err = InvalidModOp;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(Self::Add),
            "delete" => Ok(Self::Delete),
            "replace" => Ok(Self::Replace),
            other => Err(InvalidModOp(other.to_string())),
        }
    }
}

/// One attribute-level change: `(attribute, operation, values)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modification {
    pub attr: String,
    pub op: ModOp,
    pub values: Vec<Value>,
}

impl Modification {
    pub fn new(attr: impl Into<String>, op: ModOp, values: Vec<Value>) -> Self {
        Self {
            attr: attr.into(),
            op,
            values,
        }
    }
}

// ---------------------------------------------------------------------------
// Entry diff
// ---------------------------------------------------------------------------

fn name_cmp(a: &str, b: &str) -> Ordering {
    a.bytes()
        .map(|c| c.to_ascii_lowercase())
        .cmp(b.bytes().map(|c| c.to_ascii_lowercase()))
}

/// Compute the directives that turn `old` into `new`.
///
/// Attributes are paired by name. A pair whose value sets differ yields one
/// `Replace` carrying the full new set; an attribute only in `old` yields a
/// `Delete`, one only in `new` an `Add`. Output is ordered by attribute
/// name, so the result is deterministic regardless of attribute order.
pub fn compare_entries(old: &Entry, new: &Entry) -> Vec<Modification> {
    let mut a: Vec<&Attribute> = old.attributes.iter().collect();
    let mut b: Vec<&Attribute> = new.attributes.iter().collect();
    a.sort_by(|x, y| name_cmp(&x.name, &y.name));
    b.sort_by(|x, y| name_cmp(&x.name, &y.name));

    let mut mods = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() || j < b.len() {
        let order = match (a.get(i), b.get(j)) {
            (Some(x), Some(y)) => name_cmp(&x.name, &y.name),
            (Some(_), None) => Ordering::Less,
            (None, _) => Ordering::Greater,
        };
        match order {
            Ordering::Less => {
                let x = a[i];
                mods.push(Modification::new(x.name.clone(), ModOp::Delete, x.values.clone()));
                i += 1;
            }
            Ordering::Greater => {
                let y = b[j];
                mods.push(Modification::new(y.name.clone(), ModOp::Add, y.values.clone()));
                j += 1;
            }
            Ordering::Equal => {
                let (x, y) = (a[i], b[j]);
                if !x.value_set_eq(y) {
                    mods.push(Modification::new(
                        y.name.clone(),
                        ModOp::Replace,
                        y.values.clone(),
                    ));
                }
                i += 1;
                j += 1;
            }
        }
    }
    mods
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
