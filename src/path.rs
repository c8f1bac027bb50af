//! Data paths and relative field references.
//!
//! A path is an owned list of segments: field names and collection indices.
//! It renders as `/name/0/child`; the root renders as `/`.
//!
//! References used by `when`, `api_uniq` and `default_source` are relative to
//! the referencing field: a bare name is a sibling, every `../` prefix climbs
//! one object level. Climbing out of an element of an `objects` collection
//! first drops the element index, so `../x` from `/list/3/y` is `/x`, not
//! `/list/x`.

use std::fmt;

/// One step of a [`DataPath`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    Field(String),
    Index(usize),
}

impl Segment {
    /// Build a segment from a map key. All-digit keys are treated as indices,
    /// which is how collections submitted as keyed maps are addressed.
    pub fn from_key(key: &str) -> Segment {
        if !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(index) = key.parse::<usize>() {
                return Segment::Index(index);
            }
        }
        Segment::Field(key.to_string())
    }

    pub fn is_index(&self) -> bool {
        matches!(self, Segment::Index(_))
    }

    /// The key used to look this segment up in a JSON object.
    pub fn key(&self) -> String {
        match self {
            Segment::Field(name) => name.clone(),
            Segment::Index(index) => index.to_string(),
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Field(name) => f.write_str(name),
            Segment::Index(index) => write!(f, "{}", index),
        }
    }
}

/// Absolute location of a field inside the data (or rule) tree.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataPath(Vec<Segment>);

impl DataPath {
    pub fn root() -> DataPath {
        DataPath(Vec::new())
    }

    /// Parse a rendered path such as `/interfaces/1/dns`.
    pub fn parse(path: &str) -> DataPath {
        DataPath(
            path.split('/')
                .filter(|part| !part.is_empty())
                .map(Segment::from_key)
                .collect(),
        )
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&Segment> {
        self.0.last()
    }

    pub fn child(&self, segment: Segment) -> DataPath {
        let mut segments = self.0.clone();
        segments.push(segment);
        DataPath(segments)
    }

    pub fn field(&self, name: &str) -> DataPath {
        self.child(Segment::Field(name.to_string()))
    }

    /// Child addressed by a collection key; digit keys become indices.
    pub fn key(&self, key: &str) -> DataPath {
        self.child(Segment::from_key(key))
    }

    pub fn index(&self, index: usize) -> DataPath {
        self.child(Segment::Index(index))
    }

    pub fn starts_with(&self, prefix: &DataPath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Resolve `reference` as seen from the field at `self`.
    ///
    /// `self` names the referencing field; its siblings live under its parent.
    pub fn resolve_reference(&self, reference: &str) -> DataPath {
        let mut target = self.0.clone();
        target.pop();
        resolve_against(target, reference)
    }

    /// Resolve `reference` as seen from inside the container at `self`, i.e.
    /// a bare name is a child of `self`.
    pub fn resolve_from_container(&self, reference: &str) -> DataPath {
        resolve_against(self.0.clone(), reference)
    }
}

fn resolve_against(mut target: Vec<Segment>, reference: &str) -> DataPath {
    let mut rest = reference;
    while let Some(stripped) = rest.strip_prefix("../") {
        // An element index is not an object level of its own.
        if target.last().is_some_and(Segment::is_index) {
            target.pop();
        }
        target.pop();
        rest = stripped;
    }

    target.extend(
        rest.split('/')
            .filter(|part| !part.is_empty())
            .map(Segment::from_key),
    );

    DataPath(target)
}

impl fmt::Display for DataPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.0 {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}
