use std::fmt;

use super::StoreError;

/// Path of a collection: `trips`, `users/{uid}/requests`, ...
///
/// Always an odd number of non-empty segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath(String);

/// Path of a single document: a collection path plus a document id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentPath {
    collection: CollectionPath,
    id: String,
}

fn check_segment(segment: &str) -> Result<(), StoreError> {
    if segment.is_empty() || segment.contains('/') {
        return Err(StoreError::InvalidPath(format!(
            "invalid path segment {segment:?}"
        )));
    }
    Ok(())
}

impl CollectionPath {
    pub fn root(name: &str) -> Result<Self, StoreError> {
        check_segment(name)?;
        Ok(Self(name.to_string()))
    }

    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        let segments: Vec<&str> = raw.split('/').collect();
        if segments.len() % 2 == 0 {
            return Err(StoreError::InvalidPath(format!(
                "{raw:?} is not a collection path"
            )));
        }
        for segment in &segments {
            check_segment(segment)?;
        }
        Ok(Self(raw.to_string()))
    }

    pub fn doc(&self, id: &str) -> Result<DocumentPath, StoreError> {
        check_segment(id)?;
        Ok(DocumentPath {
            collection: self.clone(),
            id: id.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl DocumentPath {
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        let (collection, id) = raw.rsplit_once('/').ok_or_else(|| {
            StoreError::InvalidPath(format!("{raw:?} is not a document path"))
        })?;
        CollectionPath::parse(collection)?.doc(id)
    }

    /// Sub-collection nested under this document.
    pub fn collection(&self, name: &str) -> Result<CollectionPath, StoreError> {
        check_segment(name)?;
        Ok(CollectionPath(format!("{self}/{name}")))
    }

    pub fn parent(&self) -> &CollectionPath {
        &self.collection
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_paths_render_and_parse() {
        let user = CollectionPath::root("users").unwrap().doc("alice").unwrap();
        let request = user.collection("requests").unwrap().doc("t1:bob").unwrap();
        assert_eq!(request.to_string(), "users/alice/requests/t1:bob");
        assert_eq!(request.parent().as_str(), "users/alice/requests");
        assert_eq!(request.id(), "t1:bob");
        assert_eq!(DocumentPath::parse("users/alice/requests/t1:bob").unwrap(), request);
    }

    #[test]
    fn rejects_malformed_paths() {
        assert!(CollectionPath::root("").is_err());
        assert!(CollectionPath::parse("users/alice").is_err());
        assert!(DocumentPath::parse("users").is_err());
        assert!(DocumentPath::parse("users//requests/x").is_err());
        let trips = CollectionPath::root("trips").unwrap();
        assert!(trips.doc("a/b").is_err());
    }
}
