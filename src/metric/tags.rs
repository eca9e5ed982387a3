//! Tag multisets and their canonical digest. Two samples with the same name
//! and the same canonical tags address the same aggregation cell, whatever
//! order their labels arrived in.
use metric::Error;
use std::slice::Iter;

/// Separator used when joining labels into a `tags_key` digest. A label that
/// embeds this character cannot be canonicalized.
pub const TAGS_KEY_SEPARATOR: char = ',';

/// An unordered multiset of string labels, stored sorted.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Tags {
    inner: Vec<String>,
}

impl<'a> IntoIterator for &'a Tags {
    type Item = &'a String;
    type IntoIter = Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter()
    }
}

impl Tags {
    /// Insert a label, keeping the storage sorted. Duplicate labels are kept;
    /// this is a multiset.
    pub fn insert<S>(&mut self, label: S)
    where
        S: Into<String>,
    {
        let label = label.into();
        let idx = match self.inner.binary_search(&label) {
            Ok(idx) => idx,
            Err(idx) => idx,
        };
        self.inner.insert(idx, label);
    }

    pub fn contains(&self, label: &str) -> bool {
        self.inner.binary_search_by(|probe| probe.as_str().cmp(label)).is_ok()
    }

    pub fn iter(&self) -> Iter<String> {
        self.inner.iter()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// The canonical, order-independent digest of this tag set: labels sorted
    /// and joined on `TAGS_KEY_SEPARATOR`. Fails only when a label embeds the
    /// separator, since the digest would then be ambiguous.
    pub fn tags_key(&self) -> Result<String, Error> {
        let mut key = String::with_capacity(self.inner.iter().map(|l| l.len() + 1).sum());
        for label in &self.inner {
            if label.contains(TAGS_KEY_SEPARATOR) {
                return Err(Error::InvalidTag(label.clone()));
            }
            if !key.is_empty() {
                key.push(TAGS_KEY_SEPARATOR);
            }
            key.push_str(label);
        }
        Ok(key)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use metric::Error;

    #[test]
    fn test_tags_key_order_independent() {
        let mut left = Tags::default();
        left.insert("region:us-east-1");
        left.insert("service:api");

        let mut right = Tags::default();
        right.insert("service:api");
        right.insert("region:us-east-1");

        assert_eq!(left.tags_key().unwrap(), right.tags_key().unwrap());
        assert_eq!("region:us-east-1,service:api", left.tags_key().unwrap());
    }

    #[test]
    fn test_tags_key_empty() {
        let tags = Tags::default();
        assert_eq!("", tags.tags_key().unwrap());
    }

    #[test]
    fn test_tags_key_rejects_separator() {
        let mut tags = Tags::default();
        tags.insert("bad,label");
        match tags.tags_key() {
            Err(Error::InvalidTag(label)) => assert_eq!("bad,label", label),
            other => panic!("expected InvalidTag, got {:?}", other),
        }
    }

    #[test]
    fn test_multiset_keeps_duplicates() {
        let mut tags = Tags::default();
        tags.insert("dup");
        tags.insert("dup");
        assert_eq!(2, tags.len());
        assert_eq!("dup,dup", tags.tags_key().unwrap());
    }

    #[test]
    fn test_contains() {
        let mut tags = Tags::default();
        tags.insert("percentiles:true");
        tags.insert("service:api");
        assert!(tags.contains("percentiles:true"));
        assert!(!tags.contains("percentiles:false"));
    }
}
