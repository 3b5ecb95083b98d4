/// In-memory indices over the conversion relation
///
/// Built from a single scan, so each identifier resolves with two hash
/// lookups instead of two database round trips.
use super::{CompoundLookup, SourceKey};
use crate::db::CompoundRecord;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};

/// Row currently winning the tie-break for an identifier
#[derive(Debug, Clone)]
struct KeyChoice {
    tag: String,
    key: String,
    candidates: BTreeSet<String>,
}

/// `identifier -> key` and `key -> tag -> identifiers`
#[derive(Debug, Default)]
pub struct CompoundIndex {
    keys: HashMap<String, KeyChoice>,
    members: HashMap<String, HashMap<String, BTreeSet<String>>>,
    rows: usize,
}

impl CompoundIndex {
    pub fn build<I>(records: I) -> Self
    where
        I: IntoIterator<Item = CompoundRecord>,
    {
        let mut index = Self::default();
        for record in records {
            index.insert(record);
        }
        index
    }

    fn insert(&mut self, record: CompoundRecord) {
        self.rows += 1;

        self.members
            .entry(record.canonical_key.clone())
            .or_default()
            .entry(record.source_tag.clone())
            .or_default()
            .insert(record.source_identifier.clone());

        match self.keys.get_mut(&record.source_identifier) {
            Some(choice) => {
                choice.candidates.insert(record.canonical_key.clone());
                let challenger = (record.source_tag.as_str(), record.canonical_key.as_str());
                if challenger < (choice.tag.as_str(), choice.key.as_str()) {
                    choice.tag = record.source_tag;
                    choice.key = record.canonical_key;
                }
            }
            None => {
                let candidates = BTreeSet::from([record.canonical_key.clone()]);
                self.keys.insert(
                    record.source_identifier,
                    KeyChoice {
                        tag: record.source_tag,
                        key: record.canonical_key,
                        candidates,
                    },
                );
            }
        }
    }

    /// Number of rows scanned
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of distinct identifiers across all catalogs
    pub fn identifiers(&self) -> usize {
        self.keys.len()
    }

    pub fn source_key(&self, identifier: &str) -> Option<SourceKey> {
        self.keys.get(identifier).map(|choice| SourceKey {
            canonical_key: choice.key.clone(),
            candidates: choice.candidates.clone(),
        })
    }

    pub fn targets(&self, canonical_key: &str, tag: &str) -> BTreeSet<String> {
        self.members
            .get(canonical_key)
            .and_then(|tags| tags.get(tag))
            .cloned()
            .unwrap_or_default()
    }

    /// Bind the index to the catalog being converted to
    pub fn lookup<'a>(&'a self, target_tag: &'a str) -> IndexedLookup<'a> {
        IndexedLookup {
            index: self,
            target_tag,
        }
    }
}

/// [`CompoundLookup`] answered from a [`CompoundIndex`]
pub struct IndexedLookup<'a> {
    index: &'a CompoundIndex,
    target_tag: &'a str,
}

#[async_trait]
impl CompoundLookup for IndexedLookup<'_> {
    async fn source_key(&mut self, identifier: &str) -> Result<Option<SourceKey>, sqlx::Error> {
        Ok(self.index.source_key(identifier))
    }

    async fn targets(&mut self, canonical_key: &str) -> Result<BTreeSet<String>, sqlx::Error> {
        Ok(self.index.targets(canonical_key, self.target_tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, key: &str, tag: &str) -> CompoundRecord {
        CompoundRecord {
            source_identifier: id.to_string(),
            canonical_key: key.to_string(),
            source_tag: tag.to_string(),
        }
    }

    #[test]
    fn test_build_counts() {
        let index = CompoundIndex::build(vec![
            record("C001", "ABC123", "KEGG"),
            record("HMDB0001", "ABC123", "HMDB"),
            record("C001", "ABC123", "KEGG"),
        ]);

        assert_eq!(index.rows(), 3);
        assert_eq!(index.identifiers(), 2);
    }

    #[test]
    fn test_tie_break_prefers_smallest_tag_then_key() {
        let index = CompoundIndex::build(vec![
            record("alanine", "KEY-Z", "PubChem"),
            record("alanine", "KEY-B", "ChEBI"),
            record("alanine", "KEY-A", "ChEBI"),
        ]);

        let source = index.source_key("alanine").unwrap();
        assert_eq!(source.canonical_key, "KEY-A");
        assert_eq!(source.candidates.len(), 3);
        assert!(source.is_ambiguous());
    }

    #[test]
    fn test_tie_break_ignores_insertion_order() {
        let rows = vec![
            record("alanine", "KEY-B", "ChEBI"),
            record("alanine", "KEY-A", "PubChem"),
        ];
        let mut reversed = rows.clone();
        reversed.reverse();

        let a = CompoundIndex::build(rows).source_key("alanine").unwrap();
        let b = CompoundIndex::build(reversed).source_key("alanine").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.canonical_key, "KEY-B");
    }

    #[test]
    fn test_targets_by_key_and_tag() {
        let index = CompoundIndex::build(vec![
            record("C001", "ABC123", "KEGG"),
            record("HMDB0001", "ABC123", "HMDB"),
            record("HMDB0009", "ABC123", "HMDB"),
        ]);

        let targets = index.targets("ABC123", "HMDB");
        assert_eq!(targets.len(), 2);
        assert!(targets.contains("HMDB0001"));
        assert!(targets.contains("HMDB0009"));
        assert!(index.targets("ABC123", "ChEBI").is_empty());
        assert!(index.targets("NOPE", "HMDB").is_empty());
    }
}
