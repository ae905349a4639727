//! Record collections and the global entity id space.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EntwineError, Result};

/// Global entity id: a record's position in the unified id space.
pub type EntityId = usize;

/// How many collections a run resolves over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionKind {
    /// One collection, compared against itself.
    Dirty,
    /// Two collections, cross-side pairs only.
    CleanClean,
}

impl fmt::Display for ResolutionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dirty => write!(f, "dirty"),
            Self::CleanClean => write!(f, "clean-clean"),
        }
    }
}

/// A single input record: an external identifier plus one text value per
/// declared attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// External identifier, used only for the ground-truth id mapping.
    pub id: String,
    /// Attribute values, aligned with the side's declared attribute names.
    pub values: Vec<String>,
}

impl Record {
    /// Creates a record from its external id and attribute values.
    #[must_use]
    pub fn new(id: impl Into<String>, values: Vec<String>) -> Self {
        Self { id: id.into(), values }
    }
}

#[derive(Debug, Clone)]
struct CollectionSide {
    attributes: Vec<String>,
    records: Vec<Record>,
}

impl CollectionSide {
    fn text(&self, offset: usize, columns: &[usize]) -> String {
        let record = &self.records[offset];
        columns
            .iter()
            .map(|&column| record.values[column].as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// One or two sides of input records, read-only once constructed.
///
/// Side-1 records occupy global ids `0..n1` by position; side-2 records
/// (Clean-Clean only) occupy `n1..n1+n2`. [`dataset_limit`] equals `n1`, so
/// any id below it denotes a side-1 entity. Every downstream structure
/// speaks in these global ids.
///
/// [`dataset_limit`]: RecordCollection::dataset_limit
#[derive(Debug, Clone)]
pub struct RecordCollection {
    first: CollectionSide,
    second: Option<CollectionSide>,
}

impl RecordCollection {
    /// Creates a Dirty collection from one record table.
    pub fn dirty(attributes: Vec<String>, records: Vec<Record>) -> Result<Self> {
        Self::validate_side(&attributes, &records)?;
        Ok(Self { first: CollectionSide { attributes, records }, second: None })
    }

    /// Creates a Clean-Clean collection from two record tables.
    pub fn clean_clean(
        attributes_1: Vec<String>,
        records_1: Vec<Record>,
        attributes_2: Vec<String>,
        records_2: Vec<Record>,
    ) -> Result<Self> {
        Self::validate_side(&attributes_1, &records_1)?;
        Self::validate_side(&attributes_2, &records_2)?;
        Ok(Self {
            first: CollectionSide { attributes: attributes_1, records: records_1 },
            second: Some(CollectionSide { attributes: attributes_2, records: records_2 }),
        })
    }

    fn validate_side(attributes: &[String], records: &[Record]) -> Result<()> {
        if attributes.is_empty() {
            return Err(EntwineError::Config(
                "a collection side needs at least one attribute".into(),
            ));
        }
        for (position, record) in records.iter().enumerate() {
            if record.values.len() != attributes.len() {
                return Err(EntwineError::InvalidFormat(format!(
                    "record {position} ({:?}) has {} values, expected {}",
                    record.id,
                    record.values.len(),
                    attributes.len()
                )));
            }
        }
        Ok(())
    }

    /// Resolution kind this collection represents.
    #[must_use]
    pub fn kind(&self) -> ResolutionKind {
        if self.second.is_some() {
            ResolutionKind::CleanClean
        } else {
            ResolutionKind::Dirty
        }
    }

    /// Number of side-1 records; the boundary of the global id space.
    ///
    /// Ids below this value belong to side 1, ids at or above it to side 2.
    #[must_use]
    pub fn dataset_limit(&self) -> usize {
        self.first.records.len()
    }

    /// Number of side-1 records.
    #[must_use]
    pub fn num_entities_1(&self) -> usize {
        self.first.records.len()
    }

    /// Number of side-2 records (zero for Dirty collections).
    #[must_use]
    pub fn num_entities_2(&self) -> usize {
        self.second.as_ref().map_or(0, |side| side.records.len())
    }

    /// Total number of entities across both sides.
    #[must_use]
    pub fn num_entities(&self) -> usize {
        self.num_entities_1() + self.num_entities_2()
    }

    /// Declared attribute names of side 1.
    #[must_use]
    pub fn attributes_1(&self) -> &[String] {
        &self.first.attributes
    }

    /// Declared attribute names of side 2 (empty for Dirty collections).
    #[must_use]
    pub fn attributes_2(&self) -> &[String] {
        self.second.as_ref().map_or(&[], |side| side.attributes.as_slice())
    }

    /// Resolves side-1 attribute names to column indices.
    ///
    /// `None` selects every declared attribute. An unknown name is a
    /// configuration error, raised before any worker starts.
    pub fn resolve_attributes_1(&self, names: Option<&[String]>) -> Result<Vec<usize>> {
        Self::resolve(&self.first.attributes, names)
    }

    /// Resolves side-2 attribute names to column indices.
    ///
    /// Dirty collections have no second side, so the selection is empty.
    pub fn resolve_attributes_2(&self, names: Option<&[String]>) -> Result<Vec<usize>> {
        match &self.second {
            Some(side) => Self::resolve(&side.attributes, names),
            None => Ok(Vec::new()),
        }
    }

    fn resolve(attributes: &[String], names: Option<&[String]>) -> Result<Vec<usize>> {
        match names {
            None => Ok((0..attributes.len()).collect()),
            Some(names) => names
                .iter()
                .map(|name| {
                    attributes.iter().position(|attribute| attribute == name).ok_or_else(|| {
                        EntwineError::Config(format!("unknown attribute {name:?}"))
                    })
                })
                .collect(),
        }
    }

    /// Space-joined text of the selected attributes for one entity.
    ///
    /// The id is global: side-2 entities are addressed at or above
    /// [`dataset_limit`](Self::dataset_limit) and use `columns_2`. Columns
    /// must come from the matching `resolve_attributes_*` call.
    #[must_use]
    pub fn text_by_id(&self, id: EntityId, columns_1: &[usize], columns_2: &[usize]) -> String {
        match &self.second {
            Some(side) if id >= self.first.records.len() => {
                side.text(id - self.first.records.len(), columns_2)
            }
            _ => self.first.text(id, columns_1),
        }
    }

    /// External-id to global-id mapping for side 1.
    ///
    /// Built for evaluation against ground truth; the engine itself never
    /// reads it.
    #[must_use]
    pub fn id_mapping_1(&self) -> HashMap<String, EntityId> {
        self.first
            .records
            .iter()
            .enumerate()
            .map(|(position, record)| (record.id.clone(), position))
            .collect()
    }

    /// External-id to global-id mapping for side 2, offset by
    /// [`dataset_limit`](Self::dataset_limit). Empty for Dirty collections.
    #[must_use]
    pub fn id_mapping_2(&self) -> HashMap<String, EntityId> {
        let limit = self.dataset_limit();
        self.second.as_ref().map_or_else(HashMap::new, |side| {
            side.records
                .iter()
                .enumerate()
                .map(|(position, record)| (record.id.clone(), limit + position))
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(texts: &[&str]) -> Vec<Record> {
        texts
            .iter()
            .enumerate()
            .map(|(position, text)| Record::new(format!("r{position}"), vec![(*text).to_owned()]))
            .collect()
    }

    #[test]
    fn test_dirty_collection_basics() {
        let collection =
            RecordCollection::dirty(vec!["title".into()], records(&["a", "b", "c"])).unwrap();
        assert_eq!(collection.kind(), ResolutionKind::Dirty);
        assert_eq!(collection.dataset_limit(), 3);
        assert_eq!(collection.num_entities(), 3);
        assert_eq!(collection.num_entities_2(), 0);
        assert!(collection.attributes_2().is_empty());
    }

    #[test]
    fn test_clean_clean_offsets_side_two() {
        let collection = RecordCollection::clean_clean(
            vec!["name".into()],
            records(&["a", "b"]),
            vec!["title".into()],
            records(&["x", "y", "z"]),
        )
        .unwrap();
        assert_eq!(collection.kind(), ResolutionKind::CleanClean);
        assert_eq!(collection.dataset_limit(), 2);
        assert_eq!(collection.num_entities(), 5);
        assert_eq!(collection.text_by_id(0, &[0], &[0]), "a");
        assert_eq!(collection.text_by_id(2, &[0], &[0]), "x");
        assert_eq!(collection.text_by_id(4, &[0], &[0]), "z");
    }

    #[test]
    fn test_arity_mismatch_is_rejected() {
        let bad = vec![Record::new("r0", vec!["only one value".into()])];
        let result = RecordCollection::dirty(vec!["name".into(), "city".into()], bad);
        assert!(matches!(result, Err(EntwineError::InvalidFormat(_))));
    }

    #[test]
    fn test_empty_attribute_list_is_rejected() {
        let result = RecordCollection::dirty(Vec::new(), Vec::new());
        assert!(matches!(result, Err(EntwineError::Config(_))));
    }

    #[test]
    fn test_resolve_defaults_to_every_attribute() {
        let collection = RecordCollection::dirty(
            vec!["name".into(), "city".into()],
            vec![Record::new("r0", vec!["ada".into(), "london".into()])],
        )
        .unwrap();
        assert_eq!(collection.resolve_attributes_1(None).unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_resolve_by_name_preserves_selection_order() {
        let collection = RecordCollection::dirty(
            vec!["name".into(), "city".into()],
            vec![Record::new("r0", vec!["ada".into(), "london".into()])],
        )
        .unwrap();
        let selection = vec!["city".to_owned(), "name".to_owned()];
        assert_eq!(collection.resolve_attributes_1(Some(&selection)).unwrap(), vec![1, 0]);
    }

    #[test]
    fn test_resolve_unknown_attribute_fails() {
        let collection =
            RecordCollection::dirty(vec!["name".into()], records(&["ada"])).unwrap();
        let selection = vec!["missing".to_owned()];
        let result = collection.resolve_attributes_1(Some(&selection));
        assert!(matches!(result, Err(EntwineError::Config(_))));
    }

    #[test]
    fn test_resolve_attributes_2_is_empty_for_dirty() {
        let collection =
            RecordCollection::dirty(vec!["name".into()], records(&["ada"])).unwrap();
        let selection = vec!["anything".to_owned()];
        assert!(collection.resolve_attributes_2(Some(&selection)).unwrap().is_empty());
    }

    #[test]
    fn test_text_joins_selected_columns_with_spaces() {
        let collection = RecordCollection::dirty(
            vec!["name".into(), "city".into(), "notes".into()],
            vec![Record::new("r0", vec!["ada".into(), "london".into(), "pioneer".into()])],
        )
        .unwrap();
        assert_eq!(collection.text_by_id(0, &[0, 2], &[]), "ada pioneer");
    }

    #[test]
    fn test_id_mappings_follow_the_offset_invariant() {
        let collection = RecordCollection::clean_clean(
            vec!["name".into()],
            records(&["a", "b"]),
            vec!["name".into()],
            records(&["x"]),
        )
        .unwrap();
        let mapping_1 = collection.id_mapping_1();
        let mapping_2 = collection.id_mapping_2();
        assert_eq!(mapping_1["r0"], 0);
        assert_eq!(mapping_1["r1"], 1);
        assert_eq!(mapping_2["r0"], 2, "side-2 ids start at dataset_limit");
        assert!(RecordCollection::dirty(vec!["name".into()], records(&["a"]))
            .unwrap()
            .id_mapping_2()
            .is_empty());
    }
}
