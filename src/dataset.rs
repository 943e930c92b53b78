//! Dataset model and lifecycle status machine.
//!
//! This module defines the core dataset types:
//!
//! - `DatasetStatus`: the lifecycle stages and their integer codes
//! - `DatasetKind`: the closed set of dataset flavours
//! - `DatasetRecord` / `DatasetView`: the stored row and the
//!   caller-facing representation
//! - `TransitionRules` / `OperationEdges`: the legal status moves per
//!   asynchronous operation
//!
//! Status codes are stable. Non-negative codes order the settled
//! stages from 0 (empty) to 3 (ready for search) and negative codes
//! mark a dataset owned by an in-flight job, so `status.code() < 0`
//! always means "busy" and `ReadyForSearch` carries the maximum code.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::files::BinaryStats;
use crate::jobs::JobKind;

/// Lifecycle status of a dataset.
///
/// Non-negative codes are settled stages; negative codes mean an
/// asynchronous job currently owns the dataset and no new lifecycle
/// operation may start on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DatasetStatus {
    /// Provisioned, no triples yet.
    Empty,
    /// A generate_triples job is in flight.
    TriplesLoading,
    /// Triples present, no trained model.
    UntrainedWithTriples,
    /// A train job is in flight.
    Training,
    /// Trained model present, no search index.
    TrainedUnindexed,
    /// A build_search_index job is in flight.
    IndexBuilding,
    /// Search index present, lookups allowed.
    ReadyForSearch,
}

impl DatasetStatus {
    /// Stable integer code as stored in the database.
    pub fn code(&self) -> i64 {
        match self {
            DatasetStatus::Empty => 0,
            DatasetStatus::UntrainedWithTriples => 1,
            DatasetStatus::TrainedUnindexed => 2,
            DatasetStatus::ReadyForSearch => 3,
            DatasetStatus::TriplesLoading => -1,
            DatasetStatus::Training => -2,
            DatasetStatus::IndexBuilding => -3,
        }
    }

    /// Reverse of [`code`](Self::code).
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(DatasetStatus::Empty),
            1 => Some(DatasetStatus::UntrainedWithTriples),
            2 => Some(DatasetStatus::TrainedUnindexed),
            3 => Some(DatasetStatus::ReadyForSearch),
            -1 => Some(DatasetStatus::TriplesLoading),
            -2 => Some(DatasetStatus::Training),
            -3 => Some(DatasetStatus::IndexBuilding),
            _ => None,
        }
    }

    /// Returns true while an asynchronous job owns the dataset.
    pub fn is_in_progress(&self) -> bool {
        self.code() < 0
    }

    /// Returns true when no trained model exists yet.
    pub fn is_untrained(&self) -> bool {
        matches!(
            self,
            DatasetStatus::Empty | DatasetStatus::UntrainedWithTriples
        )
    }

    /// Returns true once a trained model exists.
    pub fn is_trained(&self) -> bool {
        matches!(
            self,
            DatasetStatus::TrainedUnindexed | DatasetStatus::ReadyForSearch
        )
    }

    /// Returns true when search lookups are allowed.
    pub fn is_searchable(&self) -> bool {
        matches!(self, DatasetStatus::ReadyForSearch)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetStatus::Empty => "empty",
            DatasetStatus::TriplesLoading => "triples_loading",
            DatasetStatus::UntrainedWithTriples => "untrained_with_triples",
            DatasetStatus::Training => "training",
            DatasetStatus::TrainedUnindexed => "trained_unindexed",
            DatasetStatus::IndexBuilding => "index_building",
            DatasetStatus::ReadyForSearch => "ready_for_search",
        }
    }
}

impl std::fmt::Display for DatasetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The closed set of dataset flavours.
///
/// The flavour decides which triple extraction strategy workers apply;
/// this crate only records it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    Generic,
    Wikidata,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 2] = [DatasetKind::Generic, DatasetKind::Wikidata];

    /// Stable numeric id as stored in the database.
    pub fn id(&self) -> i64 {
        match self {
            DatasetKind::Generic => 0,
            DatasetKind::Wikidata => 1,
        }
    }

    /// Reverse of [`id`](Self::id).
    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            0 => Some(DatasetKind::Generic),
            1 => Some(DatasetKind::Wikidata),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetKind::Generic => "generic",
            DatasetKind::Wikidata => "wikidata",
        }
    }

    /// Parses a kind name as accepted on the command line.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "generic" | "dataset" => Some(DatasetKind::Generic),
            "wikidata" => Some(DatasetKind::Wikidata),
            _ => None,
        }
    }
}

impl std::fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A dataset row as stored.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetRecord {
    pub id: i64,
    pub kind: DatasetKind,
    pub status: DatasetStatus,
    /// Binary triple store name, relative to the binaries directory.
    pub binary_dataset: String,
    /// Trained model name; empty until a train job succeeds.
    pub binary_model: String,
    /// Search index name; empty until an index build succeeds.
    pub binary_index: String,
    /// Embedding vector width; 0 until a train job succeeds.
    pub embedding_size: u32,
}

/// Caller-facing dataset representation.
///
/// Entity, relation and triple counts are derived on demand from the
/// binary triple store and never persisted; they stay `None` unless
/// the read asked for enrichment.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetView {
    pub id: i64,
    pub kind: DatasetKind,
    pub status: DatasetStatus,
    pub status_code: i64,
    pub binary_dataset: String,
    pub binary_model: String,
    pub binary_index: String,
    pub embedding_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entities: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relations: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triples: Option<u64>,
}

impl DatasetView {
    pub fn from_record(record: &DatasetRecord) -> Self {
        Self {
            id: record.id,
            kind: record.kind,
            status: record.status,
            status_code: record.status.code(),
            binary_dataset: record.binary_dataset.clone(),
            binary_model: record.binary_model.clone(),
            binary_index: record.binary_index.clone(),
            embedding_size: record.embedding_size,
            entities: None,
            relations: None,
            triples: None,
        }
    }

    /// Attaches derived counts from the binary triple store.
    pub fn with_stats(mut self, stats: BinaryStats) -> Self {
        self.entities = Some(stats.entities);
        self.relations = Some(stats.relations);
        self.triples = Some(stats.triples);
        self
    }
}

/// Lifecycle edges used by one asynchronous operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationEdges {
    /// Status a dataset must hold for the operation to dispatch.
    pub required: DatasetStatus,
    /// Status claimed while the job runs.
    pub in_progress: DatasetStatus,
    /// Status applied when the job succeeds.
    pub on_success: DatasetStatus,
    /// Status restored when the job fails.
    pub on_failure: DatasetStatus,
}

/// Legal status transitions, built from the per-operation edges.
///
/// `ReadyForSearch` has no outgoing edges and is terminal.
pub struct TransitionRules {
    valid: HashMap<DatasetStatus, Vec<DatasetStatus>>,
}

impl TransitionRules {
    pub fn new() -> Self {
        let mut valid: HashMap<DatasetStatus, Vec<DatasetStatus>> = HashMap::new();

        for kind in JobKind::ALL {
            let edges = Self::edges_for(kind);
            valid
                .entry(edges.required)
                .or_default()
                .push(edges.in_progress);
            valid.insert(edges.in_progress, vec![edges.on_success, edges.on_failure]);
        }
        valid.entry(DatasetStatus::ReadyForSearch).or_default();

        Self { valid }
    }

    /// The edges used by one operation.
    pub fn edges(&self, kind: JobKind) -> OperationEdges {
        Self::edges_for(kind)
    }

    /// Check if a transition between two statuses is allowed.
    pub fn can_transition(&self, from: DatasetStatus, to: DatasetStatus) -> bool {
        self.valid
            .get(&from)
            .map(|targets| targets.contains(&to))
            .unwrap_or(false)
    }

    fn edges_for(kind: JobKind) -> OperationEdges {
        match kind {
            JobKind::GenerateTriples => OperationEdges {
                required: DatasetStatus::Empty,
                in_progress: DatasetStatus::TriplesLoading,
                on_success: DatasetStatus::UntrainedWithTriples,
                on_failure: DatasetStatus::Empty,
            },
            JobKind::Train => OperationEdges {
                required: DatasetStatus::UntrainedWithTriples,
                in_progress: DatasetStatus::Training,
                on_success: DatasetStatus::TrainedUnindexed,
                on_failure: DatasetStatus::UntrainedWithTriples,
            },
            JobKind::BuildSearchIndex => OperationEdges {
                required: DatasetStatus::TrainedUnindexed,
                in_progress: DatasetStatus::IndexBuilding,
                on_success: DatasetStatus::ReadyForSearch,
                on_failure: DatasetStatus::TrainedUnindexed,
            },
        }
    }
}

impl Default for TransitionRules {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_stable() {
        assert_eq!(DatasetStatus::Empty.code(), 0);
        assert_eq!(DatasetStatus::UntrainedWithTriples.code(), 1);
        assert_eq!(DatasetStatus::TrainedUnindexed.code(), 2);
        assert_eq!(DatasetStatus::ReadyForSearch.code(), 3);
        assert_eq!(DatasetStatus::TriplesLoading.code(), -1);
        assert_eq!(DatasetStatus::Training.code(), -2);
        assert_eq!(DatasetStatus::IndexBuilding.code(), -3);
    }

    #[test]
    fn test_status_code_round_trip() {
        for code in [-3, -2, -1, 0, 1, 2, 3] {
            let status = DatasetStatus::from_code(code).unwrap();
            assert_eq!(status.code(), code);
        }
        assert!(DatasetStatus::from_code(4).is_none());
        assert!(DatasetStatus::from_code(-4).is_none());
    }

    #[test]
    fn test_ready_for_search_has_max_code() {
        let ready = DatasetStatus::ReadyForSearch.code();
        for code in [-3, -2, -1, 0, 1, 2] {
            let status = DatasetStatus::from_code(code).unwrap();
            assert!(status.code() < ready);
            assert!(!status.is_searchable());
        }
        assert!(DatasetStatus::ReadyForSearch.is_searchable());
    }

    #[test]
    fn test_status_predicates() {
        assert!(DatasetStatus::TriplesLoading.is_in_progress());
        assert!(DatasetStatus::Training.is_in_progress());
        assert!(DatasetStatus::IndexBuilding.is_in_progress());
        assert!(!DatasetStatus::Empty.is_in_progress());
        assert!(!DatasetStatus::ReadyForSearch.is_in_progress());

        assert!(DatasetStatus::Empty.is_untrained());
        assert!(DatasetStatus::UntrainedWithTriples.is_untrained());
        assert!(!DatasetStatus::TrainedUnindexed.is_untrained());

        assert!(DatasetStatus::TrainedUnindexed.is_trained());
        assert!(DatasetStatus::ReadyForSearch.is_trained());
        assert!(!DatasetStatus::UntrainedWithTriples.is_trained());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(DatasetStatus::Empty.to_string(), "empty");
        assert_eq!(
            DatasetStatus::UntrainedWithTriples.to_string(),
            "untrained_with_triples"
        );
        assert_eq!(DatasetStatus::ReadyForSearch.to_string(), "ready_for_search");
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&DatasetStatus::TrainedUnindexed).unwrap();
        assert_eq!(json, "\"TRAINED_UNINDEXED\"");

        let status: DatasetStatus = serde_json::from_str("\"TRIPLES_LOADING\"").unwrap();
        assert_eq!(status, DatasetStatus::TriplesLoading);
    }

    #[test]
    fn test_kind_ids_are_stable() {
        assert_eq!(DatasetKind::Generic.id(), 0);
        assert_eq!(DatasetKind::Wikidata.id(), 1);
        for kind in DatasetKind::ALL {
            assert_eq!(DatasetKind::from_id(kind.id()), Some(kind));
        }
        assert!(DatasetKind::from_id(2).is_none());
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!(DatasetKind::parse("generic"), Some(DatasetKind::Generic));
        assert_eq!(DatasetKind::parse("dataset"), Some(DatasetKind::Generic));
        assert_eq!(DatasetKind::parse("Wikidata"), Some(DatasetKind::Wikidata));
        assert_eq!(DatasetKind::parse("WIKIDATA"), Some(DatasetKind::Wikidata));
        assert!(DatasetKind::parse("freebase").is_none());
    }

    #[test]
    fn test_view_from_record_omits_counts() {
        let record = DatasetRecord {
            id: 7,
            kind: DatasetKind::Wikidata,
            status: DatasetStatus::UntrainedWithTriples,
            binary_dataset: "dataset_7.bin".to_string(),
            binary_model: String::new(),
            binary_index: String::new(),
            embedding_size: 0,
        };

        let view = DatasetView::from_record(&record);
        assert_eq!(view.id, 7);
        assert_eq!(view.status_code, 1);
        assert!(view.entities.is_none());

        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("entities").is_none());
        assert_eq!(json["status"], "UNTRAINED_WITH_TRIPLES");
    }

    #[test]
    fn test_view_with_stats_carries_counts() {
        let record = DatasetRecord {
            id: 7,
            kind: DatasetKind::Generic,
            status: DatasetStatus::UntrainedWithTriples,
            binary_dataset: "dataset_7.bin".to_string(),
            binary_model: String::new(),
            binary_index: String::new(),
            embedding_size: 0,
        };

        let view = DatasetView::from_record(&record).with_stats(BinaryStats {
            entities: 400,
            relations: 12,
            triples: 9000,
        });
        assert_eq!(view.entities, Some(400));
        assert_eq!(view.relations, Some(12));
        assert_eq!(view.triples, Some(9000));
    }

    #[test]
    fn test_operation_edges() {
        let rules = TransitionRules::new();

        let generate = rules.edges(JobKind::GenerateTriples);
        assert_eq!(generate.required, DatasetStatus::Empty);
        assert_eq!(generate.in_progress, DatasetStatus::TriplesLoading);
        assert_eq!(generate.on_success, DatasetStatus::UntrainedWithTriples);
        assert_eq!(generate.on_failure, DatasetStatus::Empty);

        let train = rules.edges(JobKind::Train);
        assert_eq!(train.required, DatasetStatus::UntrainedWithTriples);
        assert_eq!(train.in_progress, DatasetStatus::Training);
        assert_eq!(train.on_success, DatasetStatus::TrainedUnindexed);
        assert_eq!(train.on_failure, DatasetStatus::UntrainedWithTriples);

        let index = rules.edges(JobKind::BuildSearchIndex);
        assert_eq!(index.required, DatasetStatus::TrainedUnindexed);
        assert_eq!(index.in_progress, DatasetStatus::IndexBuilding);
        assert_eq!(index.on_success, DatasetStatus::ReadyForSearch);
        assert_eq!(index.on_failure, DatasetStatus::TrainedUnindexed);
    }

    #[test]
    fn test_valid_transitions() {
        let rules = TransitionRules::new();

        assert!(rules.can_transition(DatasetStatus::Empty, DatasetStatus::TriplesLoading));
        assert!(rules.can_transition(
            DatasetStatus::TriplesLoading,
            DatasetStatus::UntrainedWithTriples
        ));
        assert!(rules.can_transition(DatasetStatus::TriplesLoading, DatasetStatus::Empty));
        assert!(rules.can_transition(
            DatasetStatus::UntrainedWithTriples,
            DatasetStatus::Training
        ));
        assert!(rules.can_transition(DatasetStatus::Training, DatasetStatus::TrainedUnindexed));
        assert!(rules.can_transition(
            DatasetStatus::Training,
            DatasetStatus::UntrainedWithTriples
        ));
        assert!(rules.can_transition(
            DatasetStatus::TrainedUnindexed,
            DatasetStatus::IndexBuilding
        ));
        assert!(rules.can_transition(
            DatasetStatus::IndexBuilding,
            DatasetStatus::ReadyForSearch
        ));
        assert!(rules.can_transition(
            DatasetStatus::IndexBuilding,
            DatasetStatus::TrainedUnindexed
        ));
    }

    #[test]
    fn test_invalid_transitions() {
        let rules = TransitionRules::new();

        // Stages cannot be skipped.
        assert!(!rules.can_transition(DatasetStatus::Empty, DatasetStatus::Training));
        assert!(!rules.can_transition(DatasetStatus::Empty, DatasetStatus::ReadyForSearch));
        assert!(!rules.can_transition(
            DatasetStatus::UntrainedWithTriples,
            DatasetStatus::IndexBuilding
        ));

        // Settled stages never move backwards on their own.
        assert!(!rules.can_transition(DatasetStatus::UntrainedWithTriples, DatasetStatus::Empty));
        assert!(!rules.can_transition(
            DatasetStatus::TrainedUnindexed,
            DatasetStatus::UntrainedWithTriples
        ));

        // Ready for search is terminal.
        for code in [-3, -2, -1, 0, 1, 2, 3] {
            let to = DatasetStatus::from_code(code).unwrap();
            assert!(!rules.can_transition(DatasetStatus::ReadyForSearch, to));
        }
    }
}
