use serde::{Deserialize, Serialize};

/// One feed row, immutable once constructed.
///
/// `id` is the record's identity and must be unique in the store;
/// `entity_id` references an entity the directory already knows.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Record {
    pub id: String,
    pub entity_id: String,
    /// Free-text payload; opaque to the pipeline.
    pub body: String,
}

/// Ordered group of records, the atomic unit of validation and
/// dispatch. Never split once produced.
pub type Batch = Vec<Record>;
