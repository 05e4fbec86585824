mod fields;
mod reader;
mod record;

pub use fields::split_fields;
pub use reader::{BatchReader, FeedError, read_entity_ids};
pub use record::{Batch, Record};

/// Column names the record feed must carry in its header row.
pub const COL_RECORD_ID: &str = "RECORD_ID";
pub const COL_ENTITY_ID: &str = "ENTITY_ID";
pub const COL_BODY: &str = "BODY";
