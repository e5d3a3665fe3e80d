// Path: crates/storage/src/codec.rs

//! Record serialization for the redb backend.

use wot_api::store::StoreError;
use wot_types::records::Record;

pub(crate) fn encode(rec: &Record) -> Result<Vec<u8>, StoreError> {
    bincode::serialize(rec).map_err(|e| StoreError::Encode(e.to_string()))
}

pub(crate) fn decode(bytes: &[u8]) -> Result<Record, StoreError> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Decode(e.to_string()))
}
