use crate::ingest::ValueList;

#[derive(thiserror::Error, Debug)]
#[error("invalid report body: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

/// Parses a request body into its value lists. Either every entry decodes or
/// the whole body is rejected.
pub fn decode(body: &[u8]) -> Result<Vec<ValueList>, DecodeError> {
    Ok(serde_json::from_slice(body)?)
}
