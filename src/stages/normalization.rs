//! Normalization stage: reshapes raw listings into a consistent schema.
//!
//! Output records have exactly three fields: `id` (copied unchanged),
//! `title` (whitespace trimmed) and `price_usd` (a number).

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use super::{describe_id, StageError, Transform};
use crate::domain::{Batch, Record, ID_FIELD};

#[derive(Debug, Default)]
pub struct NormalizationStage;

impl NormalizationStage {
    pub fn new() -> Self {
        Self
    }

    fn normalize(record: &Record) -> Result<Record, StageError> {
        let record_id = describe_id(record);

        let id = record.id().cloned().ok_or_else(|| StageError::MissingField {
            record: record_id.clone(),
            field: ID_FIELD.to_string(),
        })?;

        let title = match record.get("title") {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(other) => {
                return Err(StageError::InvalidField {
                    record: record_id,
                    field: "title".to_string(),
                    reason: format!("expected string, got {}", other),
                })
            }
            None => {
                return Err(StageError::MissingField {
                    record: record_id,
                    field: "title".to_string(),
                })
            }
        };

        let price = match record.get("price") {
            Some(Value::String(s)) => parse_price(s).map_err(|reason| StageError::InvalidField {
                record: record_id.clone(),
                field: "price".to_string(),
                reason,
            })?,
            Some(Value::Number(n)) => n
                .as_f64()
                .filter(|p| p.is_finite())
                .ok_or_else(|| StageError::InvalidField {
                    record: record_id.clone(),
                    field: "price".to_string(),
                    reason: format!("{} is not a finite number", n),
                })?,
            Some(other) => {
                return Err(StageError::InvalidField {
                    record: record_id,
                    field: "price".to_string(),
                    reason: format!("expected string or number, got {}", other),
                })
            }
            None => {
                return Err(StageError::MissingField {
                    record: record_id,
                    field: "price".to_string(),
                })
            }
        };

        Ok(Record::new()
            .with(ID_FIELD, id)
            .with("title", title)
            .with("price_usd", price))
    }
}

/// Parse a display price such as `"$1,250.00"` into dollars
pub fn parse_price(raw: &str) -> Result<f64, String> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',')
        .collect();

    let price = cleaned
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("'{}' is not a price: {}", raw, e))?;

    if price.is_finite() {
        Ok(price)
    } else {
        Err(format!("'{}' is not a finite price", raw))
    }
}

#[async_trait]
impl Transform for NormalizationStage {
    fn name(&self) -> &str {
        "normalization"
    }

    async fn process(&self, batch: Batch) -> Result<Batch, StageError> {
        info!(stage = self.name(), "Normalizing data");
        let normalized = batch
            .iter()
            .map(Self::normalize)
            .collect::<Result<Batch, _>>()?;
        info!(stage = self.name(), records = normalized.len(), "Normalization complete");
        Ok(normalized)
    }
}
