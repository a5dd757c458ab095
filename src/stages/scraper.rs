//! Collection stage.
//!
//! Real data-source integrations are out of scope; this source emits a fixed
//! sample of auction listings so the rest of the pipeline has data to work on.

use async_trait::async_trait;
use tracing::info;

use super::{Source, StageError};
use crate::domain::{Batch, Record};

/// Source stage that collects auction listings
pub struct ScraperStage {
    listings: Batch,
}

impl Default for ScraperStage {
    fn default() -> Self {
        Self::new()
    }
}

impl ScraperStage {
    /// Create a scraper that yields the built-in sample listings
    pub fn new() -> Self {
        Self {
            listings: vec![
                Record::new()
                    .with("id", 1)
                    .with("title", "Antique Vase")
                    .with("price", "$100"),
                Record::new()
                    .with("id", 2)
                    .with("title", "Vintage Watch")
                    .with("price", "$250"),
            ],
        }
    }

    /// Create a scraper that yields the given listings
    pub fn with_listings(listings: Batch) -> Self {
        Self { listings }
    }
}

#[async_trait]
impl Source for ScraperStage {
    fn name(&self) -> &str {
        "scraper"
    }

    async fn collect(&self) -> Result<Batch, StageError> {
        info!(stage = self.name(), "Starting scrape");
        let batch = self.listings.clone();
        info!(stage = self.name(), records = batch.len(), "Scrape finished");
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_listings_have_ids() {
        let batch = ScraperStage::new().collect().await.unwrap();
        assert_eq!(batch.len(), 2);
        assert!(batch.iter().all(|r| r.id().is_some()));
    }
}
