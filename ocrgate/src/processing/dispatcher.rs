use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::ocr::{FeatureFlags, OcrEngine};

use super::item::{ImageItem, ItemFailure, ItemOutcome, OcrOutcome};

/// Runs each decoded item through the OCR engine.
///
/// Items are independent: one failing never affects the others. Up to
/// `max_concurrency` engine calls are in flight at once and outcomes are
/// returned in input order.
pub struct Dispatcher {
    engine: Arc<dyn OcrEngine>,
    max_concurrency: usize,
}

impl Dispatcher {
    pub fn new(engine: Arc<dyn OcrEngine>, max_concurrency: usize) -> Self {
        Self {
            engine,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub async fn dispatch(&self, items: Vec<ImageItem>, flags: FeatureFlags) -> Vec<ItemOutcome> {
        stream::iter(items)
            .map(|item| self.dispatch_one(item, flags))
            .buffered(self.max_concurrency)
            .collect()
            .await
    }

    async fn dispatch_one(&self, item: ImageItem, flags: FeatureFlags) -> ItemOutcome {
        let name = item.name.as_deref().unwrap_or("<body>").to_string();
        let size = item.size();

        let outcome: OcrOutcome = match item.payload {
            // Never reached the engine; the decoder already logged it.
            Err(failure) => Err(failure),
            Ok(bytes) => {
                let start = Instant::now();
                match self.engine.recognize(&bytes, flags).await {
                    Ok(result) => {
                        info!(
                            name = %name,
                            size,
                            det = flags.detect,
                            rec = flags.recognize,
                            cls = flags.classify,
                            lines = result.lines.len(),
                            result = %serde_json::to_string(&result).unwrap_or_default(),
                            duration_ms = start.elapsed().as_millis() as u64,
                            "OCR item complete"
                        );
                        Ok(result)
                    }
                    Err(e) => {
                        let failure = ItemFailure::from(e);
                        warn!(
                            name = %name,
                            size,
                            det = flags.detect,
                            rec = flags.recognize,
                            cls = flags.classify,
                            error = %failure,
                            "OCR item failed"
                        );
                        Err(failure)
                    }
                }
            }
        };

        ItemOutcome {
            name: item.name,
            outcome,
        }
    }
}
