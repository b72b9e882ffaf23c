use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::config::DispatchConfig;
use crate::error::Result;
use crate::ocr::{FeatureFlags, OcrEngine};
use crate::processing::{assemble, Dispatcher, Payload, PayloadDecoder, ResponseBody};

/// Runs one `/ocr` request: decode the payload, dispatch every item, and
/// assemble the response.
#[derive(Clone)]
pub struct RecognitionService {
    decoder: PayloadDecoder,
    dispatcher: Arc<Dispatcher>,
}

impl RecognitionService {
    pub fn new(engine: Arc<dyn OcrEngine>, config: &DispatchConfig) -> Self {
        Self {
            decoder: PayloadDecoder::new(config.policy),
            dispatcher: Arc::new(Dispatcher::new(engine, config.max_concurrency)),
        }
    }

    pub async fn recognize(&self, payload: Payload, flags: FeatureFlags) -> Result<ResponseBody> {
        let start = Instant::now();

        let decoded = self.decoder.decode(payload)?;
        let shape = decoded.shape();
        let items = decoded.into_items();
        let total = items.len();

        let outcomes = self.dispatcher.dispatch(items, flags).await;
        let body = assemble(shape, outcomes, self.decoder.policy)?;

        info!(
            shape = ?shape,
            items = total,
            succeeded = body.succeeded(),
            duration_ms = start.elapsed().as_millis() as u64,
            "OCR request complete"
        );

        Ok(body)
    }
}
