use std::sync::Arc;

use crate::config::Config;
use crate::ocr::OcrEngine;
use crate::services::RecognitionService;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Built once at startup and shared by every request.
    pub engine: Arc<dyn OcrEngine>,
    pub recognition: RecognitionService,
}

impl AppState {
    pub fn new(config: Config, engine: Arc<dyn OcrEngine>) -> Self {
        let recognition = RecognitionService::new(engine.clone(), &config.dispatch);
        Self {
            config: Arc::new(config),
            engine,
            recognition,
        }
    }
}
