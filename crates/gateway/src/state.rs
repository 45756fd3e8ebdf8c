use inference::InferenceService;

#[derive(Clone)]
pub struct AppState {
    pub service: InferenceService,
}

impl AppState {
    pub fn new(service: InferenceService) -> Self {
        Self { service }
    }
}
