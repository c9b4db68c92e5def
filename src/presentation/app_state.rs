// Application state for HTTP handlers
use crate::application::growth_service::GrowthService;

#[derive(Clone)]
pub struct AppState {
    pub growth_service: GrowthService,
}
