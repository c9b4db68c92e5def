// Application layer - Use cases over the growth engine
pub mod growth_service;
pub mod request_gate;
pub mod series_cache;
pub mod telemetry_provider;
