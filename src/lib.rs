pub mod adapters;
pub mod domain;
pub mod infra;
pub mod services;

use {
    crate::{
        adapters::verify::EventVerifier,
        domain::{gateway::ProcessorGateway, notify::Notifier},
    },
    std::sync::Arc,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::PgPool,
    pub verifier: EventVerifier,
    pub gateway: Arc<dyn ProcessorGateway>,
    pub notifier: Arc<dyn Notifier>,
}
