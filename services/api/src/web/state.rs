//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use gamification_core::ports::TokenVerifier;
use gamification_core::GamificationEngine;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<GamificationEngine>,
    pub auth: Arc<dyn TokenVerifier>,
    pub config: Arc<Config>,
}
