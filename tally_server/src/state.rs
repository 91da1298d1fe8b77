use std::sync::Arc;

use tally_core::ledger::intake::UpdateIntake;

#[derive(Clone)]
pub struct AppState {
    pub intake: Arc<UpdateIntake>,
    /// Shared secret for inbound webhook signature verification; `None`
    /// disables enforcement.
    pub signing_secret: Option<String>,
}

impl AppState {
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn new(intake: Arc<UpdateIntake>, signing_secret: Option<String>) -> Self {
        Self {
            intake,
            signing_secret,
        }
    }
}
