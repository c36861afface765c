//! Application state and composition.

use std::sync::Arc;

use crate::infrastructure::{
    clock::SystemClock,
    config::EngineConfig,
    in_memory::InMemoryBackend,
    ports::AutosaveScheduler,
};
use crate::use_cases::session::{
    FormSession, SessionContext, SessionError, SessionPorts, SessionSettings,
};

/// Main application state.
///
/// Holds the collaborators every form session shares and the engine
/// configuration. Sessions are created per opened questionnaire.
pub struct App {
    pub ports: SessionPorts,
    pub config: EngineConfig,
}

impl App {
    pub fn new(ports: SessionPorts, config: EngineConfig) -> Self {
        Self { ports, config }
    }

    /// Wire every port to one in-memory backend.
    pub fn in_memory(
        backend: Arc<InMemoryBackend>,
        scheduler: Arc<dyn AutosaveScheduler>,
        config: EngineConfig,
    ) -> Self {
        let ports = SessionPorts {
            schema: backend.clone(),
            drafts: backend.clone(),
            submissions: backend.clone(),
            files: backend,
            clock: Arc::new(SystemClock::new()),
            scheduler,
        };
        Self::new(ports, config)
    }

    pub fn settings(&self) -> SessionSettings {
        SessionSettings::from(&self.config)
    }

    /// A fresh, unloaded session.
    pub fn new_session(&self) -> FormSession {
        FormSession::new(self.ports.clone(), self.settings())
    }

    /// Create a session and load it.
    pub async fn open_session(&self, context: SessionContext) -> Result<FormSession, SessionError> {
        let mut session = self.new_session();
        session.load(context).await?;
        Ok(session)
    }
}
