//! Shared application state for the HTTP server.

use std::sync::Arc;

use solver::core::types::FinalStatus;
use solver::io::config::SolverConfig;
use solver::io::credentials::Credential;
use solver::io::init::SolverPaths;
use solver::io::llm::{CompletionClient, HttpCompletionClient};
use solver::io::store::RecordStore;
use tokio::sync::{Mutex, broadcast};

/// Events broadcast to SSE clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    ProblemSaved {
        problem_id: String,
        status: FinalStatus,
    },
}

/// Builds a completion client for one credential set.
///
/// The client only lives on the blocking thread running the solve, so it
/// does not need to be `Send`.
pub type ClientFactory =
    Arc<dyn Fn(&Credential) -> anyhow::Result<Box<dyn CompletionClient>> + Send + Sync>;

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub paths: SolverPaths,
    pub config: Arc<SolverConfig>,
    pub credentials: Arc<Vec<Credential>>,
    pub client_factory: ClientFactory,
    /// Held for the duration of a solve; one query runs at a time.
    pub solve_lock: Arc<Mutex<()>>,
    /// Broadcast sender for change events.
    pub event_tx: Arc<broadcast::Sender<ChangeEvent>>,
}

impl AppState {
    pub fn new(
        paths: SolverPaths,
        config: SolverConfig,
        credentials: Vec<Credential>,
        client_factory: ClientFactory,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            paths,
            config: Arc::new(config),
            credentials: Arc::new(credentials),
            client_factory,
            solve_lock: Arc::new(Mutex::new(())),
            event_tx: Arc::new(event_tx),
        }
    }

    /// Factory that talks to the configured completion endpoint.
    pub fn http_client_factory(config: &SolverConfig) -> ClientFactory {
        let llm = config.llm.clone();
        Arc::new(move |credential: &Credential| {
            let client: Box<dyn CompletionClient> =
                Box::new(HttpCompletionClient::new(&llm, credential.clone()));
            Ok(client)
        })
    }

    pub fn store(&self) -> RecordStore {
        RecordStore::new(&self.paths.records_dir)
    }
}
