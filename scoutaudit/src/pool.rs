//! Pool borné pour les sondes sur sockets bloquants (handshakes TLS bruts,
//! RTSP). Les tâches passent par `spawn_blocking` derrière un sémaphore pour
//! ne jamais bloquer le runtime ni ouvrir un nombre illimité de sockets.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::trace;

use crate::errors::AuditError;

#[derive(Debug, Clone)]
pub struct BlockingPool {
    semaphore: Arc<Semaphore>,
    size: usize,
}

impl BlockingPool {
    /// `size` est ramené à au moins 1
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Exécute `job` sur un thread bloquant dès qu'une place se libère.
    pub async fn run<F, T>(&self, job: F) -> Result<T, AuditError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| AuditError::Join(e.to_string()))?;
        trace!("Blocking pool slot acquired");
        Ok(tokio::task::spawn_blocking(job).await?)
    }

    /// Exécute un job par élément, résultats dans l'ordre des éléments.
    ///
    /// Un job en échec n'annule jamais les autres.
    pub async fn run_all<I, F, T>(&self, items: Vec<I>, job: F) -> Vec<Result<T, AuditError>>
    where
        I: Send + 'static,
        F: Fn(I) -> T + Send + Sync + 'static,
        T: Send + 'static,
    {
        let job = Arc::new(job);
        join_all(items.into_iter().map(|item| {
            let job = Arc::clone(&job);
            self.run(move || (*job)(item))
        }))
        .await
    }
}
