use crate::api::{create_router, AppState};
use axum::Router;
use rewind_core::CommitLog;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;

pub struct RewindServer {
    root_path: PathBuf,
    state: AppState,
}

impl RewindServer {
    pub fn new(root_path: PathBuf) -> anyhow::Result<Self> {
        let state = AppState::open(&root_path)?;
        Ok(Self { root_path, state })
    }

    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    pub async fn serve(self, addr: SocketAddr) -> anyhow::Result<()> {
        let head = {
            let storage = self
                .state
                .storage
                .lock()
                .map_err(|_| anyhow::anyhow!("storage mutex poisoned"))?;
            storage.head()?.map(|c| c.short_hash().to_string())
        };

        let app = self.router();

        info!("Server listening on {}", addr);
        info!("Repository: {:?}", self.root_path);
        info!("HEAD: {}", head.as_deref().unwrap_or("(empty)"));
        if self.state.config.api.require_auth {
            info!("Bearer token required");
        }

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewind_core::config::{database_path, STATE_DIR};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_server_creation() {
        let temp_dir = TempDir::new().unwrap();
        let server = RewindServer::new(temp_dir.path().to_path_buf());

        assert!(server.is_ok());
        assert!(temp_dir.path().join(STATE_DIR).is_dir());
        assert!(database_path(temp_dir.path()).exists());
    }
}
