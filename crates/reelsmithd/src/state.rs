//! Application state.

use std::sync::Arc;

use reelsmith_core::artifact::FsArtifactStore;
use reelsmith_core::handbook::Catalog;
use reelsmith_core::jobs::JobRegistry;
use reelsmith_core::pipeline::{PipelineFactory, StudioFactory};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Submitted jobs and their live status.
    pub registry: JobRegistry,

    /// Workspace root; each job's artifacts live in `<root>/<job id>`.
    pub workspace: FsArtifactStore,
}

impl AppState {
    pub fn new(factory: Arc<dyn PipelineFactory>, catalog: Catalog, workspace: FsArtifactStore) -> Self {
        Self {
            registry: JobRegistry::new(factory, catalog),
            workspace,
        }
    }

    /// State backed by the production pipeline.
    pub fn from_factory(factory: StudioFactory) -> Self {
        let catalog = factory.catalog();
        let workspace = factory.workspace().clone();
        Self::new(Arc::new(factory), catalog, workspace)
    }
}
