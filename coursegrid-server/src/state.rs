use std::{path::Path, sync::Arc};

use coursegrid_core::{
    Result,
    memory::{LogPublisher, MemoryStore},
    service::ScheduleService,
    snapshot::ChangeRecorder,
};

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub service: ScheduleService,
    pub store: Arc<MemoryStore>,
}

pub(crate) fn init_from_path(path: impl AsRef<Path>) -> Result<AppState> {
    let path = path.as_ref();
    tracing::info!("Loading schedule dataset: {}", path.display());

    let store = Arc::new(MemoryStore::from_path(path)?);
    let recorder = ChangeRecorder::new(store.clone(), Arc::new(LogPublisher));
    let service = ScheduleService::new(store.clone(), store.clone(), recorder);

    Ok(AppState { service, store })
}
