use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crawl_protocol::messages::WorkerRole;
use crawl_store::Store;

use crate::process_manager::ProcessManager;

#[derive(Clone)]
pub struct AppState {
    pub inner: Arc<AppStateInner>,
}

pub struct AppStateInner {
    pub store: Mutex<Store>,
    pub processes: Mutex<HashMap<(WorkerRole, String), ProcessManager>>,
    pub worker_bin: PathBuf,
    pub dispatcher_addr: String,
}

impl AppState {
    pub fn new(store: Store, worker_bin: PathBuf, dispatcher_addr: String) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                store: Mutex::new(store),
                processes: Mutex::new(HashMap::new()),
                worker_bin,
                dispatcher_addr,
            }),
        }
    }
}
