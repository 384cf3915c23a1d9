use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use devicelock_core::platform::ProcessControl;
use tempfile::tempdir;

use crate::config::ControllerConfig;
use crate::context::{build_context_with, ServiceContext};

#[derive(Default)]
pub struct RecordingProcess {
    terminated: AtomicBool,
}

impl RecordingProcess {
    pub fn terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }
}

impl ProcessControl for RecordingProcess {
    fn terminate_quietly(&self) {
        self.terminated.store(true, Ordering::SeqCst);
    }
}

/// Controller backed by a fresh database and the debug transport.
pub fn debug_context() -> (Arc<ServiceContext>, Arc<RecordingProcess>) {
    let dir = tempdir().expect("tempdir").keep();
    let vars: HashMap<&str, String> = HashMap::from([
        ("DEVICELOCK_DATA_DIR", dir.to_string_lossy().to_string()),
        ("DEVICELOCK_DEBUG", "true".to_string()),
        ("DEVICELOCK_IMEI", "490154203237518".to_string()),
    ]);
    let config = ControllerConfig::from_lookup(|key| vars.get(key).cloned()).expect("config");
    let process = Arc::new(RecordingProcess::default());
    let context = build_context_with(config, process.clone()).expect("context");
    (context, process)
}
