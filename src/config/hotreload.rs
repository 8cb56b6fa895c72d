//! §4.10 "Config hot-reload": the settings file is hashed every 5 s; a
//! digest change notifies the scheduler so it can cancel and re-register
//! every job against the new settings.

use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

const POLL_INTERVAL: Duration = Duration::from_secs(5);

fn hash_file(path: &PathBuf) -> Option<String> {
    let bytes = std::fs::read(path).ok()?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Some(format!("{:x}", hasher.finalize()))
}

/// Polls `settings_path` every 5 seconds; sends a unit on `tx` whenever the
/// SHA-256 digest changes from the previously observed one. Runs until the
/// receiver is dropped.
pub async fn watch(settings_path: PathBuf, tx: mpsc::Sender<()>) {
    let mut last = hash_file(&settings_path);
    loop {
        tokio::time::sleep(POLL_INTERVAL).await;
        let current = hash_file(&settings_path);
        if current != last {
            tracing::info!(path = %settings_path.display(), "settings file changed, signalling reload");
            last = current;
            if tx.send(()).await.is_err() {
                return;
            }
        }
    }
}
