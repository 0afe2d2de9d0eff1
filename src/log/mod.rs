use fs_err as fs;
use std::path::{Path, PathBuf};
use tracing::Level;
use uuid::Uuid;

/// Install the stderr subscriber. `debug` lowers the level to DEBUG.
pub fn init_tracing(debug: bool) {
    let level = if debug { Level::DEBUG } else { Level::INFO };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

pub struct SavedPaths {
    pub dir: PathBuf,
    pub request: Option<PathBuf>,
    pub response: Option<PathBuf>,
}

/// Where per-request prompt/response transcripts go, and which halves to keep.
#[derive(Debug, Clone)]
pub struct ArtifactLog {
    pub root: PathBuf,
    pub save_request: bool,
    pub save_response: bool,
}

fn tx_dir(root: &Path, tx: Uuid) -> PathBuf {
    root.join("tx").join(tx.to_string())
}

impl ArtifactLog {
    pub fn new(root: impl Into<PathBuf>, save_request: bool, save_response: bool) -> Option<Self> {
        (save_request || save_response).then(|| Self { root: root.into(), save_request, save_response })
    }

    pub fn tx_dir(&self, tx: Uuid) -> PathBuf {
        tx_dir(&self.root, tx)
    }

    /// Write `<stage>.prompt.txt` / `<stage>.response.txt` under the transaction directory.
    pub fn save_stage(
        &self,
        stage: &str,
        prompt: &str,
        response: Option<&str>,
        tx: Uuid,
    ) -> std::io::Result<SavedPaths> {
        let dir = self.tx_dir(tx);
        fs::create_dir_all(&dir)?;

        let mut request_path = None;
        let mut response_path = None;

        if self.save_request {
            let p = dir.join(format!("{stage}.prompt.txt"));
            fs::write(&p, prompt)?;
            request_path = Some(p);
        }

        if let (true, Some(text)) = (self.save_response, response) {
            let p = dir.join(format!("{stage}.response.txt"));
            fs::write(&p, text)?;
            response_path = Some(p);
        }

        Ok(SavedPaths { dir, request: request_path, response: response_path })
    }

    /// Best-effort variant: a transcript that cannot be written is logged, not fatal.
    pub fn record(&self, stage: &str, prompt: &str, response: Option<&str>, tx: Uuid) {
        match self.save_stage(stage, prompt, response, tx) {
            Ok(saved) => {
                if let Some(p) = &saved.request {
                    tracing::debug!("[{stage}] prompt saved at {}", p.display());
                }
                if let Some(p) = &saved.response {
                    tracing::debug!("[{stage}] response saved at {}", p.display());
                }
            }
            Err(e) => tracing::warn!("[{stage}] could not save transcript: {e}"),
        }
    }
}
