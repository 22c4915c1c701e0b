use crate::config::neptune_dir;
use crate::conversation::Message;
use crate::error::{Error, Result};
use crate::registry::ModelId;
use crate::session::ChatSession;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub fn default_dir() -> PathBuf {
    neptune_dir().join("transcripts")
}

/// A conversation snapshot written to disk as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub model: ModelId,
    pub saved_at: DateTime<Utc>,
    pub latency_ms: Option<f64>,
    pub messages: Vec<Message>,
}

impl Transcript {
    pub fn from_session(session: &ChatSession) -> Self {
        let conversation = session.conversation();
        Self {
            model: session.model().id,
            saved_at: Utc::now(),
            latency_ms: conversation.latency().map(|d| d.as_secs_f64() * 1000.0),
            messages: conversation.messages().to_vec(),
        }
    }

    pub fn file_name(&self) -> String {
        format!(
            "{}-{}.json",
            self.model,
            self.saved_at.format("%Y%m%dT%H%M%S")
        )
    }

    /// Write into `dir`, creating it if needed. Returns the file path.
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name());
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::parse(format!("serialize transcript: {e}")))?;
        std::fs::write(&path, json)?;
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| Error::parse(format!("transcript {}: {e}", path.display())))
    }
}
