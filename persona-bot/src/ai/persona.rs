use std::path::{Path, PathBuf};

/// The character's persona prompt, read from disk on every use so edits
/// to the file apply without a restart.
#[derive(Debug, Clone)]
pub struct PersonaFile {
    path: PathBuf,
}

impl PersonaFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persona text. Missing, unreadable or empty files yield `None`.
    pub fn load(&self) -> Option<String> {
        if !self.path.exists() {
            log::error!("[PERSONA] Persona file not found: {}", self.path.display());
            return None;
        }

        match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => {
                log::error!("[PERSONA] Persona file is empty: {}", self.path.display());
                None
            }
            Ok(content) => {
                log::info!("[PERSONA] Loaded persona from {}", self.path.display());
                Some(content)
            }
            Err(e) => {
                log::error!("[PERSONA] Failed to read {}: {}", self.path.display(), e);
                None
            }
        }
    }
}
