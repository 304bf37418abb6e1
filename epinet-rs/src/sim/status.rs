use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Running,
    Completed,
    Failed,
}

/// The status document rewritten each tick so outside watchers can follow
/// the run: `{id, name, status, progress, detail}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    pub id: String,
    pub name: String,
    pub status: StatusKind,
    /// 0 to 100.
    pub progress: f64,
    pub detail: String,
}

impl Status {
    pub fn new(name: &str) -> Status {
        Status {
            id: "epinet".to_string(),
            name: name.to_string(),
            status: StatusKind::Running,
            progress: 0.0,
            detail: format!("{}: Running", name),
        }
    }

    pub fn update(&mut self, progress: f64) {
        self.status = StatusKind::Running;
        self.progress = progress.clamp(0.0, 100.0);
    }

    pub fn complete(&mut self) {
        self.status = StatusKind::Completed;
        self.progress = 100.0;
        self.detail = format!("{}: Completed", self.name);
    }

    pub fn fail(&mut self) {
        self.status = StatusKind::Failed;
        self.detail = format!("{}: Failed", self.name);
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), text)?;
        Ok(())
    }
}

/// Prefer the conventional `/job` and `/output` directories when they are
/// writable, falling back to the configured or default path.
pub fn preferred_path(configured: Option<&Path>, file_name: &str, preferred_dir: &str) -> PathBuf {
    if let Some(path) = configured {
        return path.to_path_buf();
    }
    let preferred = Path::new(preferred_dir);
    if preferred.is_dir()
        && fs::metadata(preferred)
            .map(|m| !m.permissions().readonly())
            .unwrap_or(false)
    {
        return preferred.join(file_name);
    }
    PathBuf::from(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle() {
        let mut status = Status::new("sim");
        assert_eq!(status.status, StatusKind::Running);

        status.update(55.0);
        assert_eq!(status.progress, 55.0);

        status.complete();
        assert_eq!(status.status, StatusKind::Completed);
        assert_eq!(status.detail, "sim: Completed");

        status.fail();
        assert_eq!(status.detail, "sim: Failed");
    }

    #[test]
    fn progress_is_clamped() {
        let mut status = Status::new("sim");
        status.update(150.0);
        assert_eq!(status.progress, 100.0);
        status.update(-5.0);
        assert_eq!(status.progress, 0.0);
    }

    #[test]
    fn json_shape() {
        let status = Status::new("sim");
        let text = serde_json::to_string(&status).unwrap();
        assert!(text.contains(r#""status":"running""#));
    }
}
