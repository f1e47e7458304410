use crate::backend::ImagingBackend;
use crate::error::Result;

use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;
use web_time::SystemTime;

/// Backend identifier of an uploaded study (`file_id` on the wire).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudyId(pub u64);

impl fmt::Display for StudyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Study {
    pub id: StudyId,
    pub name: String,
    pub date: SystemTime,
    /// Storage path reported by the backend, opaque to the viewer
    pub path: Option<String>,
}

/// Studies imported during this session, newest first.
#[derive(Debug, Default)]
pub struct StudyRegistry {
    studies: Vec<Study>,
    selected: Option<StudyId>,
}

impl StudyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a study. Re-registering an id replaces nothing and returns the existing entry.
    pub fn add(&mut self, study: Study) -> &Study {
        match self.studies.iter().position(|s| s.id == study.id) {
            Some(index) => &self.studies[index],
            None => {
                self.studies.insert(0, study);
                &self.studies[0]
            }
        }
    }

    /// Uploads a file and registers the returned study id.
    pub async fn upload<B: ImagingBackend>(
        &mut self,
        backend: &B,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<&Study> {
        let response = backend.upload(file_name, bytes).await?;
        info!("uploaded {file_name} as study {}", response.id);
        Ok(self.add(Study {
            id: response.id,
            name: file_name.to_string(),
            date: SystemTime::now(),
            path: response.file,
        }))
    }

    pub fn studies(&self) -> &[Study] {
        &self.studies
    }

    pub fn get(&self, id: StudyId) -> Option<&Study> {
        self.studies.iter().find(|s| s.id == id)
    }

    /// Selects a registered study; unknown ids leave the selection unchanged.
    pub fn select(&mut self, id: StudyId) -> Option<&Study> {
        let index = self.studies.iter().position(|s| s.id == id)?;
        self.selected = Some(id);
        Some(&self.studies[index])
    }

    pub fn selected(&self) -> Option<&Study> {
        self.selected.and_then(|id| self.get(id))
    }
}
