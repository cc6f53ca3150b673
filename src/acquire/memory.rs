// src/acquire/memory.rs
use crate::acquire::SceneSource;
use crate::error::AnalysisError;
use crate::model::{Scene, TimeWindow};
use crate::raster::GridSpec;

/// In-process scene list. Used by tests and by batch configs that replay
/// pre-resampled scenes; a stand-in for the hosted imagery archive.
#[derive(Debug, Default)]
pub struct MemoryScenes {
    scenes: Vec<Scene>,
}

impl MemoryScenes {
    pub fn new(scenes: Vec<Scene>) -> Self {
        Self { scenes }
    }

    pub fn push(&mut self, scene: Scene) {
        self.scenes.push(scene);
    }
}

impl SceneSource for MemoryScenes {
    fn query(
        &self,
        _grid: &GridSpec,
        window: &TimeWindow,
        _max_cloud_pct: f64,
    ) -> Result<Vec<Scene>, AnalysisError> {
        Ok(self
            .scenes
            .iter()
            .filter(|s| window.contains(s.date))
            .cloned()
            .collect())
    }
}
