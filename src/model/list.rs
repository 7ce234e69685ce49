use super::{DetachableModel, ModelContext};
use crate::core::{Result, Value};
use crate::detach::DetachConfig;

/// An ordered list of detachable models sharing one configuration.
///
/// Detach and reattach apply to every element; elements never share a
/// walk, so each keeps its own placeholders.
pub struct DetachableListModel {
    models: Vec<DetachableModel>,
    config: DetachConfig,
}

impl DetachableListModel {
    pub fn new() -> Self {
        Self::with_config(DetachConfig::default())
    }

    pub fn with_config(config: DetachConfig) -> Self {
        Self {
            models: Vec::new(),
            config,
        }
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn add(&mut self, object: impl Into<Value>) {
        let mut model = DetachableModel::with_config(self.config.clone());
        model.set_object(object);
        self.models.push(model);
    }

    pub fn remove(&mut self, index: usize) -> Option<DetachableModel> {
        (index < self.models.len()).then(|| self.models.remove(index))
    }

    pub fn clear(&mut self) {
        self.models.clear();
    }

    /// Replaces every element.
    pub fn set_object(&mut self, objects: impl IntoIterator<Item = Value>) {
        self.models.clear();
        for object in objects {
            self.add(object);
        }
    }

    /// Detaches every element. Returns how many elements actually walked.
    pub fn detach(&mut self, cx: &ModelContext<'_>) -> Result<usize> {
        let mut detached = 0;
        for model in &mut self.models {
            if model.detach(cx)? {
                detached += 1;
            }
        }
        Ok(detached)
    }

    pub fn get(&mut self, index: usize, cx: &ModelContext<'_>) -> Result<Option<Value>> {
        match self.models.get_mut(index) {
            Some(model) => model.get_object(cx),
            None => Ok(None),
        }
    }

    /// Reattaches every element. Absent roots read as `Null`.
    pub fn get_object(&mut self, cx: &ModelContext<'_>) -> Result<Vec<Value>> {
        self.models
            .iter_mut()
            .map(|model| Ok(model.get_object(cx)?.unwrap_or(Value::Null)))
            .collect()
    }

    pub fn models(&self) -> &[DetachableModel] {
        &self.models
    }
}

impl Default for DetachableListModel {
    fn default() -> Self {
        Self::new()
    }
}
