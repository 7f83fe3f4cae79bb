use anyhow::Context;
use std::path::Path;

/// Class-id to display-name table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Labels {
    names: Vec<String>,
}

impl Labels {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// One name per line, blank lines skipped.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read labels from {}", path.display()))?;

        let labels = Self::from_names(
            contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty()),
        );
        tracing::info!(count = labels.len(), path = %path.display(), "Loaded class labels");
        Ok(labels)
    }

    pub fn name(&self, class_id: usize) -> String {
        self.names
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", class_id))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
