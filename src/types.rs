use serde::{Deserialize, Serialize};

/// One decoded video frame, RGB byte order, row-major.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
    /// Seconds since the start of the clip (or capture session).
    pub timestamp: f64,
}

impl Frame {
    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }
}

/// Per-frame feature array. Spatial and motion features are stored
/// separately on disk and concatenated at corpus-load time.
pub type FeatureVector = Vec<f32>;

/// Class-id assignment for a corpus. Ids are positions in the sorted,
/// deduplicated class-name list. The ordering is load-bearing: it is
/// persisted in the checkpoint sidecar so training and inference can
/// never disagree about which id means which sign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassMap {
    names: Vec<String>,
}

impl ClassMap {
    pub fn from_names(mut names: Vec<String>) -> Self {
        names.sort();
        names.dedup();
        Self { names }
    }

    pub fn id_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn name_of(&self, id: usize) -> Option<&str> {
        self.names.get(id).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// Result of one classifier forward pass over a single window.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub class_id: usize,
    /// Softmax probability of the predicted class.
    pub confidence: f32,
}
