use serde::{Deserialize, Serialize};

use crate::record::collection::SortCriterion;

/// Settings for a single grid. Can be read from json, every field is
/// optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Name the grid reports itself with in events and logs.
    pub name: String,
    /// Fetch a fresh copy of every record before it is saved, instead of
    /// saving on top of the data the row was drawn with.
    pub get_before_put: bool,
    pub no_data_message: String,
    pub loading_message: String,
    /// Ask the renderer for more rows once a removal leaves fewer rows than
    /// this on screen.
    pub fill_threshold: usize,
    pub keep_scroll_position: bool,
    pub sort: Vec<SortCriterion>,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            name: "grid".to_string(),
            get_before_put: true,
            no_data_message: String::new(),
            loading_message: String::new(),
            fill_threshold: 25,
            keep_scroll_position: false,
            sort: Vec::new(),
        }
    }
}

impl GridConfig {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
