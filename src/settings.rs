//! Settings for Image Stash
//!
//! Process-wide user preferences: download layout, filename template, rename
//! default, and display preferences. Loaded once from the `settings` storage
//! slot, mutated by the user, persisted externally.

use serde::{Deserialize, Serialize};

/// Default directory label for ungrouped images in the download tree.
pub const DEFAULT_UNGROUPED_DIRECTORY: &str = "Ungrouped";

/// Layout of the image list, which determines the axis insertion indices are
/// calculated along (vertical for list, horizontal for grid rows).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Grid,
    List,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    System,
    Light,
    Dark,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base directory under the browser download root; empty for the root itself.
    pub download_directory: String,
    pub filename_template: String,
    /// Default conflict behavior: rename colliding files rather than overwrite.
    pub auto_rename: bool,
    /// Show the plan preview and ask before executing a batch.
    pub confirm_download: bool,
    /// Directory label for the ungrouped pseudo-group.
    pub ungrouped_directory: String,
    pub view_mode: ViewMode,
    pub theme: Theme,
    /// Concurrency bound for parallel batch execution.
    pub parallel_downloads: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            download_directory: String::new(),
            filename_template: "{name}".to_string(),
            auto_rename: true,
            confirm_download: true,
            ungrouped_directory: DEFAULT_UNGROUPED_DIRECTORY.to_string(),
            view_mode: ViewMode::default(),
            theme: Theme::default(),
            parallel_downloads: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.filename_template, "{name}");
        assert!(settings.auto_rename);
        assert_eq!(settings.ungrouped_directory, "Ungrouped");
        assert_eq!(settings.parallel_downloads, 5);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"filename_template":"{group}_{index}","auto_rename":false}"#)
                .unwrap();
        assert_eq!(settings.filename_template, "{group}_{index}");
        assert!(!settings.auto_rename);
        assert_eq!(settings.view_mode, ViewMode::Grid);
        assert_eq!(settings.download_directory, "");
    }
}
