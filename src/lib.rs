//! Image Stash core: download planning and naming for a browser image collector
//!
//! The crate owns everything between "a pile of collected image URLs" and "a
//! conflict-resolved, directory-structured download plan, executed":
//!
//! 1. [`collection`] — groups, ungrouped images, selection, and the drag /
//!    drop-intent state machine that mutates them
//! 2. [`template`] — the filename template engine and URL name extraction
//! 3. [`planner`] — flattening a collection snapshot into an ordered plan
//! 4. [`conflict`] — path-collision flagging and the preview tree
//! 5. [`executor`] — sequential or bounded-parallel issuance of the plan
//!    through an injected download capability
//! 6. [`storage`] — async key-value persistence collaborator
//!
//! Browser surfaces (DOM, downloads API, extension storage) stay outside;
//! they implement the [`storage::Storage`] and [`executor::DownloadService`]
//! traits and feed pointer geometry into the collection state machine.

pub mod collection;
pub mod conflict;
pub mod executor;
pub mod logging;
pub mod planner;
pub mod settings;
pub mod storage;
pub mod template;

// Re-export commonly used types for convenience
pub use collection::{
    Collection, CollectionError, CollectionResult, CollectionState, DragState, DropOutcome,
    DropResolution, Group, GroupId, ImageItem, ImageSource, PendingDropIntent,
    calculate_insertion_index,
};

pub use template::{TemplateContext, apply_template, sanitize_component, stem_and_extension};

pub use conflict::{
    DirectoryNode, PlanEntry, PlanStats, RenamePolicy, TreeFile, build_tree, detect_conflicts,
    make_unique, plan_stats,
};

pub use planner::{IndexScope, build_plan, build_plan_at, build_plan_for};

pub use executor::{
    AbortHandle, BatchSummary, ConflictAction, DownloadFailure, DownloadId, DownloadRequest,
    DownloadService, DownloadServiceError, Executor, ExecutorError, ExecutorResult, ProgressFn,
};

pub use settings::{Settings, Theme, ViewMode};

pub use storage::{
    CollectionStore, KEY_GROUPS, KEY_SETTINGS, KEY_UNGROUPED, MemoryStorage, Storage, StorageError,
    StorageResult,
};

pub use logging::{LogOptions, LoggingError, LoggingResult, init_logging};
