pub mod assemble;
pub mod chunking;
pub mod collect;
pub mod config;
pub mod detect;
pub mod error;
pub mod fsio;
pub mod limits;
pub mod ops;
pub mod pattern;
pub mod tree;

pub use assemble::{ContextDocument, DocumentStats, PublishedDocument};
pub use chunking::{ChunkManifest, DEFAULT_LINE_LIMIT};
pub use collect::{FileSelection, number_lines, strip_line_numbers};
pub use config::{DumpSpec, ProjectConfig, ProjectSettings, UpdateAction};
pub use detect::{ProjectType, detect_project_type};
pub use error::{AppError, ItemError, Result};
pub use fsio::{determine_project_root, prepare_root};
pub use limits::EngineLimits;
pub use pattern::{PatternMatcher, matches};
pub use tree::render;
