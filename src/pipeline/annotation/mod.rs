pub mod orchestrator;
pub mod protocol;
pub mod storage;

pub use orchestrator::{AnnotatedUpload, PosturePipeline};
pub use protocol::{annotate, plan, Primitive};
pub use storage::{base_filename, ImageStore, ALLOWED_EXTENSIONS};

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnnotationError {
    #[error("The file '{0}' is not a supported image type.")]
    UnsupportedType(String),

    #[error("The uploaded file could not be read: {0}")]
    Read(#[source] std::io::Error),

    #[error("The image could not be saved to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("The annotated image could not be encoded: {0}")]
    Encode(String),
}
