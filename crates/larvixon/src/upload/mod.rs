//! Upload coordinator: validation, asset storage, record creation and
//! enqueueing.

pub mod chunked;
pub mod coordinator;
pub mod error;
pub mod validation;

pub use chunked::{ChunkError, ChunkStatus, ChunkedUploadStager, ContentRange};
pub use coordinator::{Owner, OwnerId, UploadCoordinator, UploadFile, UploadSource};
pub use error::UploadError;
