//! # Upload Handling
//!
//! - **multipart**: pull files out of `multipart/form-data` bodies
//! - **staging**: write an upload to a temp file that is deleted on drop

pub mod multipart;
pub mod staging;

pub use multipart::{read_batch, read_single, UploadedFile};
pub use staging::{suffix_for, StagedUpload};
