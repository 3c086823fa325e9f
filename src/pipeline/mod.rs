//! Request pipeline stages.
//!
//! Each stage is a value produced by consuming the previous one, so a stage
//! cannot run before its predecessor finished and no request state is shared
//! or mutated behind the pipeline's back. Any stage may fail with a
//! [`crate::error::RequestError`], which ends the request.
//!
//! ## Data Flow
//!
//! ```text
//! ConversionRequest ──▶ SourceChecked ──▶ TempAllocated ──▶ SourceFetched
//!   (validated)          (HEAD)           (temp file)       (GET → file)
//!
//!            ──▶ ConvertedRead ──▶ Stored
//!                (engine + read)    (PUT)
//! ```
//!
//! 1. [`source`]: look up the source object, allocate its temp file,
//!    stream the body into it (codes 3–6)
//! 2. [`conversion`]: run the engine and read the converted bytes
//!    (codes 7–9)
//! 3. [`destination`]: name the converted object, merge metadata, store it
//!    (code 10)
//!
//! Temp files travel inside the stage values; dropping a stage (on failure)
//! deletes them.

pub mod conversion;
pub mod destination;
pub mod source;

pub use conversion::ConvertedRead;
pub use destination::Stored;
pub use source::{check_source, SourceChecked, SourceFetched, TempAllocated};
