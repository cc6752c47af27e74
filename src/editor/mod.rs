//! Appending revisions to an existing PDF.
//!
//! ```text
//! PdfDocument (read-only source)
//!     ↓
//! [IncrementalUpdate] (queued new/replaced objects)
//!     ↓
//! original bytes + objects + xref section + trailer
//! ```

mod incremental;

pub use incremental::{IncrementalUpdate, WrittenUpdate};
