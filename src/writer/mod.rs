//! Object serialization and form construction for the incremental update.
//!
//! ```text
//! new Object values
//!     ↓
//! [AcroFormBuilder] (catalog form dictionary)
//!     ↓
//! [ObjectSerializer] (deterministic bytes)
//!     ↓
//! editor::IncrementalUpdate
//! ```

mod acroform;
mod object_serializer;

pub use acroform::{AcroFormBuilder, SigFlags};
pub use object_serializer::ObjectSerializer;
