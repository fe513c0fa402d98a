//! Seam traits between the sprocket job store and its collaborators.
//!
//! The store talks to the document database, the scheduler runtime,
//! and the host's serialization capability exclusively through the
//! traits defined here, which keeps every one of them replaceable in
//! tests and deployments alike.

pub mod blob;
pub mod clock;
pub mod document;
pub mod signaler;

pub use blob::{BlobCodec, BlobError, JsonBlobCodec};
pub use clock::{Clock, ManualClock, SystemClock};
pub use document::{
    doc_get_i64, doc_get_str, BackendError, Document, DocumentBackend, DocumentCollection,
    DocumentId, Filter, IndexSpec, Sort, WriteConcern,
};
pub use signaler::{NoopSignaler, SchedulerSignaler};
