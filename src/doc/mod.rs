pub mod pack;
pub mod types;

pub use pack::{approx_tokens, pack};
pub use types::{Citation, Document, Page, Query, Segment, SegmentId};
