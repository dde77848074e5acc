pub mod annotation;
pub mod outcome;
pub mod request;
pub mod work_item;

pub use annotation::{AnnotationRecord, Assessment, Subgroup};
pub use outcome::{ErrorKind, ErrorRecord, StoredEntry};
pub use request::AnnotationRequest;
pub use work_item::{WorkGroup, WorkItem};
