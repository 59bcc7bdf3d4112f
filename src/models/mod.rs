pub mod candidate;
pub mod entity;
pub mod query;

pub use candidate::{Candidate, CandidateMetadata, ContentType, Source};
pub use entity::{CharacterRow, EntityKind, PlaceRow};
pub use query::{Filters, QueryType, ResponseMetadata, RetrievalResponse, SearchStats};
