pub mod events;
pub mod participant;
pub mod procession;
pub mod relationships;

pub use events::{EventLog, MemoryEventLog, RouteChangeRecord};
pub use participant::{GpsFix, Participant, ParticipantInput};
pub use procession::{Procession, ProcessionState};
pub use relationships::{Relationship, RelationshipMember, RelationshipResolver, RelationshipStore};
