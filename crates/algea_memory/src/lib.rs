pub mod episodic;
pub mod snapshot;

pub use episodic::{EpisodicMemory, Fear, MemoryRecord, Recollection};
pub use snapshot::Snapshot;
