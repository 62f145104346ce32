pub mod item;
pub mod queue_record;

pub use item::{GeneratedItem, ItemPayload};
pub use queue_record::{
    BatchParameters, BatchStatus, Difficulty, GenerationKind, ItemStyle, QueueRecord,
};
