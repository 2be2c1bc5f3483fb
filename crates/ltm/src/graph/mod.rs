//! Memory graph: similarity linking, traversal and embedding backfill

mod backfill;
mod linker;
mod traversal;

pub use backfill::{BackfillReport, backfill_embeddings};
pub use linker::{LinkReport, Linker};
pub use traversal::{LinkedMemory, linked_memories, supersession_chain};
