pub mod config;
pub mod context;
pub mod dissonance;
pub mod maintenance;
pub mod memory;
pub mod research;
pub mod session;

pub use config::ConfigCommand;
pub use context::{LoadContextCommand, LoadDeferredCommand};
pub use dissonance::DissonanceCommand;
pub use maintenance::{BackfillCommand, IntegrityCommand};
pub use memory::{
    ForgetCommand, HistoryCommand, LinkCommand, RecallCommand, RelatedCommand, RememberCommand,
    SupersedeCommand,
};
pub use research::{CuriousCommand, ResearchCommand};
pub use session::{EndSessionCommand, StartSessionCommand};
