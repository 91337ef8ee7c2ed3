pub mod clock;
pub mod command;
pub mod interrupt;
pub mod locker;
pub mod mysql;
pub mod prune;
pub mod remote;
pub mod rsync;
pub mod snapshot;

// Trait-based abstraction for testability
pub mod executor;

// Re-export commonly used types and traits (used by test crate)
pub use clock::Clock;
pub use command::{CommandOutput, Pipeline, Stage, StdoutTarget};
pub use executor::{CommandExecutor, RealExecutor};
pub use interrupt::Interrupt;
pub use prune::{prune, PrunePlan};
pub use remote::{CommandLog, RemoteExecutor};
pub use snapshot::Snapshot;
