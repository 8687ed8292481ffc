// Tally - Domain Layer
// Modules:
// - shared_kernel: domain errors
// - events: review events and their identity
// - jobs: build references, job policies, trigger causes
// - memory: Correlation Store (event imprints)
// - verdict: classification, votes and command rendering
// - ports: collaborator capabilities (environment, workspace, transport, listeners)

pub mod events;
pub mod jobs;
pub mod memory;
pub mod ports;
pub mod shared_kernel;
pub mod verdict;

pub use events::*;
pub use jobs::*;
pub use memory::*;
pub use ports::*;
pub use shared_kernel::*;
pub use verdict::*;
