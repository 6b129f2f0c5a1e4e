//! Ambient runtime primitives shared by the rest of the workspace: atomic
//! config swap, cooperative shutdown, and the task supervisor.

pub mod arc;
pub mod signal;
pub mod supervisor;

pub use arc::{atomic, atomic_option_empty, Atomic, AtomicOption};
pub use signal::{ShutdownTrigger, ShutdownWatcher};
pub use supervisor::{Supervisor, SupervisorError, Task};
