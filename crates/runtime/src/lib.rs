pub mod event_bus;
pub mod mount;
pub mod scheduler;

pub use event_bus::*;
pub use mount::*;
pub use scheduler::*;
