mod server;
mod sync_scheduler;

pub use server::*;
pub use sync_scheduler::*;
