pub mod breakpoint;
pub mod core;
pub mod events;
pub mod log_message;
pub mod session;
pub mod targets;
pub mod timer;
