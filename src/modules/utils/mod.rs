pub mod io;
pub mod logging;
pub mod time;

pub use logging::{format_sensitive, initialize_logging, log_reset_event, log_store_operation};
pub use time::{Clock, Deadline, SystemClock};
