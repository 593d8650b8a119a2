pub mod clock_action;
pub mod failed_attempt;
pub mod history;
pub mod location;
pub mod role;
pub mod time_entry;
pub mod user;
