pub mod clock;
pub mod entries;
pub mod locations;
pub mod reports;
pub mod users;
