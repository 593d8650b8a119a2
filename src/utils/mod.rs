pub mod db_utils;
pub mod entry_filter;
pub mod export;
pub mod ip_utils;
pub mod time_utils;
