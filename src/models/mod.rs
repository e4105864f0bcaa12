pub mod activity_log;
pub mod candidate;
pub mod reset_token;
pub mod user;
