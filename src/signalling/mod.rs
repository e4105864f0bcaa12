pub mod hub;
pub mod ws;
