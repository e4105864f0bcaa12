pub mod activity_service;
pub mod artifact_service;
pub mod assignment_service;
pub mod candidate_service;
pub mod mail_service;
pub mod token_service;
pub mod user_service;
