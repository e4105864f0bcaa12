pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod signalling;
pub mod utils;

use crate::services::{
    activity_service::ActivityService, artifact_service::ArtifactService,
    assignment_service::AssignmentService, candidate_service::CandidateService,
    mail_service::MailService, token_service::TokenService, user_service::UserService,
};
use crate::signalling::hub::CallHub;
use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub user_service: UserService,
    pub candidate_service: CandidateService,
    pub assignment_service: AssignmentService,
    pub token_service: TokenService,
    pub mail_service: MailService,
    pub artifact_service: ArtifactService,
    pub activity_service: ActivityService,
    pub call_hub: CallHub,
}

impl AppState {
    pub fn new(pool: PgPool) -> Self {
        let config = crate::config::get_config();

        let mail_service = MailService::new(config);
        let activity_service = ActivityService::new(pool.clone());
        let artifact_service = ArtifactService::new(config.uploads_dir.clone());
        let user_service = UserService::new(pool.clone());
        let candidate_service = CandidateService::new(
            pool.clone(),
            artifact_service.clone(),
            activity_service.clone(),
        );
        let assignment_service = AssignmentService::new(
            pool.clone(),
            mail_service.clone(),
            activity_service.clone(),
        );
        let token_service = TokenService::new(pool.clone());
        let call_hub = CallHub::new();

        Self {
            pool,
            user_service,
            candidate_service,
            assignment_service,
            token_service,
            mail_service,
            artifact_service,
            activity_service,
            call_hub,
        }
    }
}
