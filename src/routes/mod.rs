pub mod admin_routes;
pub mod auth_routes;
pub mod health;
pub mod hr_routes;
pub mod manager_routes;
