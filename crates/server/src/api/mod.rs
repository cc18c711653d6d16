pub mod handlers;
pub mod history;
pub mod jobs;
pub mod requests;
pub mod routes;
pub mod uploads;

pub use routes::create_router;
