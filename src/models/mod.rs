pub mod application;
pub mod calendar_credential;
pub mod interview_token;
pub mod user;
