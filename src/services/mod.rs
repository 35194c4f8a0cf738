pub mod calendar;
pub mod email_service;
pub mod response_service;
pub mod scheduler_service;
pub mod token_service;
