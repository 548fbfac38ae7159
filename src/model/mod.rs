pub mod leave_request;
pub mod notification;
pub mod task;
pub mod user;
