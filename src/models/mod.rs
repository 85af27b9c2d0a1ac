pub mod join_request;
pub mod notification;
pub mod session;
pub mod trip;
pub mod user;
