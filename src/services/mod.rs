pub mod emissions;
pub mod notifications;
pub mod profiles;
pub mod requests;
pub mod trips;
