pub mod auth;
pub mod generate;
pub mod notifications;
pub mod stories;
pub mod users;
