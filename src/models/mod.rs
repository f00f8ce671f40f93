pub mod comment;
pub mod generation;
pub mod notification;
pub mod response;
pub mod story;
pub mod user;
