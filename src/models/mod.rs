pub mod booking;
pub mod position;
pub mod profile;
pub mod rating;
