pub mod controller;
pub mod link;
pub mod messages;
