pub mod conversation;
pub mod file;
pub mod message;
pub mod offer;
pub mod participant;
