pub mod conversation_service;
pub mod message_service;
pub mod notification_service;
pub mod offer_service;
pub mod participant_service;
pub mod push;
pub mod user_directory;
