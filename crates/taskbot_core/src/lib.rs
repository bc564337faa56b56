pub mod clock;
pub mod config;
pub mod conversation;
pub mod error;
pub mod lifecycle;
pub mod messages;
pub mod model;
pub mod notify;
pub mod pagination;
pub mod scheduler;
pub mod storage;
