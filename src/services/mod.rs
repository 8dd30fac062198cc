pub mod delivery;
pub mod factory;
pub mod init;
pub mod planner;
pub mod reviews;
pub mod scheduler;
pub mod telegram;
