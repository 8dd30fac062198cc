pub mod booking;
pub mod notification;
pub mod user;

pub use booking::BookingRepository;
pub use notification::{NotificationFilter, NotificationRepository};
pub use user::UserRepository;
