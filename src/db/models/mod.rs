//! Database models split into separate files.
//! Types are re-exported at `crate::db::models` (and `crate::db`).

pub mod booking;
pub mod notification;
pub mod user;

pub use self::booking::*;
pub use self::notification::*;
pub use self::user::*;
