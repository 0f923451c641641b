pub mod assign;
pub mod init;
pub mod kinds;
pub mod log;
pub mod record;
pub mod retarget;
pub mod show;
pub mod trail_helpers;
