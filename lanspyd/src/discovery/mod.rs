pub mod announcer;
pub mod listener;
pub mod socket;
