pub mod attendance;
pub mod clock;
pub mod qr_session;
pub mod schedule;
