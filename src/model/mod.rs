pub mod attendance;
pub mod employee;
pub mod qr_session;
pub mod role;
