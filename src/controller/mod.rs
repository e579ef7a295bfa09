//! Client side of the QR display: keeps a kiosk showing a live code,
//! rotating it at expiry and following codes issued elsewhere.

pub mod runner;
pub mod source;
pub mod state;

pub use runner::{ControllerConfig, ControllerError, QrController};
pub use source::{HttpQrSource, QrSessionSource, SourceError};
pub use state::{ControllerSnapshot, ControllerState, DisplayMode};
