//! pulselog daemon: the ticker, the control interface and the socket runtime
//! that exposes it.

pub mod config;
pub mod control;
mod error;
pub mod paths;
pub mod protocol;
mod runtime;
pub mod ticker;

pub use config::DaemonConfig;
pub use control::{ControlInterface, SetReport, StatusReport};
pub use error::DaemonError;
pub use protocol::{
    request_get, request_set, request_status, request_stop, response_into_data, send_request,
    DaemonRequest, DaemonResponse,
};
pub use runtime::{run, start_blocking, StatusPayload};
pub use ticker::{Ticker, TimerPhase};
