//! pulselog core library: validated values, the log directory, and the
//! shared configuration the daemon's ticker and control interface act on.
//!
//! - [`types`]: [`Filename`], [`Interval`], [`Attribute`]
//! - [`resource`]: [`LogDirectory`] and [`LogFile`]
//! - [`state`]: [`SharedConfig`] and the tick critical section
//! - [`error`]: [`PulseError`]

pub mod error;
pub mod resource;
pub mod state;
pub mod types;

pub use error::PulseError;
pub use resource::{LogDirectory, LogFile};
pub use state::{
    format_message, ConfigSnapshot, ConfigState, IntervalUpdate, SharedConfig, TickOutcome,
    TickReport,
};
pub use types::{Attribute, Filename, Interval, DEFAULT_FILENAME, MAX_FILENAME_LEN};
