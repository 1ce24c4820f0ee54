//! Validated values that flow through the control interface.
//!
//! Every constructor here validates fully, so holding a [`Filename`] or an
//! [`Interval`] means the value is already safe to store.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PulseError;

/// Longest accepted filename in bytes (`NAME_MAX` on Linux).
pub const MAX_FILENAME_LEN: usize = 255;

/// Name used until the controller sets one.
pub const DEFAULT_FILENAME: &str = "messages";

// ---------------------------------------------------------------------------
// Filename
// ---------------------------------------------------------------------------

/// A single path segment naming the log file inside the log directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Filename(String);

impl Filename {
    /// Parse controller input: strip one trailing line break, then validate.
    pub fn parse(input: &str) -> Result<Self, PulseError> {
        Self::validate(strip_line_break(input))
    }

    /// Validate `name` exactly as given.
    pub fn validate(name: &str) -> Result<Self, PulseError> {
        if name.is_empty() {
            return Err(PulseError::EmptyFilename);
        }
        if name.len() > MAX_FILENAME_LEN {
            return Err(PulseError::FilenameTooLong {
                len: name.len(),
                max: MAX_FILENAME_LEN,
            });
        }
        if name.contains('/') {
            return Err(PulseError::FilenameSeparator {
                name: name.to_owned(),
            });
        }
        if name.contains('\0') {
            return Err(PulseError::FilenameNul);
        }
        if name == "." || name == ".." {
            return Err(PulseError::ReservedFilename {
                name: name.to_owned(),
            });
        }

        Ok(Self(name.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Filename {
    fn default() -> Self {
        Self(DEFAULT_FILENAME.to_owned())
    }
}

impl fmt::Display for Filename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Filename {
    type Err = PulseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Filename {
    type Error = PulseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::validate(&s)
    }
}

impl From<Filename> for String {
    fn from(name: Filename) -> Self {
        name.0
    }
}

// ---------------------------------------------------------------------------
// Interval
// ---------------------------------------------------------------------------

/// Seconds between ticks. Zero disables the timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Interval(u32);

impl Interval {
    pub const DISABLED: Interval = Interval(0);

    pub fn from_secs(secs: u32) -> Self {
        Self(secs)
    }

    /// Parse controller input the way `kstrtouint` does: base 10, an optional
    /// leading `+`, one trailing line break allowed.
    pub fn parse(input: &str) -> Result<Self, PulseError> {
        let digits = strip_line_break(input);
        let digits = digits.strip_prefix('+').unwrap_or(digits);

        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PulseError::InvalidInterval {
                input: input.to_owned(),
            });
        }

        digits
            .parse::<u32>()
            .map(Self)
            .map_err(|_| PulseError::InvalidInterval {
                input: input.to_owned(),
            })
    }

    pub fn secs(self) -> u32 {
        self.0
    }

    pub fn is_disabled(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Interval {
    type Err = PulseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ---------------------------------------------------------------------------
// Attribute
// ---------------------------------------------------------------------------

/// A named value exposed by the control interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Attribute {
    Interval,
    Filename,
    /// Read-only view of the message counter.
    Counter,
}

impl Attribute {
    pub fn name(self) -> &'static str {
        match self {
            Attribute::Interval => "interval",
            Attribute::Filename => "filename",
            Attribute::Counter => "counter",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Attribute {
    type Err = PulseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "interval" | "interval_secs" => Ok(Attribute::Interval),
            "filename" => Ok(Attribute::Filename),
            "counter" => Ok(Attribute::Counter),
            other => Err(PulseError::UnknownAttribute(other.to_owned())),
        }
    }
}

/// Remove exactly one trailing `\n` (or `\r\n`).
fn strip_line_break(input: &str) -> &str {
    input
        .strip_suffix("\r\n")
        .or_else(|| input.strip_suffix('\n'))
        .unwrap_or(input)
}
