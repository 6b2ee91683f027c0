//! Elapsed recording time value object

use std::fmt;

const MS_PER_HOUR: u64 = 3_600_000;
const MS_PER_MINUTE: u64 = 60_000;
const MS_PER_SECOND: u64 = 1000;
const MS_PER_DECISECOND: u64 = 100;

/// Elapsed time decomposed into display units.
///
/// Rendered as `[h:][mm:]ss:d`: hours only when non-zero, minutes when
/// non-zero or when hours are shown. A zero duration renders as `0:0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ElapsedTime {
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
    pub deciseconds: u64,
}

impl ElapsedTime {
    pub const fn from_millis(ms: u64) -> Self {
        let hours = ms / MS_PER_HOUR;
        let rem = ms - hours * MS_PER_HOUR;
        let minutes = rem / MS_PER_MINUTE;
        let rem = rem - minutes * MS_PER_MINUTE;
        let seconds = rem / MS_PER_SECOND;
        let rem = rem - seconds * MS_PER_SECOND;
        let deciseconds = rem / MS_PER_DECISECOND;

        Self {
            hours,
            minutes,
            seconds,
            deciseconds,
        }
    }

    /// Milliseconds covered by the displayed units (drops the sub-decisecond remainder)
    pub const fn as_millis(&self) -> u64 {
        self.hours * MS_PER_HOUR
            + self.minutes * MS_PER_MINUTE
            + self.seconds * MS_PER_SECOND
            + self.deciseconds * MS_PER_DECISECOND
    }
}

impl fmt::Display for ElapsedTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hours > 0 {
            write!(
                f,
                "{}:{:02}:{:02}:{}",
                self.hours, self.minutes, self.seconds, self.deciseconds
            )
        } else if self.minutes > 0 {
            write!(f, "{}:{:02}:{}", self.minutes, self.seconds, self.deciseconds)
        } else {
            write!(f, "{}:{}", self.seconds, self.deciseconds)
        }
    }
}

/// Format a millisecond count for the elapsed-time display
pub fn format_elapsed(ms: u64) -> String {
    ElapsedTime::from_millis(ms).to_string()
}
