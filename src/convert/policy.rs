//! When to rebuild a derived document.
//!
//! The decision is a pure function of the two modification times, the
//! configured [`RegenerationPolicy`], and today's date, so the whole table is
//! testable without touching the filesystem. [`should_regenerate`] is the thin
//! wrapper that reads the times from disk.
//!
//! Rules, first match wins:
//!
//! | # | condition | regenerate | reason |
//! |---|-----------|------------|--------|
//! | 1 | derived document missing | yes | `absent` |
//! | 2 | policy is `ForceAll` | yes | `forced` |
//! | 3 | policy is `Since(d)` and source modified after `d` 00:00 | yes | `modified-since` |
//! | 4 | derived modified today and `regen_if_created_today` | yes | `created-today` |
//! | 5 | source newer than derived | yes | `source-newer` |
//! | 6 | otherwise | no | `up-to-date` |

use crate::config::RegenerationPolicy;
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime};
use std::fmt;
use std::path::Path;
use std::time::SystemTime;

/// Local modification times of a source and its derived document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileTimes {
    pub source: NaiveDateTime,
    /// `None` when the derived document does not exist.
    pub derived: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    Absent,
    Forced,
    ModifiedSince(NaiveDate),
    CreatedToday,
    SourceNewer,
    UpToDate,
}

impl Reason {
    pub fn code(&self) -> &'static str {
        match self {
            Reason::Absent => "absent",
            Reason::Forced => "forced",
            Reason::ModifiedSince(_) => "modified-since",
            Reason::CreatedToday => "created-today",
            Reason::SourceNewer => "source-newer",
            Reason::UpToDate => "up-to-date",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::ModifiedSince(d) => write!(f, "modified-since {}", d.format("%d/%m/%Y")),
            other => f.write_str(other.code()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub regenerate: bool,
    pub reason: Reason,
}

impl Decision {
    fn yes(reason: Reason) -> Self {
        Self {
            regenerate: true,
            reason,
        }
    }
}

pub fn decide(
    times: FileTimes,
    policy: RegenerationPolicy,
    regen_if_created_today: bool,
    today: NaiveDate,
) -> Decision {
    let Some(derived) = times.derived else {
        return Decision::yes(Reason::Absent);
    };

    match policy {
        RegenerationPolicy::ForceAll => return Decision::yes(Reason::Forced),
        RegenerationPolicy::Since(date) if times.source > date.and_time(NaiveTime::default()) => {
            return Decision::yes(Reason::ModifiedSince(date));
        }
        _ => {}
    }

    if regen_if_created_today && derived.date() == today {
        return Decision::yes(Reason::CreatedToday);
    }
    if times.source > derived {
        return Decision::yes(Reason::SourceNewer);
    }

    Decision {
        regenerate: false,
        reason: Reason::UpToDate,
    }
}

fn local_mtime(path: &Path) -> std::io::Result<NaiveDateTime> {
    let modified: SystemTime = path.metadata()?.modified()?;
    Ok(DateTime::<Local>::from(modified).naive_local())
}

/// Read both modification times and apply [`decide`] with today's local date.
pub fn should_regenerate(
    source: &Path,
    derived: &Path,
    policy: RegenerationPolicy,
    regen_if_created_today: bool,
) -> std::io::Result<Decision> {
    let times = FileTimes {
        source: local_mtime(source)?,
        derived: if derived.exists() {
            Some(local_mtime(derived)?)
        } else {
            None
        },
    };
    Ok(decide(
        times,
        policy,
        regen_if_created_today,
        Local::now().date_naive(),
    ))
}
