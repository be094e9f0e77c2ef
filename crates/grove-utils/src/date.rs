use bstr::{BStr, BString, ByteSlice, ByteVec};
use chrono::{DateTime, FixedOffset, Local};

use crate::error::UtilError;
use crate::Result;

/// A point in time as stored in commits, tags and reflogs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GitDate {
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    /// Offset from UTC in minutes (e.g. -300 for UTC-05:00).
    pub tz_offset: i32,
}

/// `-0130` style offset (decimal HHMM) to minutes.
fn hhmm_to_minutes(tz: i32) -> i32 {
    let sign = if tz < 0 { -1 } else { 1 };
    let abs = tz.unsigned_abs() as i32;
    sign * ((abs / 100) * 60 + abs % 100)
}

fn minutes_to_hhmm(minutes: i32) -> i32 {
    let sign = if minutes < 0 { -1 } else { 1 };
    let abs = minutes.unsigned_abs() as i32;
    sign * ((abs / 60) * 100 + abs % 60)
}

impl GitDate {
    pub fn new(timestamp: i64, tz_offset_minutes: i32) -> Self {
        Self {
            timestamp,
            tz_offset: tz_offset_minutes,
        }
    }

    /// The current time in the local timezone.
    pub fn now() -> Self {
        let now = Local::now();
        Self {
            timestamp: now.timestamp(),
            tz_offset: now.offset().local_minus_utc() / 60,
        }
    }

    /// Parse the raw form `"<seconds> <+|-HHMM>"`; the offset is optional.
    pub fn parse_raw(input: &str) -> Result<Self> {
        let input = input.trim();
        let mut parts = input.splitn(2, ' ');
        let ts = parts.next().unwrap_or_default();
        let timestamp: i64 = ts
            .parse()
            .map_err(|_| UtilError::DateParse(format!("invalid timestamp: '{ts}'")))?;

        let tz_offset = match parts.next() {
            Some(tz) => {
                let tz = tz.trim();
                let valid = tz.len() == 5
                    && (tz.starts_with('+') || tz.starts_with('-'))
                    && tz[1..].bytes().all(|b| b.is_ascii_digit());
                if !valid {
                    return Err(UtilError::DateParse(format!("invalid timezone: '{tz}'")));
                }
                let value: i32 = tz
                    .parse()
                    .map_err(|_| UtilError::DateParse(format!("invalid timezone: '{tz}'")))?;
                hhmm_to_minutes(value)
            }
            None => 0,
        };

        Ok(Self {
            timestamp,
            tz_offset,
        })
    }

    /// Format as `"<seconds> <+|-HHMM>"`.
    pub fn to_raw(&self) -> String {
        let hhmm = minutes_to_hhmm(self.tz_offset);
        let sign = if self.tz_offset < 0 { '-' } else { '+' };
        format!("{} {}{:04}", self.timestamp, sign, hhmm.abs())
    }

    /// ISO 8601 rendering in the stored offset, e.g. `2023-11-14 22:13:20 +0000`.
    pub fn to_iso(&self) -> Option<String> {
        self.to_datetime()
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S %z").to_string())
    }

    pub fn to_datetime(&self) -> Option<DateTime<FixedOffset>> {
        let offset = FixedOffset::east_opt(self.tz_offset * 60)?;
        DateTime::from_timestamp(self.timestamp, 0).map(|dt| dt.with_timezone(&offset))
    }
}

/// Author, committer, tagger, or reflog identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub name: BString,
    pub email: BString,
    pub date: GitDate,
}

impl Signature {
    /// Build a signature, rejecting names or emails that would break the
    /// serialized form (angle brackets or newlines).
    pub fn new(name: impl Into<BString>, email: impl Into<BString>, date: GitDate) -> Result<Self> {
        let name = name.into();
        let email = email.into();
        for (what, value) in [("name", &name), ("email", &email)] {
            if value.iter().any(|&b| matches!(b, b'<' | b'>' | b'\n')) {
                return Err(UtilError::Signature(format!(
                    "{what} contains '<', '>' or a newline: {value}"
                )));
            }
        }
        Ok(Self {
            name: BString::from(name.trim()),
            email,
            date,
        })
    }

    /// Signature stamped with the current local time.
    pub fn now(name: impl Into<BString>, email: impl Into<BString>) -> Result<Self> {
        Self::new(name, email, GitDate::now())
    }

    /// Parse `Name <email> 1700000000 +0000`.
    pub fn parse(input: &BStr) -> Result<Self> {
        let input = input.as_bytes();

        let gt_pos = input
            .iter()
            .rposition(|&b| b == b'>')
            .ok_or_else(|| UtilError::Signature("missing '>'".into()))?;
        let lt_pos = input[..gt_pos]
            .iter()
            .rposition(|&b| b == b'<')
            .ok_or_else(|| UtilError::Signature("missing '<'".into()))?;

        let name = input[..lt_pos].trim();
        let email = &input[lt_pos + 1..gt_pos];
        let date_str = std::str::from_utf8(input[gt_pos + 1..].trim())
            .map_err(|_| UtilError::Signature("non-UTF-8 date".into()))?;

        Ok(Self {
            name: BString::from(name),
            email: BString::from(email),
            date: GitDate::parse_raw(date_str)?,
        })
    }

    /// Canonical serialized form.
    pub fn to_bytes(&self) -> BString {
        let mut out = BString::new(Vec::with_capacity(self.name.len() + self.email.len() + 24));
        out.push_str(&self.name);
        out.push_str(b" <");
        out.push_str(&self.email);
        out.push_str(b"> ");
        out.push_str(self.date.to_raw().as_bytes());
        out
    }
}

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}
