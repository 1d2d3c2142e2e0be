//! Duration strings used by the antiflood commands.
//!
//! Admins type durations like `30s`, `5m`, `2h` or `1d`. The grammar is
//! deliberately loose: every digit in the input is part of the magnitude and
//! the unit is picked by the presence of a unit letter anywhere in the string.

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// Parse a duration string into whole seconds.
///
/// Digits are concatenated after stripping everything else. Unit letters are
/// checked in the order `d`, `h`, `m`, `s`; the first one present wins. With no
/// unit letter the magnitude is taken as seconds.
///
/// Returns `None` for empty input, no digits, a zero magnitude or overflow.
pub fn parse_duration(input: &str) -> Option<u64> {
    let s = input.trim().to_lowercase();

    let digits: String = s.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }

    let magnitude: u64 = digits.parse().ok()?;
    if magnitude == 0 {
        return None;
    }

    let unit = if s.contains('d') {
        DAY
    } else if s.contains('h') {
        HOUR
    } else if s.contains('m') {
        MINUTE
    } else {
        1
    };

    magnitude.checked_mul(unit)
}

/// Format seconds for chat notices, e.g. `1 hour 30 minutes`.
pub fn format_duration(secs: u64) -> String {
    fn unit(n: u64, name: &str) -> String {
        if n == 1 {
            format!("1 {name}")
        } else {
            format!("{n} {name}s")
        }
    }

    if secs < MINUTE {
        unit(secs, "second")
    } else if secs < HOUR {
        let mins = secs / MINUTE;
        let rest = secs % MINUTE;
        if rest > 0 {
            format!("{} {}", unit(mins, "minute"), unit(rest, "second"))
        } else {
            unit(mins, "minute")
        }
    } else if secs < DAY {
        let hours = secs / HOUR;
        let mins = (secs % HOUR) / MINUTE;
        if mins > 0 {
            format!("{} {}", unit(hours, "hour"), unit(mins, "minute"))
        } else {
            unit(hours, "hour")
        }
    } else {
        let days = secs / DAY;
        let hours = (secs % DAY) / HOUR;
        if hours > 0 {
            format!("{} {}", unit(days, "day"), unit(hours, "hour"))
        } else {
            unit(days, "day")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("30s"), Some(30));
        assert_eq!(parse_duration("5m"), Some(300));
        assert_eq!(parse_duration("2h"), Some(7200));
        assert_eq!(parse_duration("1d"), Some(86400));
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert_eq!(parse_duration("0s"), None);
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("   "), None);
        assert_eq!(parse_duration("abc"), None);
    }

    #[test]
    fn test_parse_duration_without_unit_is_seconds() {
        assert_eq!(parse_duration("10"), Some(10));
        assert_eq!(parse_duration(" 45 "), Some(45));
    }

    #[test]
    fn test_parse_duration_loose_grammar() {
        // Case-insensitive, digits collected from anywhere.
        assert_eq!(parse_duration("2H"), Some(7200));
        assert_eq!(parse_duration("1x5m"), Some(15 * 60));
        // `d` outranks `m` when both are present.
        assert_eq!(parse_duration("3md"), Some(3 * 86400));
        assert_eq!(parse_duration("10 mins"), Some(600));
    }

    #[test]
    fn test_parse_duration_overflow() {
        assert_eq!(parse_duration("99999999999999999999d"), None);
        assert_eq!(parse_duration("999999999999999999d"), None);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(1), "1 second");
        assert_eq!(format_duration(45), "45 seconds");
        assert_eq!(format_duration(300), "5 minutes");
        assert_eq!(format_duration(90), "1 minute 30 seconds");
        assert_eq!(format_duration(5400), "1 hour 30 minutes");
        assert_eq!(format_duration(7200), "2 hours");
        assert_eq!(format_duration(86400 + 3 * 3600), "1 day 3 hours");
    }
}
