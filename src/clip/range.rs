//! Parsing of user-typed timestamps and time ranges.
//!
//! Accepted time tokens:
//! - compact `H`/`M`/`S` notation, any subset, case-insensitive (`00H08M10S`, `8m`, `90s`)
//! - `mm:ss` and `hh:mm:ss`
//! - bare integer seconds
//!
//! A range is two tokens separated by `-`, `–` or `to`.

use regex::Regex;
use std::sync::OnceLock;

static COMPACT_RE: OnceLock<Regex> = OnceLock::new();
static COLON_RE: OnceLock<Regex> = OnceLock::new();
static RANGE_RE: OnceLock<Regex> = OnceLock::new();
static TOKEN_RE: OnceLock<Regex> = OnceLock::new();

fn compact_re() -> &'static Regex {
    COMPACT_RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:(\d+)h)?(?:(\d+)m)?(?:(\d+)s)?$").expect("Invalid regex")
    })
}

fn colon_re() -> &'static Regex {
    COLON_RE.get_or_init(|| Regex::new(r"^(\d+):(\d+)(?::(\d+))?$").expect("Invalid regex"))
}

fn range_re() -> &'static Regex {
    RANGE_RE.get_or_init(|| {
        Regex::new(r"(?i)^([0-9hms:]+)\s*(?:-|–|to)\s*([0-9hms:]+)$").expect("Invalid regex")
    })
}

fn token_re() -> &'static Regex {
    TOKEN_RE.get_or_init(|| Regex::new(r"(?i)\d[0-9hms:]*").expect("Invalid regex"))
}

/// Parse a single time token into seconds.
pub fn parse_time(token: &str) -> Option<u64> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }

    if let Some(caps) = compact_re().captures(token) {
        let field = |i: usize| -> Option<u64> {
            caps.get(i).map_or(Some(0), |m| m.as_str().parse().ok())
        };
        if caps.get(1).is_some() || caps.get(2).is_some() || caps.get(3).is_some() {
            return hms_to_seconds(field(1)?, field(2)?, field(3)?);
        }
    }

    if let Some(caps) = colon_re().captures(token) {
        let a: u64 = caps[1].parse().ok()?;
        let b: u64 = caps[2].parse().ok()?;
        return match caps.get(3) {
            Some(c) => hms_to_seconds(a, b, c.as_str().parse().ok()?),
            None => hms_to_seconds(0, a, b),
        };
    }

    if token.bytes().all(|b| b.is_ascii_digit()) {
        return token.parse().ok();
    }

    None
}

/// Parse a `start-end` range. The end must be strictly after the start.
pub fn parse_range(text: &str) -> Option<(u64, u64)> {
    let text = text.trim();

    if let Some(caps) = range_re().captures(text) {
        if let Some(range) = ordered(parse_time(&caps[1]), parse_time(&caps[2])) {
            return Some(range);
        }
    }

    // `00H08M10S:00H09M20S`: compact tokens joined by a colon
    if let Some((a, b)) = text.split_once(':') {
        let compact = |t: &str| t.chars().any(|c| c.is_ascii_alphabetic());
        if compact(a) && compact(b) {
            if let Some(range) = ordered(parse_time(a), parse_time(b)) {
                return Some(range);
            }
        }
    }

    // Anything else: take the first two time-like tokens found in the text
    let mut tokens = token_re().find_iter(text).map(|m| m.as_str());
    match (tokens.next(), tokens.next()) {
        (Some(a), Some(b)) => ordered(parse_time(a), parse_time(b)),
        _ => None,
    }
}

/// Render seconds as `HH:MM:SS`.
pub fn format_hms(seconds: u64) -> String {
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    format!("{h:02}:{m:02}:{s:02}")
}

fn hms_to_seconds(h: u64, m: u64, s: u64) -> Option<u64> {
    h.checked_mul(3600)?
        .checked_add(m.checked_mul(60)?)?
        .checked_add(s)
}

fn ordered(start: Option<u64>, end: Option<u64>) -> Option<(u64, u64)> {
    match (start, end) {
        (Some(a), Some(b)) if b > a => Some((a, b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_time_compact() {
        assert_eq!(parse_time("00H08M10S"), Some(490));
        assert_eq!(parse_time("1H02M03S"), Some(3723));
        assert_eq!(parse_time("1h"), Some(3600));
        assert_eq!(parse_time("8m"), Some(480));
        assert_eq!(parse_time("90S"), Some(90));
        assert_eq!(parse_time("2m5s"), Some(125));
    }

    #[test]
    fn test_parse_time_compact_round_trip() {
        for h in [0u64, 1, 2, 10] {
            for m in [0u64, 1, 30, 59] {
                for s in [0u64, 5, 59] {
                    let token = format!("{h}H{m:02}M{s:02}S");
                    assert_eq!(parse_time(&token), Some(h * 3600 + m * 60 + s), "{token}");
                }
            }
        }
    }

    #[test]
    fn test_parse_time_colon() {
        assert_eq!(parse_time("2:32"), Some(152));
        assert_eq!(parse_time("2:32:10"), Some(9130));
        assert_eq!(parse_time(" 0:05 "), Some(5));
    }

    #[test]
    fn test_parse_time_digits() {
        assert_eq!(parse_time("152"), Some(152));
        assert_eq!(parse_time("0"), Some(0));
    }

    #[test]
    fn test_parse_time_invalid() {
        assert_eq!(parse_time(""), None);
        assert_eq!(parse_time("abc"), None);
        assert_eq!(parse_time("h"), None);
        assert_eq!(parse_time("1:2:3:4"), None);
        assert_eq!(parse_time("-5"), None);
        assert_eq!(parse_time("99999999999999999999999"), None);
        assert_eq!(parse_time("99999999999999999H"), None);
    }

    #[test]
    fn test_parse_range_examples() {
        assert_eq!(parse_range("2:32-3:23"), Some((152, 203)));
        assert_eq!(parse_range("152-203"), Some((152, 203)));
        assert_eq!(parse_range("00H08M10S-00H09M20S"), Some((490, 560)));
        assert_eq!(parse_range("3:23-2:32"), None);
    }

    #[test]
    fn test_parse_range_separators() {
        assert_eq!(parse_range("2:32 - 3:23"), Some((152, 203)));
        assert_eq!(parse_range("2:32–3:23"), Some((152, 203)));
        assert_eq!(parse_range("2:32 to 3:23"), Some((152, 203)));
        assert_eq!(parse_range("1m TO 2m"), Some((60, 120)));
    }

    #[test]
    fn test_parse_range_compact_colon() {
        assert_eq!(parse_range("00H08M10S:00H09M20S"), Some((490, 560)));
    }

    #[test]
    fn test_parse_range_lenient_tokens() {
        assert_eq!(parse_range("from 2:32 until 3:23 please"), Some((152, 203)));
    }

    #[test]
    fn test_parse_range_rejects() {
        assert_eq!(parse_range(""), None);
        assert_eq!(parse_range("hello"), None);
        assert_eq!(parse_range("10-10"), None);
        assert_eq!(parse_range("2:32"), None);
        assert_eq!(parse_range("x-y"), None);
    }

    #[test]
    fn test_format_hms() {
        assert_eq!(format_hms(0), "00:00:00");
        assert_eq!(format_hms(152), "00:02:32");
        assert_eq!(format_hms(3723), "01:02:03");
    }
}
