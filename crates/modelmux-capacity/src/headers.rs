//! Parsing of provider rate-limit header families.
//!
//! Two prefixed families are understood: `x-ratelimit-*` and
//! `anthropic-ratelimit-*`. When a response carries both, the most
//! conservative remaining value wins (smallest remaining, largest limit).

use std::time::Duration;

/// Parsed view of whatever rate-limit headers a response carried.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitHeaders {
    pub tokens_remaining: Option<u64>,
    pub tokens_limit: Option<u64>,
    pub requests_remaining: Option<u64>,
    pub requests_limit: Option<u64>,
    /// Time until the window resets, if the provider said.
    pub reset_after: Option<Duration>,
}

impl RateLimitHeaders {
    /// Parses `(name, value)` pairs. Unknown headers are ignored;
    /// unparseable values are ignored.
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut parsed = Self::default();
        for (name, value) in pairs {
            let name = name.to_ascii_lowercase();
            match name.as_str() {
                "x-ratelimit-remaining-tokens" | "anthropic-ratelimit-tokens-remaining" => {
                    merge_min(&mut parsed.tokens_remaining, parse_count(value));
                }
                "x-ratelimit-limit-tokens" | "anthropic-ratelimit-tokens-limit" => {
                    merge_max(&mut parsed.tokens_limit, parse_count(value));
                }
                "x-ratelimit-remaining-requests" | "anthropic-ratelimit-requests-remaining" => {
                    merge_min(&mut parsed.requests_remaining, parse_count(value));
                }
                "x-ratelimit-limit-requests" | "anthropic-ratelimit-requests-limit" => {
                    merge_max(&mut parsed.requests_limit, parse_count(value));
                }
                "x-ratelimit-reset-tokens"
                | "x-ratelimit-reset-requests"
                | "anthropic-ratelimit-tokens-reset"
                | "anthropic-ratelimit-requests-reset"
                | "retry-after" => {
                    merge_max_duration(&mut parsed.reset_after, parse_reset(value));
                }
                _ => {}
            }
        }
        parsed
    }

    /// True if nothing recognizable was present.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn merge_min(slot: &mut Option<u64>, value: Option<u64>) {
    if let Some(v) = value {
        *slot = Some(slot.map_or(v, |cur| cur.min(v)));
    }
}

fn merge_max(slot: &mut Option<u64>, value: Option<u64>) {
    if let Some(v) = value {
        *slot = Some(slot.map_or(v, |cur| cur.max(v)));
    }
}

fn merge_max_duration(slot: &mut Option<Duration>, value: Option<Duration>) {
    if let Some(v) = value {
        *slot = Some(slot.map_or(v, |cur| cur.max(v)));
    }
}

fn parse_count(value: &str) -> Option<u64> {
    value.trim().parse().ok()
}

/// Parses reset values in the forms providers actually send: bare seconds
/// (`"30"`), golang-style durations (`"6m0s"`, `"112ms"`), or fractional
/// seconds (`"1.5"`).
fn parse_reset(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    if let Ok(secs) = value.parse::<f64>() {
        if secs.is_finite() && secs >= 0.0 {
            return Some(Duration::from_secs_f64(secs));
        }
        return None;
    }

    // Golang duration syntax: a sequence of <number><unit> components.
    let mut total = Duration::ZERO;
    let mut digits = String::new();
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_ascii_digit() || c == '.' {
            digits.push(c);
            continue;
        }
        let amount: f64 = digits.parse().ok()?;
        digits.clear();
        let unit = match c {
            'h' => 3600.0,
            'm' => {
                if chars.peek() == Some(&'s') {
                    chars.next();
                    0.001
                } else {
                    60.0
                }
            }
            's' => 1.0,
            _ => return None,
        };
        total += Duration::from_secs_f64(amount * unit);
    }
    if digits.is_empty() {
        Some(total)
    } else {
        None
    }
}
