//! Durations as written in scripts: `1 hour and 30 seconds`, `2:30`, `a tick`.

use std::fmt;

use crate::defaults::format_number;

type Unit = (&'static str, &'static str, i64);

const TICK: Unit = ("tick", "ticks", 50);
const SECOND: Unit = ("second", "seconds", 1000);
const MINUTE: Unit = ("minute", "minutes", 60_000);
const HOUR: Unit = ("hour", "hours", 3_600_000);
const DAY: Unit = ("day", "days", 86_400_000);
const WEEK: Unit = ("week", "weeks", 604_800_000);

const PARSED_UNITS: [Unit; 6] = [TICK, SECOND, MINUTE, HOUR, DAY, WEEK];
/// Units used for rendering, largest first.
const RENDERED_UNITS: [Unit; 4] = [DAY, HOUR, MINUTE, SECOND];

/// A length of time with millisecond precision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timespan {
    millis: i64,
}

impl Timespan {
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self { millis }
    }

    #[must_use]
    pub const fn from_ticks(ticks: i64) -> Self {
        Self {
            millis: ticks.saturating_mul(TICK.2),
        }
    }

    #[must_use]
    pub const fn millis(self) -> i64 {
        self.millis
    }

    #[must_use]
    pub const fn ticks(self) -> i64 {
        self.millis / TICK.2
    }

    /// Parse `0`, a clock time `h:mm[:ss][.ms]` or amounts with units joined
    /// by commas or `and`. Amounts may be decimals or `a`/`an`.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim().to_lowercase();
        if input == "0" {
            return Some(Self::default());
        }
        if let Some(clock) = parse_clock(&input) {
            return Some(clock);
        }

        let mut millis = 0.0;
        let mut amount: Option<f64> = None;
        let mut units = 0;
        let mut dangling_and = false;
        for word in input
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|word| !word.is_empty())
        {
            if word == "and" {
                if amount.is_some() || units == 0 || dangling_and {
                    return None;
                }
                dangling_and = true;
                continue;
            }
            match amount.take() {
                None => {
                    amount = Some(match word {
                        "a" | "an" => 1.0,
                        _ => parse_amount(word)?,
                    });
                }
                Some(value) => {
                    let (_, _, unit_millis) = PARSED_UNITS
                        .into_iter()
                        .find(|(singular, plural, _)| word == *singular || word == *plural)?;
                    millis += value * unit_millis as f64;
                    units += 1;
                    dangling_and = false;
                }
            }
        }
        if amount.is_some() || units == 0 || dangling_and {
            return None;
        }
        Some(Self::from_millis(millis.round() as i64))
    }
}

fn parse_amount(word: &str) -> Option<f64> {
    if !word.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    word.parse().ok()
}

fn parse_clock(input: &str) -> Option<Timespan> {
    let (time, fraction) = match input.split_once('.') {
        Some((time, fraction)) => (time, Some(fraction)),
        None => (input, None),
    };
    let parts: Vec<&str> = time.split(':').collect();
    if !(2..=3).contains(&parts.len()) {
        return None;
    }
    let digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    if !parts.iter().all(|part| digits(part)) || parts.iter().skip(1).any(|part| part.len() != 2) {
        return None;
    }
    let mut millis: i64 = 0;
    for (part, unit) in parts.iter().zip([HOUR.2, MINUTE.2, SECOND.2]) {
        millis = millis.checked_add(part.parse::<i64>().ok()?.checked_mul(unit)?)?;
    }
    if let Some(fraction) = fraction {
        if !digits(fraction) || fraction.len() > 4 {
            return None;
        }
        millis = millis.checked_add(fraction.parse::<i64>().ok()?)?;
    }
    Some(Timespan::from_millis(millis))
}

fn amount((singular, plural, _): Unit, value: f64) -> String {
    let number = format_number(value, 2);
    let unit = if number == "1" { singular } else { plural };
    format!("{number} {unit}")
}

fn render(millis: i64) -> String {
    for pair in RENDERED_UNITS.windows(2) {
        let (unit, next) = (pair[0], pair[1]);
        if millis < unit.2 {
            continue;
        }
        let whole = millis / unit.2;
        let remaining = millis - whole * unit.2;
        if format_number(remaining as f64 / next.2 as f64, 2) != "0" {
            return format!("{} and {}", amount(unit, whole as f64), render(remaining));
        }
        return amount(unit, millis as f64 / unit.2 as f64);
    }
    amount(SECOND, millis as f64 / SECOND.2 as f64)
}

impl fmt::Display for Timespan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render(self.millis))
    }
}
