//! Time-of-day parsing and formatting. A day is 24000 ticks and tick 0 is
//! 6:00am.

pub const TICKS_PER_DAY: i64 = 24_000;
const TICKS_PER_HOUR: i64 = 1_000;
const DAWN_OFFSET: i64 = 6 * TICKS_PER_HOUR;

/// Parse a time of day into ticks.
///
/// Accepts raw ticks (`0..24000`), `day`/`morning`, `noon`, `night`,
/// `midnight`, 24-hour `HH:MM` and 12-hour `H:MMam`, `H:MMa`, `H:MMpm`,
/// `H:MMp`.
pub fn parse_time(input: &str) -> Option<i64> {
    let text = input.trim().to_ascii_lowercase();
    match text.as_str() {
        "day" | "morning" => return Some(0),
        "noon" => return Some(6_000),
        "night" => return Some(12_000),
        "midnight" => return Some(18_000),
        _ => {}
    }
    if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
        let ticks: i64 = text.parse().ok()?;
        return (ticks < TICKS_PER_DAY).then_some(ticks);
    }

    let (clock, meridiem) = if let Some(rest) = text.strip_suffix("am").or(text.strip_suffix('a')) {
        (rest, Some(false))
    } else if let Some(rest) = text.strip_suffix("pm").or(text.strip_suffix('p')) {
        (rest, Some(true))
    } else {
        (text.as_str(), None)
    };

    let (hours, minutes) = clock.trim().split_once(':')?;
    if minutes.len() != 2 {
        return None;
    }
    let hours: i64 = hours.parse().ok()?;
    let minutes: i64 = minutes.parse().ok()?;
    if !(0..60).contains(&minutes) {
        return None;
    }
    let hours = match meridiem {
        Some(pm) => {
            if !(1..=12).contains(&hours) {
                return None;
            }
            (hours % 12) + if pm { 12 } else { 0 }
        }
        None if (0..24).contains(&hours) => hours,
        None => return None,
    };

    // Round minutes up so formatting gives back the same minute.
    let since_midnight = hours * TICKS_PER_HOUR + (minutes * TICKS_PER_HOUR + 59) / 60;
    Some((since_midnight - DAWN_OFFSET).rem_euclid(TICKS_PER_DAY))
}

/// Render ticks as `H:MMam` / `H:MMpm`.
pub fn format_time(ticks: i64) -> String {
    let since_midnight = (ticks + DAWN_OFFSET).rem_euclid(TICKS_PER_DAY);
    let hours = since_midnight / TICKS_PER_HOUR;
    let minutes = (since_midnight % TICKS_PER_HOUR) * 60 / TICKS_PER_HOUR;
    let twelve = match hours % 12 {
        0 => 12,
        h => h,
    };
    let suffix = if hours < 12 { "am" } else { "pm" };
    format!("{twelve}:{minutes:02}{suffix}")
}
