//! Message text formatting for notifications and replies.

use crate::models::{ChangeEvent, Direction};
use chrono::Local;
use num_format::{Locale, ToFormattedString};

/// Format a price with thousands separators and four decimals, e.g. `$67,012.3400`.
///
/// Sub-dollar prices get eight decimals so meme coins do not render as zero.
pub fn format_price(price: f64) -> String {
    if price != 0.0 && price.abs() < 1.0 {
        return format!("${:.8}", price);
    }
    let scaled = (price.abs() * 10_000.0).round() as u64;
    let whole = scaled / 10_000;
    let frac = scaled % 10_000;
    let sign = if price < 0.0 { "-" } else { "" };
    format!("{}${}.{:04}", sign, whole.to_formatted_string(&Locale::en), frac)
}

/// Format a threshold exactly as stored, without trailing zeros, e.g. `2.5%` or `1%`.
pub fn format_threshold(value: f64) -> String {
    format!("{}%", value)
}

/// Render one change event as a notification message.
pub fn format_event(event: &ChangeEvent) -> String {
    let (marker, heading) = match event.direction {
        Direction::Up => ("[+]", "UP"),
        Direction::Down => ("[-]", "DOWN"),
    };

    format!(
        "{marker} PRICE ALERT\n\n\
         Asset: {asset}\n\
         Move: {heading}\n\
         Change: {pct:.2}%\n\n\
         Was: {last}\n\
         Now: {current}\n\
         Difference: {diff}\n\n\
         Time: {time}",
        asset = event.asset.to_uppercase(),
        pct = event.pct_change,
        last = format_price(event.last),
        current = format_price(event.current),
        diff = format_price((event.current - event.last).abs()),
        time = event.observed_at.with_timezone(&Local).format("%H:%M:%S"),
    )
}

/// One line summary used when several events are listed together.
pub fn format_event_line(event: &ChangeEvent) -> String {
    format!(
        "{} {} {:.2}% ({} -> {})",
        event.asset.to_uppercase(),
        event.direction,
        event.pct_change,
        format_price(event.last),
        format_price(event.current)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event(last: f64, current: f64) -> ChangeEvent {
        ChangeEvent {
            subscriber: 1,
            asset: "bitcoin".to_string(),
            last,
            current,
            pct_change: ((current - last) / last * 100.0).abs(),
            direction: Direction::between(last, current),
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(0.0), "$0.0000");
        assert_eq!(format_price(67012.34), "$67,012.3400");
        assert_eq!(format_price(1.99999), "$2.0000");
        assert_eq!(format_price(0.00001234), "$0.00001234");
        assert_eq!(format_price(0.5), "$0.50000000");
    }

    #[test]
    fn test_format_threshold() {
        assert_eq!(format_threshold(1.0), "1%");
        assert_eq!(format_threshold(2.5), "2.5%");
        assert_eq!(format_threshold(0.25), "0.25%");
        assert_eq!(format_threshold(0.125), "0.125%");
        assert_eq!(format_threshold(50.0), "50%");
    }

    #[test]
    fn test_format_event_identifies_each_field() {
        let text = format_event(&event(100.0, 102.5));
        assert!(text.contains("BITCOIN"));
        assert!(text.contains("UP"));
        assert!(text.contains("2.50%"));
        assert!(text.contains("$100.0000"));
        assert!(text.contains("$102.5000"));
        assert!(text.contains("$2.5000"));

        let line = format_event_line(&event(100.0, 95.0));
        assert!(line.contains("down"));
        assert!(line.contains("5.00%"));
    }
}
