//! Display vocabulary: tier abbreviations, Roman-numeral divisions and
//! point-delta tokens. Downstream renderers key off these strings.

use crate::types::{Division, RankSnapshot, Tier};

/// `SIII`, `DI`, or the bare abbreviation for apex tiers (`GM`)
pub fn short_form(tier: Tier, division: Option<Division>) -> String {
    match (tier.is_apex(), division) {
        (false, Some(division)) => format!("{}{}", tier.abbreviation(), division.roman()),
        _ => tier.abbreviation().to_string(),
    }
}

/// Table cell form: `DII 21LP`, `M 120LP`
pub fn format_rank_display(snapshot: &RankSnapshot) -> String {
    if snapshot.tier.is_apex() {
        format!("{} {}LP", snapshot.tier.abbreviation(), snapshot.points)
    } else {
        format!(
            "{} {}LP",
            short_form(snapshot.tier, snapshot.division),
            snapshot.points
        )
    }
}

/// Signed point delta: `+99LP`, `-51LP`, `±0LP`
pub fn format_points_delta(delta: i64) -> String {
    match delta {
        d if d > 0 => format!("+{}LP", d),
        d if d < 0 => format!("{}LP", d),
        _ => "±0LP".to_string(),
    }
}

/// Terminal/monospace cell width; East Asian wide and fullwidth
/// characters take two cells
pub fn display_width(text: &str) -> usize {
    text.chars().map(|c| if is_wide(c) { 2 } else { 1 }).sum()
}

/// Right-pad `text` with spaces to `width` display cells
pub fn pad_to_width(text: &str, width: usize) -> String {
    let padding = width.saturating_sub(display_width(text));
    format!("{}{}", text, " ".repeat(padding))
}

fn is_wide(c: char) -> bool {
    matches!(
        c as u32,
        0x1100..=0x115F
            | 0x2E80..=0x303E
            | 0x3041..=0x33FF
            | 0x3400..=0x4DBF
            | 0x4E00..=0x9FFF
            | 0xA000..=0xA4CF
            | 0xAC00..=0xD7A3
            | 0xF900..=0xFAFF
            | 0xFE30..=0xFE4F
            | 0xFF00..=0xFF60
            | 0xFFE0..=0xFFE6
            | 0x1F300..=0x1F64F
            | 0x1F900..=0x1F9FF
            | 0x20000..=0x3FFFD
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_short_form() {
        assert_eq!(short_form(Tier::Silver, Some(Division::III)), "SIII");
        assert_eq!(short_form(Tier::Diamond, Some(Division::I)), "DI");
        assert_eq!(short_form(Tier::Grandmaster, Some(Division::I)), "GM");
        assert_eq!(short_form(Tier::Challenger, None), "C");
        assert_eq!(short_form(Tier::Gold, None), "G");
    }

    #[test]
    fn test_format_rank_display() {
        let snap = RankSnapshot::new(Tier::Diamond, Some(Division::II), 21, 0, 0, Utc::now());
        assert_eq!(format_rank_display(&snap), "DII 21LP");

        let snap = RankSnapshot::new(Tier::Master, None, 120, 0, 0, Utc::now());
        assert_eq!(format_rank_display(&snap), "M 120LP");
    }

    #[test]
    fn test_format_points_delta() {
        assert_eq!(format_points_delta(99), "+99LP");
        assert_eq!(format_points_delta(-51), "-51LP");
        assert_eq!(format_points_delta(0), "±0LP");
    }

    #[test]
    fn test_display_width() {
        assert_eq!(display_width("abc"), 3);
        assert_eq!(display_width("あい"), 4);
        assert_eq!(display_width("±0LP"), 4);
        assert_eq!(pad_to_width("あ", 4), "あ  ");
        assert_eq!(pad_to_width("toolong", 3), "toolong");
    }
}
