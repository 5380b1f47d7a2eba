//! Disc number detection from image file names

use std::sync::LazyLock;

use regex::Regex;

use crate::options::MAX_DISC_NUM;

/// Tried in order against the lowercased name; the first capture in range wins.
const DISC_PATTERNS: [&str; 10] = [
    r"disc[\s_-]*(\d)",
    r"disk[\s_-]*(\d)",
    r"cd[\s_-]*(\d)",
    r"d[\s_-]*(\d)",
    r"\(disc[\s_]*(\d)\)",
    r"\[disc[\s_]*(\d)\]",
    r"\(cd[\s_]*(\d)\)",
    r"\[cd[\s_]*(\d)\]",
    r"\(d[\s_]*(\d)\)",
    r"\[d[\s_]*(\d)\]",
];

static DISC_REGEXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    DISC_PATTERNS
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
});

/// Guess the 1-based disc number from a file name such as
/// `"Game (Disc 2).iso"` or `"Game_cd2.iso"`.
///
/// Only the first match of each pattern is considered. Returns 1 when
/// nothing in `1..=9` is found.
#[must_use]
pub fn detect_disc_number(file_name: &str) -> u8 {
    let lower = file_name.to_lowercase();

    for re in DISC_REGEXES.iter() {
        let Some(digit) = re
            .captures(&lower)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u8>().ok())
        else {
            continue;
        };

        if (1..=MAX_DISC_NUM).contains(&digit) {
            #[cfg(feature = "logging")]
            tracing::debug!(file_name, disc = digit, pattern = re.as_str(), "detected disc number");
            return digit;
        }
    }

    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_patterns_compile() {
        assert_eq!(DISC_REGEXES.len(), DISC_PATTERNS.len());
    }

    #[test]
    fn test_disc_patterns() {
        let cases = [
            ("Final Fantasy X (Disc 1).iso", 1),
            ("Final Fantasy X (Disc 2).iso", 2),
            ("Xenosaga [Disc 2].iso", 2),
            ("Game - Disc 3.iso", 3),
            ("Game_Disc1.iso", 1),
            ("Game disc2.iso", 2),
            ("Game (CD 1).iso", 1),
            ("Game [CD 2].iso", 2),
            ("Game_cd2.iso", 2),
            ("Game (Disk 1).iso", 1),
            ("Game [Disk 2].iso", 2),
            ("Game (D 1).iso", 1),
            ("Game [D 2].iso", 2),
            ("Game_d2.iso", 2),
            ("GAME (DISC 1).ISO", 1),
            ("Xenosaga Episode I [NTSC] [Disc 2].iso", 2),
        ];

        for (name, expected) in cases {
            assert_eq!(detect_disc_number(name), expected, "{name}");
        }
    }

    #[test]
    fn test_defaults_to_one() {
        assert_eq!(detect_disc_number("Gran Turismo 4.iso"), 1);
        assert_eq!(detect_disc_number("Gran Turismo 4 (SLUS-21001).iso"), 1);
        assert_eq!(detect_disc_number("Random Name (USA).iso"), 1);
        assert_eq!(detect_disc_number(""), 1);
    }

    #[test]
    fn test_out_of_range() {
        assert_eq!(detect_disc_number("Game (Disc 9).iso"), 9);
        assert_eq!(detect_disc_number("Game (Disc 0).iso"), 1);
        // Single digit capture: "10" reads as 1
        assert_eq!(detect_disc_number("Game (Disc 10).iso"), 1);
    }

    #[test]
    fn test_earlier_pattern_wins() {
        // "solid 3" would match the bare "d" pattern, but "disc" is tried first
        assert_eq!(
            detect_disc_number("Metal Gear Solid 3 - Snake Eater (USA) (Disc 2).iso"),
            2
        );
        assert_eq!(detect_disc_number("Game Disc 1 of 2.iso"), 1);
    }
}
