//! Zodiac tags, persona traits, and deterministic fallback lines.
//!
//! DESIGN
//! ======
//! The sign is derived once from date of birth at registration and carried in
//! the access token. Trait phrases feed the chat prompt; the fallback table is
//! the canned answer set used when the AI provider is unreachable, so the chat
//! endpoint can always answer with something sign-appropriate.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// One of the twelve zodiac signs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ZodiacSign {
    Aries,
    Taurus,
    Gemini,
    Cancer,
    Leo,
    Virgo,
    Libra,
    Scorpio,
    Sagittarius,
    Capricorn,
    Aquarius,
    Pisces,
}

impl ZodiacSign {
    pub const ALL: [ZodiacSign; 12] = [
        Self::Aries,
        Self::Taurus,
        Self::Gemini,
        Self::Cancer,
        Self::Leo,
        Self::Virgo,
        Self::Libra,
        Self::Scorpio,
        Self::Sagittarius,
        Self::Capricorn,
        Self::Aquarius,
        Self::Pisces,
    ];

    /// Derive the sign from a date of birth.
    #[must_use]
    pub fn from_date_of_birth(dob: NaiveDate) -> Self {
        let day = dob.day();
        match dob.month() {
            1 => {
                if day <= 19 {
                    Self::Capricorn
                } else {
                    Self::Aquarius
                }
            }
            2 => {
                if day <= 18 {
                    Self::Aquarius
                } else {
                    Self::Pisces
                }
            }
            3 => {
                if day <= 20 {
                    Self::Pisces
                } else {
                    Self::Aries
                }
            }
            4 => {
                if day <= 19 {
                    Self::Aries
                } else {
                    Self::Taurus
                }
            }
            5 => {
                if day <= 20 {
                    Self::Taurus
                } else {
                    Self::Gemini
                }
            }
            6 => {
                if day <= 20 {
                    Self::Gemini
                } else {
                    Self::Cancer
                }
            }
            7 => {
                if day <= 22 {
                    Self::Cancer
                } else {
                    Self::Leo
                }
            }
            8 => {
                if day <= 22 {
                    Self::Leo
                } else {
                    Self::Virgo
                }
            }
            9 => {
                if day <= 22 {
                    Self::Virgo
                } else {
                    Self::Libra
                }
            }
            10 => {
                if day <= 22 {
                    Self::Libra
                } else {
                    Self::Scorpio
                }
            }
            11 => {
                if day <= 21 {
                    Self::Scorpio
                } else {
                    Self::Sagittarius
                }
            }
            _ => {
                if day <= 21 {
                    Self::Sagittarius
                } else {
                    Self::Capricorn
                }
            }
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Aries => "Aries",
            Self::Taurus => "Taurus",
            Self::Gemini => "Gemini",
            Self::Cancer => "Cancer",
            Self::Leo => "Leo",
            Self::Virgo => "Virgo",
            Self::Libra => "Libra",
            Self::Scorpio => "Scorpio",
            Self::Sagittarius => "Sagittarius",
            Self::Capricorn => "Capricorn",
            Self::Aquarius => "Aquarius",
            Self::Pisces => "Pisces",
        }
    }

    /// Parse a sign tag. Case-sensitive on purpose: tags are minted by this
    /// service and round-trip through tokens unchanged.
    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.as_str() == tag)
    }
}

impl std::fmt::Display for ZodiacSign {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// PERSONA TRAITS
// =============================================================================

/// Trait phrase for the chat persona prompt. Unknown tags get a neutral phrase.
#[must_use]
pub fn trait_phrase(tag: &str) -> &'static str {
    match ZodiacSign::parse(tag) {
        Some(ZodiacSign::Aries) => "passionate, confident, determined, and courageous",
        Some(ZodiacSign::Taurus) => "reliable, patient, devoted, and practical",
        Some(ZodiacSign::Gemini) => "adaptable, outgoing, intelligent, and curious",
        Some(ZodiacSign::Cancer) => "intuitive, emotional, protective, and nurturing",
        Some(ZodiacSign::Leo) => "creative, passionate, generous, and warm-hearted",
        Some(ZodiacSign::Virgo) => "loyal, analytical, hardworking, and practical",
        Some(ZodiacSign::Libra) => "diplomatic, gracious, fair-minded, and social",
        Some(ZodiacSign::Scorpio) => "resourceful, brave, passionate, and determined",
        Some(ZodiacSign::Sagittarius) => "generous, idealistic, great sense of humor, and adventurous",
        Some(ZodiacSign::Capricorn) => "responsible, disciplined, self-controlled, and ambitious",
        Some(ZodiacSign::Aquarius) => "progressive, original, independent, and humanitarian",
        Some(ZodiacSign::Pisces) => "compassionate, artistic, intuitive, and gentle",
        None => "empathetic and understanding",
    }
}

// =============================================================================
// FALLBACK TABLE
// =============================================================================

/// Deterministic chat reply used when the AI provider is unavailable.
#[must_use]
pub fn fallback_chat_line(tag: &str) -> &'static str {
    match ZodiacSign::parse(tag) {
        Some(ZodiacSign::Aries) => {
            "Saya mendengarkan Anda. Keberanian Anda untuk berbagi ini menunjukkan kekuatan sejati. Teruslah maju dengan percaya diri."
        }
        Some(ZodiacSign::Taurus) => {
            "Terima kasih telah berbagi. Kesabaran dan keteguhan Anda akan membawa Anda melewati ini. Percayalah pada prosesnya."
        }
        Some(ZodiacSign::Gemini) => {
            "Saya memahami perspektif Anda. Kemampuan adaptasi Anda adalah kekuatan. Teruslah terbuka terhadap kemungkinan baru."
        }
        Some(ZodiacSign::Cancer) => {
            "Perasaan Anda valid dan penting. Intuisi Anda membimbing Anda dengan baik. Percayalah pada diri sendiri."
        }
        Some(ZodiacSign::Leo) => {
            "Saya menghargai keterbukaan Anda. Kekuatan dan kreativitas Anda akan membantu Anda menemukan jalan. Tetaplah bersinar."
        }
        Some(ZodiacSign::Virgo) => {
            "Terima kasih atas kepercayaan Anda. Analisis dan dedikasi Anda akan membawa kejelasan. Teruslah berusaha."
        }
        Some(ZodiacSign::Libra) => {
            "Saya mendengarkan dengan penuh perhatian. Keseimbangan dan kebijaksanaan Anda akan membantu menemukan harmoni. Tetaplah adil pada diri sendiri."
        }
        Some(ZodiacSign::Scorpio) => {
            "Keberanian Anda untuk menghadapi ini menginspirasi. Kekuatan batin Anda luar biasa. Percayalah pada transformasi."
        }
        Some(ZodiacSign::Sagittarius) => {
            "Optimisme Anda adalah hadiah. Teruslah mencari makna dan pertumbuhan. Petualangan ini akan mengajarkan banyak hal."
        }
        Some(ZodiacSign::Capricorn) => {
            "Disiplin dan tanggung jawab Anda patut dihormati. Teruslah bergerak maju dengan tujuan yang jelas. Anda akan berhasil."
        }
        Some(ZodiacSign::Aquarius) => {
            "Perspektif unik Anda berharga. Teruslah berinovasi dan berpikir bebas. Perubahan dimulai dari dalam."
        }
        Some(ZodiacSign::Pisces) => {
            "Empati dan kreativitas Anda adalah kekuatan. Percayalah pada intuisi artistik Anda. Anda tidak sendirian."
        }
        None => "Saya mendengarkan Anda. Terima kasih telah berbagi perasaan Anda. Anda berani dan kuat.",
    }
}

/// Generic insight used when the AI provider is unavailable.
pub const FALLBACK_INSIGHT: &str = "Setiap percakapan adalah cerminan dari perjalanan hidup kita. Dalam berbagi cerita dan perasaan, kita menemukan kekuatan untuk terus maju. Ingatlah bahwa setiap tantangan adalah kesempatan untuk tumbuh, dan setiap emosi yang kita rasakan adalah bagian dari kemanusiaan kita. Teruslah berbicara, teruslah berbagi, dan teruslah percaya bahwa hari esok membawa harapan baru.";

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn boundary_dates_resolve_correctly() {
        assert_eq!(ZodiacSign::from_date_of_birth(date(1990, 1, 19)), ZodiacSign::Capricorn);
        assert_eq!(ZodiacSign::from_date_of_birth(date(1990, 1, 20)), ZodiacSign::Aquarius);
        assert_eq!(ZodiacSign::from_date_of_birth(date(1990, 3, 20)), ZodiacSign::Pisces);
        assert_eq!(ZodiacSign::from_date_of_birth(date(1990, 3, 21)), ZodiacSign::Aries);
        assert_eq!(ZodiacSign::from_date_of_birth(date(1990, 12, 21)), ZodiacSign::Sagittarius);
        assert_eq!(ZodiacSign::from_date_of_birth(date(1990, 12, 22)), ZodiacSign::Capricorn);
    }

    #[test]
    fn parse_round_trips_every_sign() {
        for sign in ZodiacSign::ALL {
            assert_eq!(ZodiacSign::parse(sign.as_str()), Some(sign));
        }
    }

    #[test]
    fn parse_rejects_unknown_tags() {
        assert_eq!(ZodiacSign::parse("Ophiuchus"), None);
        assert_eq!(ZodiacSign::parse("aries"), None);
    }

    #[test]
    fn every_sign_has_a_distinct_fallback_line() {
        let mut lines: Vec<&str> = ZodiacSign::ALL.iter().map(|s| fallback_chat_line(s.as_str())).collect();
        lines.sort_unstable();
        lines.dedup();
        assert_eq!(lines.len(), 12);
        for line in lines {
            assert!(!line.is_empty());
        }
    }

    #[test]
    fn unknown_tag_gets_generic_fallback() {
        let line = fallback_chat_line("Unknown");
        assert!(!line.is_empty());
        assert_ne!(line, fallback_chat_line("Aries"));
    }

    #[test]
    fn trait_phrase_default_for_unknown() {
        assert_eq!(trait_phrase("Nope"), "empathetic and understanding");
        assert!(trait_phrase("Leo").contains("creative"));
    }
}
