//! Category and keyword guessing from folder and file names.
//!
//! The tables are immutable and live for the whole process.

use std::sync::OnceLock;

use regex::Regex;

/// Categories and the words that indicate them.
pub const CATEGORIES: &[(&str, &[&str])] = &[
    ("Accordion", &["accordion", "bandoneon", "concertina", "harmonica"]),
    ("Bass", &["bass", "sub", "808", "bs"]),
    ("Bell", &["bell", "bells", "chime", "chimes", "gong"]),
    ("Brass", &["brass", "trumpet", "horn", "trombone", "tuba", "cornet", "flugelhorn"]),
    ("Chip", &["chip", "8bit", "chiptune", "nes", "gameboy"]),
    ("Choir", &["choir", "choral", "chorus", "voices"]),
    ("Clap", &["clap", "claps", "snap", "snaps"]),
    ("Drums", &["drum", "drums", "kit", "drumkit", "breakbeat"]),
    ("FX", &["fx", "sfx", "effect", "effects", "noise", "riser", "impact"]),
    ("Flute", &["flute", "piccolo", "recorder", "whistle", "pan flute"]),
    ("Guitar", &["guitar", "gtr", "banjo", "ukulele", "mandolin", "sitar"]),
    ("Hi-Hat", &["hihat", "hat", "hats", "hh", "cymbal", "ride", "crash"]),
    ("Keyboards", &["keys", "rhodes", "wurli", "wurlitzer", "clavinet", "clav", "epiano", "celesta", "harpsichord"]),
    ("Kick", &["kick", "bd", "bassdrum"]),
    ("Lead", &["lead", "ld", "solo"]),
    ("Mallet", &["mallet", "marimba", "vibraphone", "vibes", "xylophone", "glockenspiel", "kalimba"]),
    ("Orchestral", &["orchestra", "orchestral", "symphonic", "harp", "timpani"]),
    ("Organ", &["organ", "hammond", "b3", "church organ", "pipe organ"]),
    ("Pad", &["pad", "pads", "atmosphere", "ambient", "texture", "drone"]),
    ("Percussion", &["perc", "percussion", "conga", "bongo", "tabla", "shaker", "tambourine", "cowbell", "tom", "toms"]),
    ("Piano", &["piano", "pno", "grand", "upright"]),
    ("Plucks", &["pluck", "plucks", "pizzicato", "pizz"]),
    ("Snare", &["snare", "sd", "rimshot", "rim"]),
    ("Strings", &["string", "strings", "str", "violin", "viola", "cello", "contrabass", "fiddle"]),
    ("Synth", &["synth", "synths", "saw", "square", "analog", "poly", "juno", "moog"]),
    ("Vocal", &["vocal", "vocals", "vox", "voice", "singer"]),
    ("Winds", &["wind", "winds", "woodwind", "clarinet", "oboe", "bassoon", "sax", "saxophone"]),
];

/// Characterizations that become keywords.
pub const CHARACTERIZATIONS: &[(&str, &[&str])] = &[
    ("acoustic", &["acoustic", "acc"]),
    ("aggressive", &["aggressive", "angry", "hard"]),
    ("bright", &["bright", "brilliant"]),
    ("clean", &["clean", "pure"]),
    ("dark", &["dark", "gloomy"]),
    ("distorted", &["distorted", "dist", "overdrive", "fuzz", "crunch"]),
    ("electric", &["electric", "elec"]),
    ("evolving", &["evolving", "moving", "morph"]),
    ("ensemble", &["ensemble", "ens", "section"]),
    ("lofi", &["lofi", "lo-fi", "vintage", "tape"]),
    ("mellow", &["mellow", "gentle"]),
    ("soft", &["soft", "pp", "quiet"]),
    ("staccato", &["staccato", "stacc", "stac", "short"]),
    ("sustained", &["sustain", "sustained", "sus", "long"]),
    ("warm", &["warm"]),
    ("wet", &["wet", "reverb", "verb"]),
];

fn word_splitter() -> Option<&'static Regex> {
    static SPLITTER: OnceLock<Option<Regex>> = OnceLock::new();
    SPLITTER.get_or_init(|| Regex::new(r"[^A-Za-z0-9]+").ok()).as_ref()
}

/// Lower-case words of a name; camel case is not split.
fn words(text: &str) -> Vec<String> {
    let pieces: Vec<&str> = match word_splitter() {
        Some(splitter) => splitter.split(text).collect(),
        None => text.split_whitespace().collect(),
    };
    pieces
        .into_iter()
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

fn matches(words: &[String], joined: &str, synonym: &str) -> bool {
    if synonym.contains(' ') || synonym.contains('-') {
        joined.contains(synonym)
    } else {
        words.iter().any(|w| w == synonym)
    }
}

fn find_in_table(parts: &[String], table: &[(&str, &[&str])]) -> Option<String> {
    // Most specific part first
    for part in parts.iter().rev() {
        let part_words = words(part);
        let joined = part.to_lowercase();
        for (name, synonyms) in table {
            if synonyms.iter().any(|s| matches(&part_words, &joined, s)) {
                return Some(name.to_string());
            }
        }
    }
    None
}

/// The category suggested by the most specific name part that matches.
pub fn detect_category(parts: &[String]) -> Option<String> {
    find_in_table(parts, CATEGORIES)
}

/// All characterizations found in any name part.
pub fn detect_keywords(parts: &[String]) -> Vec<String> {
    let mut keywords = Vec::new();
    for part in parts {
        let part_words = words(part);
        let joined = part.to_lowercase();
        for (name, synonyms) in CHARACTERIZATIONS {
            if synonyms.iter().any(|s| matches(&part_words, &joined, s)) && !keywords.iter().any(|k| k == name) {
                keywords.push(name.to_string());
            }
        }
    }
    keywords
}

/// The first configured creator tag contained in one of the name parts.
pub fn detect_creator(parts: &[String], creator_tags: &[String]) -> Option<String> {
    creator_tags
        .iter()
        .filter(|tag| !tag.trim().is_empty())
        .find(|tag| {
            let tag = tag.to_lowercase();
            parts.iter().any(|p| p.to_lowercase().contains(&tag))
        })
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_category_prefers_specific_part() {
        assert_eq!(detect_category(&parts(&["Synths", "Warm Pad"])).as_deref(), Some("Pad"));
        assert_eq!(detect_category(&parts(&["Synths", "Thing"])).as_deref(), Some("Synth"));
        assert_eq!(detect_category(&parts(&["misc", "Thing"])), None);
    }

    #[test]
    fn test_multi_word_synonym() {
        assert_eq!(detect_category(&parts(&["Big Pipe Organ"])).as_deref(), Some("Organ"));
        assert_eq!(detect_category(&parts(&["My_Pan-Flute"])).as_deref(), Some("Flute"));
    }

    #[test]
    fn test_keywords() {
        let keywords = detect_keywords(&parts(&["Lo-Fi Keys", "soft_warm"]));
        assert_eq!(keywords, vec!["lofi".to_string(), "soft".to_string(), "warm".to_string()]);
    }

    #[test]
    fn test_creator() {
        let tags = vec!["".to_string(), "ACME".to_string()];
        assert_eq!(detect_creator(&parts(&["acme-sounds"]), &tags).as_deref(), Some("ACME"));
        assert_eq!(detect_creator(&parts(&["other"]), &tags), None);
    }

    #[test]
    fn test_tables_are_lower_case() {
        for (_, synonyms) in CATEGORIES.iter().chain(CHARACTERIZATIONS.iter()) {
            for s in *synonyms {
                assert_eq!(*s, s.to_lowercase());
            }
        }
    }
}
