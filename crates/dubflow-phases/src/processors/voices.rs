//! Speaker-to-voice assignment.
//!
//! Speakers are assigned voices from a fixed pool by their order of first
//! appearance, so the mapping is stable across runs of the same document.

use std::collections::BTreeMap;

/// Built-in voice pool, cycled in order.
pub const VOICE_POOL: &[&str] = &["en_male_1", "en_female_1", "en_male_2", "en_female_2"];

/// Map each speaker to a voice id by first appearance in `speakers`.
pub fn assign(speakers: impl IntoIterator<Item = String>) -> BTreeMap<String, String> {
    let mut assignment = BTreeMap::new();
    let mut next = 0usize;
    for speaker in speakers {
        if !assignment.contains_key(&speaker) {
            let voice = VOICE_POOL[next % VOICE_POOL.len()];
            assignment.insert(speaker, voice.to_string());
            next += 1;
        }
    }
    assignment
}
