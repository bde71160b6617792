// src/keywords/stopwords.rs
//! Function words that carry no search value. Lemmatized forms, lowercase.

use once_cell::sync::Lazy;
use std::collections::HashSet;

const RU: &[&str] = &[
    "а", "без", "бы", "быть", "в", "вам", "вас", "весь", "во", "вот", "все", "вы", "где", "да",
    "даже", "для", "до", "его", "ее", "если", "есть", "еще", "же", "за", "здесь", "и", "из",
    "или", "им", "их", "к", "как", "ко", "когда", "кто", "ли", "либо", "мне", "может", "мы",
    "на", "над", "надо", "наш", "не", "него", "нее", "нет", "ни", "них", "но", "ну", "о", "об",
    "однако", "он", "она", "они", "оно", "от", "очень", "по", "под", "при", "с", "со", "так",
    "также", "такой", "там", "те", "тем", "то", "того", "тоже", "той", "только", "том", "ты",
    "у", "уже", "хотя", "чего", "чей", "чем", "что", "чтобы", "эта", "эти", "это", "этот", "я",
];

const EN: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have", "he",
    "her", "his", "in", "is", "it", "its", "of", "on", "or", "she", "that", "the", "their",
    "they", "this", "to", "was", "were", "will", "with",
];

static STOP_WORDS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| RU.iter().chain(EN.iter()).copied().collect());

/// Expects an already lowercased term.
pub fn is_stop_word(term: &str) -> bool {
    STOP_WORDS.contains(term)
}
