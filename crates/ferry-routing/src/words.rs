//! Random words for generated hostnames

use rand::seq::SliceRandom;
use std::sync::LazyLock;

static ADJECTIVES: LazyLock<Vec<&'static str>> =
    LazyLock::new(|| word_list(include_str!("words/adjectives.txt")));

static NOUNS: LazyLock<Vec<&'static str>> =
    LazyLock::new(|| word_list(include_str!("words/nouns.txt")));

fn word_list(text: &'static str) -> Vec<&'static str> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}

/// Source of words for `<app>-<adjective>-<noun>` hostnames
pub trait RandomWords: Send + Sync {
    fn adjective(&self) -> String;
    fn noun(&self) -> String;
}

/// Picks uniformly from the built-in word lists
#[derive(Debug, Clone, Copy, Default)]
pub struct WordListRandomWords;

impl RandomWords for WordListRandomWords {
    fn adjective(&self) -> String {
        pick(&ADJECTIVES)
    }

    fn noun(&self) -> String {
        pick(&NOUNS)
    }
}

fn pick(words: &[&'static str]) -> String {
    words
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("random")
        .to_string()
}

/// Always returns the same words
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedWords {
    pub adjective: String,
    pub noun: String,
}

impl FixedWords {
    pub fn new(adjective: impl Into<String>, noun: impl Into<String>) -> Self {
        Self {
            adjective: adjective.into(),
            noun: noun.into(),
        }
    }
}

impl RandomWords for FixedWords {
    fn adjective(&self) -> String {
        self.adjective.clone()
    }

    fn noun(&self) -> String {
        self.noun.clone()
    }
}
