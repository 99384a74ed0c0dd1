//! Token Vocabulary
//!
//! A bidirectional mapping between tokens and dense indices `0..V`. The
//! vocabulary is built once from the training corpus and never changes
//! afterwards; growing it means retraining, because `V` fixes the shapes of
//! `Wax`, `Wya` and `by`.
//!
//! ## Index Order
//!
//! [`Vocabulary::build`] assigns indices in ascending lexicographic order of
//! the distinct tokens. The same corpus therefore always yields the same
//! indices, and snapshots taken from two runs are interchangeable.
//! [`Vocabulary::from_tokens`] keeps the caller's order instead.
//!
//! ## End Token
//!
//! The literal newline [`END_TOKEN`] marks the end of a sequence. Its presence
//! is optional: without it the sampler can only stop at its length limit.

use crate::error::{NicknameError, Result};
use crate::segmenter::Segmenter;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Token that terminates a nickname
pub const END_TOKEN: &str = "\n";

/// Token-to-index and index-to-token maps
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Vocabulary {
    token_to_index: HashMap<String, usize>,
    index_to_token: Vec<String>,
}

impl Vocabulary {
    /// Build a vocabulary from corpus lines
    ///
    /// Blank lines are skipped. Each remaining line is trimmed and segmented.
    /// When `append_end_token` is set, every line also contributes
    /// [`END_TOKEN`].
    ///
    /// # Errors
    ///
    /// [`NicknameError::DegenerateVocabulary`] when no line yields a token.
    pub fn build<S, I>(lines: I, segmenter: &S, append_end_token: bool) -> Result<Self>
    where
        S: Segmenter + ?Sized,
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut distinct = BTreeSet::new();
        let mut any_line = false;
        for line in lines {
            let line = line.as_ref().trim();
            if line.is_empty() {
                continue;
            }
            any_line = true;
            distinct.extend(segmenter.segment(line));
        }
        if append_end_token && any_line {
            distinct.insert(END_TOKEN.to_string());
        }

        if distinct.is_empty() {
            return Err(NicknameError::DegenerateVocabulary);
        }
        Ok(Self::from_tokens(distinct))
    }

    /// Vocabulary with indices in iteration order; repeated tokens keep their
    /// first index
    ///
    /// ```rust
    /// use nickname_rnn::Vocabulary;
    ///
    /// let vocab = Vocabulary::from_tokens(["苹", "果", "\n"]);
    /// assert_eq!(vocab.index_of("果"), Some(1));
    /// assert_eq!(vocab.end_index(), Some(2));
    /// ```
    pub fn from_tokens<I>(tokens: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut token_to_index = HashMap::new();
        let mut index_to_token = Vec::new();
        for token in tokens {
            let token = token.into();
            if !token_to_index.contains_key(&token) {
                token_to_index.insert(token.clone(), index_to_token.len());
                index_to_token.push(token);
            }
        }
        Self {
            token_to_index,
            index_to_token,
        }
    }

    /// Number of distinct tokens (`V`)
    pub fn len(&self) -> usize {
        self.index_to_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index_to_token.is_empty()
    }

    pub fn index_of(&self, token: &str) -> Option<usize> {
        self.token_to_index.get(token).copied()
    }

    pub fn token(&self, index: usize) -> Option<&str> {
        self.index_to_token.get(index).map(String::as_str)
    }

    /// Index of [`END_TOKEN`], if the corpus contained it
    pub fn end_index(&self) -> Option<usize> {
        self.index_of(END_TOKEN)
    }

    /// Tokens in index order
    pub fn tokens(&self) -> &[String] {
        &self.index_to_token
    }

    /// Map tokens to indices, silently dropping tokens outside the vocabulary
    pub fn encode<T: AsRef<str>>(&self, tokens: &[T]) -> Vec<usize> {
        tokens
            .iter()
            .filter_map(|t| self.index_of(t.as_ref()))
            .collect()
    }
}

impl From<Vocabulary> for Vec<String> {
    fn from(vocab: Vocabulary) -> Self {
        vocab.index_to_token
    }
}

impl TryFrom<Vec<String>> for Vocabulary {
    type Error = String;

    fn try_from(tokens: Vec<String>) -> std::result::Result<Self, Self::Error> {
        let expected = tokens.len();
        let vocab = Vocabulary::from_tokens(tokens);
        if vocab.len() != expected {
            return Err(format!(
                "vocabulary has duplicate tokens ({} unique of {})",
                vocab.len(),
                expected
            ));
        }
        Ok(vocab)
    }
}
