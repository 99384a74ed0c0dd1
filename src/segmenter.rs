//! Text Segmentation
//!
//! The network works on tokens, but how a line of text is cut into tokens is
//! not its concern. A [`Segmenter`] turns one line into an ordered list of
//! tokens; the vocabulary and the training driver only ever see that list.
//!
//! [`CharSegmenter`] is the default and treats every Unicode scalar value as a
//! token, which suits CJK nicknames well. [`JiebaSegmenter`] cuts Chinese text
//! into dictionary words with `jieba-rs`, so "的" and multi-character words
//! become single tokens. [`SegmenterKind`] names the two for configuration.
//!
//! Other segmenters plug in by implementing the trait, or as a plain closure:
//!
//! ```rust
//! use nickname_rnn::Segmenter;
//!
//! let by_space = |text: &str| -> Vec<String> {
//!     text.split_whitespace().map(str::to_string).collect()
//! };
//! assert_eq!(by_space.segment("big cat"), vec!["big", "cat"]);
//! ```

use crate::error::NicknameError;
use jieba_rs::Jieba;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Splits a line of text into tokens
pub trait Segmenter: Send + Sync {
    fn segment(&self, text: &str) -> Vec<String>;
}

/// One token per Unicode scalar value
#[derive(Clone, Copy, Debug, Default)]
pub struct CharSegmenter;

impl Segmenter for CharSegmenter {
    fn segment(&self, text: &str) -> Vec<String> {
        text.chars().map(String::from).collect()
    }
}

/// Chinese word segmentation with the bundled jieba dictionary
///
/// Loading the dictionary takes a moment, so build one segmenter and share it.
pub struct JiebaSegmenter {
    jieba: Jieba,
}

impl JiebaSegmenter {
    pub fn new() -> Self {
        Self {
            jieba: Jieba::new(),
        }
    }
}

impl Default for JiebaSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for JiebaSegmenter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JiebaSegmenter").finish_non_exhaustive()
    }
}

impl Segmenter for JiebaSegmenter {
    fn segment(&self, text: &str) -> Vec<String> {
        // HMM on, so words missing from the dictionary are still grouped
        self.jieba
            .cut(text, true)
            .into_iter()
            .map(str::to_string)
            .collect()
    }
}

/// Segmenter selection for configuration files and the CLI
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmenterKind {
    /// [`CharSegmenter`]
    #[default]
    Char,
    /// [`JiebaSegmenter`]
    Jieba,
}

impl SegmenterKind {
    pub fn build(self) -> Arc<dyn Segmenter> {
        match self {
            SegmenterKind::Char => Arc::new(CharSegmenter),
            SegmenterKind::Jieba => Arc::new(JiebaSegmenter::new()),
        }
    }
}

impl FromStr for SegmenterKind {
    type Err = NicknameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "char" => Ok(SegmenterKind::Char),
            "jieba" => Ok(SegmenterKind::Jieba),
            other => Err(NicknameError::Config(format!(
                "unknown segmenter {:?}, expected \"char\" or \"jieba\"",
                other
            ))),
        }
    }
}

impl<F> Segmenter for F
where
    F: Fn(&str) -> Vec<String> + Send + Sync,
{
    fn segment(&self, text: &str) -> Vec<String> {
        self(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::Vocabulary;

    #[test]
    fn test_char_segmenter_handles_multibyte() {
        assert_eq!(CharSegmenter.segment("小猫咪"), vec!["小", "猫", "咪"]);
        assert!(CharSegmenter.segment("").is_empty());
    }

    #[test]
    fn test_jieba_keeps_words_whole() {
        let segmenter = JiebaSegmenter::new();
        assert_eq!(
            segmenter.segment("我爱北京天安门"),
            vec!["我", "爱", "北京", "天安门"]
        );

        let vocab = Vocabulary::build(["北京的小猫"], &segmenter, false).unwrap();
        assert!(vocab.index_of("北京").is_some());
        assert!(vocab.index_of("北").is_none());
        assert!(vocab.len() < "北京的小猫".chars().count());
    }

    #[test]
    fn test_segmenter_kind_parsing() {
        assert_eq!("char".parse::<SegmenterKind>().unwrap(), SegmenterKind::Char);
        assert_eq!("jieba".parse::<SegmenterKind>().unwrap(), SegmenterKind::Jieba);
        assert!(matches!(
            "words".parse::<SegmenterKind>(),
            Err(NicknameError::Config(_))
        ));
        assert_eq!(
            serde_json::from_str::<SegmenterKind>(r#""jieba""#).unwrap(),
            SegmenterKind::Jieba
        );
        assert_eq!(SegmenterKind::Jieba.build().segment("北京"), vec!["北京"]);
        assert_eq!(SegmenterKind::Char.build().segment("北京"), vec!["北", "京"]);
    }

    #[test]
    fn test_closure_segmenter() {
        let pairs = |text: &str| -> Vec<String> {
            let chars: Vec<char> = text.chars().collect();
            chars.chunks(2).map(|c| c.iter().collect()).collect()
        };
        assert_eq!(pairs.segment("abcde"), vec!["ab", "cd", "e"]);
    }
}
