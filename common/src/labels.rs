//! Label vocabulary mapping class indices to readable names.
//!
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LabelError {
    #[error("failed to read labels: {0}")]
    Io(#[from] std::io::Error),

    #[error("label vocabulary is empty")]
    Empty,
}

/// Ordered, immutable list of class labels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Vocabulary {
    labels: Vec<String>,
}

impl Vocabulary {
    pub fn new(labels: Vec<String>) -> Result<Self, LabelError> {
        if labels.is_empty() {
            return Err(LabelError::Empty);
        }
        Ok(Self { labels })
    }

    /// Parse one label per line, skipping blank lines.
    ///
    /// Lines in the ImageNet synset format (`n01440764 tench, Tinca tinca`) lose their leading
    /// synset id.
    pub fn from_lines(text: &str) -> Result<Self, LabelError> {
        let labels = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| strip_synset_id(line).to_owned())
            .collect();
        Self::new(labels)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LabelError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let vocabulary = Self::from_lines(&text)?;
        log::info!(
            "Loaded {} labels from {}",
            vocabulary.len(),
            path.as_ref().display()
        );
        Ok(vocabulary)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

fn strip_synset_id(line: &str) -> &str {
    match line.split_once(' ') {
        Some((id, rest))
            if id.len() == 9
                && id.starts_with('n')
                && id[1..].bytes().all(|b| b.is_ascii_digit()) =>
        {
            rest.trim_start()
        }
        _ => line,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_synset_lines() {
        let text = "n01440764 tench, Tinca tinca\n\nn01443537 goldfish, Carassius auratus\n";
        let vocabulary = Vocabulary::from_lines(text).unwrap();

        assert_eq!(vocabulary.len(), 2);
        assert_eq!(vocabulary.get(0), Some("tench, Tinca tinca"));
        assert_eq!(vocabulary.get(1), Some("goldfish, Carassius auratus"));
        assert_eq!(vocabulary.get(2), None);
    }

    #[test]
    fn plain_labels_are_kept() {
        let vocabulary = Vocabulary::from_lines("cat\n  dog \nn123 not a synset\n").unwrap();
        assert_eq!(vocabulary.labels(), &["cat", "dog", "n123 not a synset"]);
    }

    #[test]
    fn empty_vocabulary_is_rejected() {
        assert!(matches!(
            Vocabulary::from_lines("\n \n"),
            Err(LabelError::Empty)
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let res = Vocabulary::from_path("/definitely/not/here/synset.txt");
        assert!(matches!(res, Err(LabelError::Io(_))));
    }
}
