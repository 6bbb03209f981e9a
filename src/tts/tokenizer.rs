//! Character-level tokenizer for MMS VITS checkpoints.
//!
//! Reads `vocab.json` and `tokenizer_config.json` from the model directory.
//! Every vocabulary entry is a single character (or a short multi-char
//! symbol) and the model expects a blank token (id 0) between characters
//! when `add_blank` is set.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use crate::error::AppError;

lazy_static! {
    static ref NON_ROMAN: Regex = Regex::new(r"[^\x00-\x7F]").unwrap();
}

const BLANK_ID: i64 = 0;

#[derive(Debug, Clone, Deserialize)]
pub struct TokenizerConfig {
    #[serde(default = "default_true")]
    pub add_blank: bool,
    #[serde(default = "default_true")]
    pub normalize: bool,
    #[serde(default)]
    pub is_uroman: bool,
    #[serde(default)]
    pub language: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            add_blank: true,
            normalize: true,
            is_uroman: false,
            language: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoding {
    pub input_ids: Vec<i64>,
    pub attention_mask: Vec<i64>,
}

impl Encoding {
    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }
}

#[derive(Debug)]
pub struct VitsTokenizer {
    vocab: HashMap<String, i64>,
    // Vocabulary entries longer than one char, longest first.
    symbols: Vec<String>,
    config: TokenizerConfig,
}

impl VitsTokenizer {
    pub fn new(vocab: HashMap<String, i64>, config: TokenizerConfig) -> Self {
        let mut symbols: Vec<String> = vocab
            .keys()
            .filter(|k| k.chars().count() > 1)
            .cloned()
            .collect();
        symbols.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then(a.cmp(b)));

        Self {
            vocab,
            symbols,
            config,
        }
    }

    pub fn from_dir(dir: &Path) -> Result<Self, AppError> {
        let vocab: HashMap<String, i64> =
            serde_json::from_reader(File::open(dir.join("vocab.json"))?)?;

        let config_path = dir.join("tokenizer_config.json");
        let config = if config_path.exists() {
            serde_json::from_reader(File::open(&config_path)?)?
        } else {
            TokenizerConfig::default()
        };

        Ok(Self::new(vocab, config))
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    /// Lowercases every character that does not start a vocabulary entry.
    pub fn normalize(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        'outer: while let Some(ch) = rest.chars().next() {
            for symbol in &self.symbols {
                if rest.starts_with(symbol.as_str()) {
                    out.push_str(symbol);
                    rest = &rest[symbol.len()..];
                    continue 'outer;
                }
            }

            let mut buf = [0u8; 4];
            let key: &str = ch.encode_utf8(&mut buf);
            if self.vocab.contains_key(key) {
                out.push(ch);
            } else {
                out.extend(ch.to_lowercase());
            }
            rest = &rest[ch.len_utf8()..];
        }

        out
    }

    fn prepare(&self, text: &str) -> String {
        let mut text = if self.config.normalize {
            self.normalize(text)
        } else {
            text.to_string()
        };

        if self
            .config
            .language
            .as_deref()
            .is_some_and(|l| l.contains("ron"))
        {
            text = text.replace('ț', "ţ");
        }

        if self.config.is_uroman && NON_ROMAN.is_match(&text) {
            tracing::warn!(
                "Text contains non-Roman characters but the tokenizer expects romanized input; \
                 unknown characters will be dropped"
            );
        }

        text
    }

    pub fn encode(&self, text: &str) -> Encoding {
        let prepared = self.prepare(text);

        // Out-of-vocabulary characters are removed first, then the edges trimmed.
        let mut buf = [0u8; 4];
        let filtered: String = prepared
            .chars()
            .filter(|ch| self.vocab.contains_key(ch.encode_utf8(&mut buf) as &str))
            .collect();

        let dropped = prepared.chars().count() - filtered.chars().count();
        if dropped > 0 {
            tracing::debug!("Dropped {} characters missing from the vocabulary", dropped);
        }

        let tokens: Vec<i64> = filtered
            .trim()
            .chars()
            .filter_map(|ch| self.vocab.get(ch.encode_utf8(&mut buf) as &str).copied())
            .collect();

        let input_ids = if self.config.add_blank && !tokens.is_empty() {
            let mut ids = Vec::with_capacity(tokens.len() * 2 + 1);
            ids.push(BLANK_ID);
            for id in tokens {
                ids.push(id);
                ids.push(BLANK_ID);
            }
            ids
        } else {
            tokens
        };

        Encoding {
            attention_mask: vec![1; input_ids.len()],
            input_ids,
        }
    }
}
