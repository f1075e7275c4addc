//! Interactive explorer for the embeddings and attention weights of a pretrained BERT encoder.
//!
//! The crate tokenizes an input text with the WordPiece tokenizer of
//! [bert-base-multilingual-uncased](https://huggingface.co/bert-base-multilingual-uncased), runs a
//! single forward pass with [tch-rs](https://github.com/LaurentMazare/tch-rs) and exposes:
//! - the token, position and token type embeddings of every token
//! - the summary vector (final hidden state of the `[CLS]` token)
//! - the attention weights of every layer and head
//!
//! These artifacts are rendered as tables and heatmaps and laid out in a self-contained HTML page.
//!
//! # Loading pretrained models
//!
//! The encoder is the `rust-bert` BERT implementation. The default configuration downloads the
//! model resources (`config.json`, `vocab.txt` and the converted `rust_model.ot` weights) and
//! caches them in `~/.cache/.rustbert`, or in the directory set by the `RUSTBERT_CACHE`
//! environment variable. Weights in the Pytorch `.bin` format must be
//! converted beforehand; a local directory holding the three files can then be used with
//! `EmbeddingExtractorConfig::local`.
//!
//! ```no_run
//! use bert_explorer::pipelines::embedding_extraction::{
//!     EmbeddingExtractor, EmbeddingExtractorConfig,
//! };
//! use bert_explorer::pipelines::explorer::Explorer;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = EmbeddingExtractorConfig::local("models/bert-base-multilingual-uncased");
//! let extractor = EmbeddingExtractor::new(config)?;
//!
//! let page = Explorer::new(&extractor).analyze("Привет мир!")?;
//! std::fs::write("bert_explorer.html", page.to_html())?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - `remote` (default): download and cache pretrained resources
//! - `download-libtorch`: let `tch` fetch a libtorch build
//! - `all-tests`: run the tests requiring the pretrained model

pub mod error;
pub mod pipelines;
pub mod resources;

pub use error::ExplorerError;
