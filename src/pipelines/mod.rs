//! # Explorer pipelines
//!
//! The explorer is split in three layers:
//!
//! #### 1. Embedding extraction
//! `EmbeddingExtractor` owns the WordPiece tokenizer and the pretrained encoder. For a given text
//! it returns the tokens, the raw token, position and token type embeddings, the summary vector
//! and the attention weights of every layer and head.
//!
//! #### 2. Visualization
//! Renderers turning the extracted artifacts into charts (vector tables and attention heatmaps)
//! serializable as Plotly figures.
//!
//! #### 3. Explorer
//! Page controller validating the input, running one extraction per request and laying the charts
//! out in tabs. Pages can be rendered to a self-contained HTML document.
//!
//! ```no_run
//! use bert_explorer::pipelines::embedding_extraction::{
//!     EmbeddingExtractor, EmbeddingExtractorConfig,
//! };
//! use bert_explorer::pipelines::explorer::{Explorer, TabKind};
//!
//! # fn main() -> anyhow::Result<()> {
//! let extractor = EmbeddingExtractor::new(EmbeddingExtractorConfig::default())?;
//! let explorer = Explorer::new(&extractor).with_attention_selection(11, 0);
//! let page = explorer.analyze("Bonjour le monde !")?;
//!
//! let token_tab = page.tab(TabKind::TokenEmbeddings).unwrap();
//! assert_eq!(token_tab.charts.len(), page.tokens.len());
//! # Ok(())
//! # }
//! ```

pub mod embedding_extraction;
pub mod explorer;
pub mod visualization;
