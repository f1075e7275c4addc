// Copyright 2019 Guillaume Becquin
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Embedding extraction pipeline
//!
//! Tokenizes an input text with the WordPiece tokenizer of a pretrained BERT encoder, runs a
//! single inference pass and collects the artifacts displayed by the explorer:
//! - the raw word, position and token type embeddings, looked up directly in the embedding tables
//!   (these are the *input* representations, not contextualized by the encoder layers)
//! - the summary vector, read from the final hidden state at the first (`[CLS]`) position
//! - the attention weights of every layer and head
//!
//! The model defaults to the pretrained `bert-base-multilingual-uncased` encoder.
//!
//! ```no_run
//! use bert_explorer::pipelines::embedding_extraction::{
//!     EmbeddingExtractor, EmbeddingExtractorConfig,
//! };
//!
//! # fn main() -> anyhow::Result<()> {
//! let extractor = EmbeddingExtractor::new(EmbeddingExtractorConfig::default())?;
//! let bundle = extractor.extract("Hello!")?;
//!
//! assert_eq!(bundle.tokens.first().map(String::as_str), Some("[CLS]"));
//! assert_eq!(bundle.token_embeddings.len(), bundle.tokens.len());
//! # Ok(())
//! # }
//! ```

use crate::resources::{LocalResource, ResourceProvider};
use crate::ExplorerError;
use rust_bert::bert::{BertConfig, BertEmbeddings, BertModel};
use rust_tokenizers::tokenizer::{BertTokenizer, Tokenizer, TruncationStrategy};
use rust_tokenizers::vocab::Vocab;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tch::{nn, no_grad, Device, Kind, Tensor};
use tracing::{debug, info};

#[cfg(feature = "remote")]
use crate::resources::{MultilingualBertResources, RemoteResource};

/// Length = hidden size
pub type Embedding = Vec<f32>;
/// Length = sequence length (one weight per key token)
pub type Attention = Vec<f32>;
/// Length = sequence length (one row per query token)
pub type AttentionHead = Vec<Attention>;
/// Length = number of heads per attention layer
pub type AttentionLayer = Vec<AttentionHead>;
/// Length = number of attention layers
pub type AttentionOutput = Vec<AttentionLayer>;

/// # Configuration for EmbeddingExtractor
/// Contains information regarding the model to load and device to place the model on.
pub struct EmbeddingExtractorConfig {
    /// Model weights resource (default: pretrained multilingual uncased BERT)
    pub model_resource: Box<dyn ResourceProvider + Send>,
    /// Config resource (default: pretrained multilingual uncased BERT)
    pub config_resource: Box<dyn ResourceProvider + Send>,
    /// Vocab resource (default: pretrained multilingual uncased BERT)
    pub vocab_resource: Box<dyn ResourceProvider + Send>,
    /// Automatically lower case all input upon tokenization (assumes a lower-cased model)
    pub lower_case: bool,
    /// Flag indicating if the tokenizer should strip accents (normalization). Defaults to `lower_case`
    pub strip_accents: Option<bool>,
    /// Variable store prefix of the encoder weights in the weights file (`bert` for checkpoints converted from the Transformers library)
    pub weights_prefix: Option<String>,
    /// Device to place the model on (default: CUDA/GPU when available)
    pub device: Device,
}

impl EmbeddingExtractorConfig {
    /// Instantiate a new embedding extraction configuration.
    ///
    /// # Arguments
    ///
    /// * `model_resource` - The `ResourceProvider` pointing to the model weights to load (e.g. rust_model.ot)
    /// * `config_resource` - The `ResourceProvider` pointing to the model configuration to load (e.g. config.json)
    /// * `vocab_resource` - The `ResourceProvider` pointing to the tokenizer's vocabulary to load (e.g. vocab.txt)
    /// * `lower_case` - A `bool` indicating whether the tokenizer should lower case all input (in case of a lower-cased model)
    /// * `strip_accents` - Optional flag for accent stripping, defaults to `lower_case`
    pub fn new<RM, RC, RV>(
        model_resource: RM,
        config_resource: RC,
        vocab_resource: RV,
        lower_case: bool,
        strip_accents: impl Into<Option<bool>>,
    ) -> EmbeddingExtractorConfig
    where
        RM: ResourceProvider + Send + 'static,
        RC: ResourceProvider + Send + 'static,
        RV: ResourceProvider + Send + 'static,
    {
        EmbeddingExtractorConfig {
            model_resource: Box::new(model_resource),
            config_resource: Box::new(config_resource),
            vocab_resource: Box::new(vocab_resource),
            lower_case,
            strip_accents: strip_accents.into(),
            weights_prefix: Some("bert".to_string()),
            device: Device::cuda_if_available(),
        }
    }

    /// Configuration reading a model from a local directory holding `config.json`, `vocab.txt`
    /// and `rust_model.ot` (lower-cased tokenization).
    pub fn local<P: Into<PathBuf>>(model_dir: P) -> EmbeddingExtractorConfig {
        let model_dir = model_dir.into();
        EmbeddingExtractorConfig::new(
            LocalResource {
                local_path: model_dir.join("rust_model.ot"),
            },
            LocalResource {
                local_path: model_dir.join("config.json"),
            },
            LocalResource {
                local_path: model_dir.join("vocab.txt"),
            },
            true,
            None,
        )
    }

    /// Places the model on `device`
    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Sets the variable store prefix of the encoder weights. `None` for weights stored at the
    /// root of the file (e.g. `embeddings.word_embeddings.weight`).
    pub fn with_weights_prefix(mut self, weights_prefix: Option<&str>) -> Self {
        self.weights_prefix = weights_prefix.map(str::to_string);
        self
    }
}

#[cfg(feature = "remote")]
impl Default for EmbeddingExtractorConfig {
    /// Provides the pretrained multilingual uncased BERT encoder
    fn default() -> EmbeddingExtractorConfig {
        EmbeddingExtractorConfig::new(
            RemoteResource::from_pretrained(MultilingualBertResources::MODEL),
            RemoteResource::from_pretrained(MultilingualBertResources::CONFIG),
            RemoteResource::from_pretrained(MultilingualBertResources::VOCAB),
            true,
            None,
        )
    }
}

/// Token ids and their string forms, including the `[CLS]` and `[SEP]` boundary tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizationOutput {
    pub ids: Vec<i64>,
    pub tokens: Vec<String>,
}

/// # Artifacts extracted for a single input
/// Every per-token matrix has one row per entry of `tokens`, each of the model hidden size.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingBundle {
    /// Token strings, aligned with the rows of the embedding matrices
    pub tokens: Vec<String>,
    /// Rows of the word embedding table at the token ids
    pub token_embeddings: Vec<Embedding>,
    /// Rows of the position embedding table at positions `0..tokens.len()`
    pub position_embeddings: Vec<Embedding>,
    /// Rows of the token type embedding table (all tokens are assigned type 0)
    pub token_type_embeddings: Vec<Embedding>,
    /// Final hidden state at the first position
    pub summary_vector: Embedding,
    /// Attention weights indexed by (layer, head, query token, key token)
    pub attentions: AttentionOutput,
}

/// # Source of tokenization and embedding artifacts
/// Implemented by `EmbeddingExtractor`; the explorer only depends on this interface.
pub trait EmbeddingSource {
    /// Tokenizes the input text
    fn tokenize(&self, text: &str) -> Result<TokenizationOutput, ExplorerError>;

    /// Runs the model on the input text and collects the embedding artifacts
    fn extract(&self, text: &str) -> Result<EmbeddingBundle, ExplorerError>;
}

impl<T: EmbeddingSource + ?Sized> EmbeddingSource for &T {
    fn tokenize(&self, text: &str) -> Result<TokenizationOutput, ExplorerError> {
        T::tokenize(self, text)
    }

    fn extract(&self, text: &str) -> Result<EmbeddingBundle, ExplorerError> {
        T::extract(self, text)
    }
}

/// Embedding tables of the loaded encoder, sharing storage with the variable store
struct EmbeddingTables {
    word: Tensor,
    position: Tensor,
    token_type: Tensor,
}

impl EmbeddingTables {
    fn from_var_store(
        var_store: &nn::VarStore,
        weights_prefix: Option<&str>,
    ) -> Result<EmbeddingTables, ExplorerError> {
        let variables = var_store.variables();
        let table = |name: &str| {
            let key = match weights_prefix {
                Some(prefix) => format!("{prefix}.embeddings.{name}.weight"),
                None => format!("embeddings.{name}.weight"),
            };
            variables
                .get(&key)
                .map(Tensor::shallow_clone)
                .ok_or_else(|| {
                    ExplorerError::InvalidConfigurationError(format!(
                        "Embedding table {key} not found in the model variables"
                    ))
                })
        };

        Ok(EmbeddingTables {
            word: table("word_embeddings")?,
            position: table("position_embeddings")?,
            token_type: table("token_type_embeddings")?,
        })
    }
}

/// Rows of `table` at the (1-D) `ids`
fn lookup(table: &Tensor, ids: &Tensor) -> Result<Tensor, ExplorerError> {
    Ok(table.f_index_select(0, ids)?)
}

fn read_config(path: &Path) -> Result<BertConfig, ExplorerError> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// # EmbeddingExtractor
/// Owns the tokenizer and the pretrained encoder. Both are loaded once at construction and are
/// never mutated afterwards: all methods take `&self`.
pub struct EmbeddingExtractor {
    tokenizer: BertTokenizer,
    model: BertModel<BertEmbeddings>,
    embedding_tables: EmbeddingTables,
    var_store: nn::VarStore,
    max_length: usize,
    hidden_size: i64,
    num_layers: i64,
    num_heads: i64,
}

impl EmbeddingExtractor {
    /// Build a new `EmbeddingExtractor`
    ///
    /// # Arguments
    ///
    /// * `config` - `EmbeddingExtractorConfig` object containing the resource references (model, vocabulary, configuration) and device placement (CPU/GPU)
    ///
    /// # Example
    ///
    /// ```no_run
    /// # fn main() -> anyhow::Result<()> {
    /// use bert_explorer::pipelines::embedding_extraction::{
    ///     EmbeddingExtractor, EmbeddingExtractorConfig,
    /// };
    ///
    /// let extractor =
    ///     EmbeddingExtractor::new(EmbeddingExtractorConfig::local("path/to/model_dir"))?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(config: EmbeddingExtractorConfig) -> Result<EmbeddingExtractor, ExplorerError> {
        let vocab_path = config.vocab_resource.get_local_path()?;
        let tokenizer = BertTokenizer::from_file(
            vocab_path.to_string_lossy().as_ref(),
            config.lower_case,
            config.strip_accents.unwrap_or(config.lower_case),
        )?;
        Self::new_with_tokenizer(config, tokenizer)
    }

    /// Build a new `EmbeddingExtractor` with a provided tokenizer.
    ///
    /// # Arguments
    ///
    /// * `config` - `EmbeddingExtractorConfig` object containing the resource references (model, vocabulary, configuration) and device placement (CPU/GPU)
    /// * `tokenizer` - `BertTokenizer` matching the model vocabulary
    pub fn new_with_tokenizer(
        config: EmbeddingExtractorConfig,
        tokenizer: BertTokenizer,
    ) -> Result<EmbeddingExtractor, ExplorerError> {
        let config_path = config.config_resource.get_local_path()?;
        let weights_path = config.model_resource.get_local_path()?;

        let mut bert_config = read_config(&config_path)?;
        bert_config.output_attentions = Some(true);
        bert_config.output_hidden_states = Some(false);

        if bert_config.max_position_embeddings < 2 {
            return Err(ExplorerError::InvalidConfigurationError(format!(
                "max_position_embeddings must leave room for the boundary tokens, got {}",
                bert_config.max_position_embeddings
            )));
        }

        let mut var_store = nn::VarStore::new(config.device);
        let weights_prefix = config.weights_prefix.as_deref();
        let model = match weights_prefix {
            Some(prefix) => BertModel::<BertEmbeddings>::new_with_optional_pooler(
                var_store.root() / prefix,
                &bert_config,
                false,
            ),
            None => BertModel::<BertEmbeddings>::new_with_optional_pooler(
                var_store.root(),
                &bert_config,
                false,
            ),
        };
        info!(
            weights = %weights_path.display(),
            device = ?config.device,
            "loading encoder weights"
        );
        var_store.load(&weights_path)?;
        var_store.freeze();
        let embedding_tables = EmbeddingTables::from_var_store(&var_store, weights_prefix)?;

        Ok(EmbeddingExtractor {
            tokenizer,
            model,
            embedding_tables,
            var_store,
            max_length: bert_config.max_position_embeddings as usize,
            hidden_size: bert_config.hidden_size,
            num_layers: bert_config.num_hidden_layers,
            num_heads: bert_config.num_attention_heads,
        })
    }

    /// Get a reference to the model tokenizer.
    pub fn get_tokenizer(&self) -> &BertTokenizer {
        &self.tokenizer
    }

    /// Dimension of every embedding row and of the summary vector
    pub fn hidden_size(&self) -> i64 {
        self.hidden_size
    }

    /// Number of encoder layers, i.e. number of attention layers in the bundle
    pub fn num_layers(&self) -> i64 {
        self.num_layers
    }

    /// Number of attention heads per layer
    pub fn num_heads(&self) -> i64 {
        self.num_heads
    }

    /// Maximum number of tokens (boundary tokens included) kept by the tokenizer
    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Tokenizes the input text, adding the `[CLS]` and `[SEP]` boundary tokens. Inputs longer
    /// than the position table are truncated.
    pub fn tokenize(&self, text: &str) -> Result<TokenizationOutput, ExplorerError> {
        let tokenized_input = self.tokenizer.encode(
            text,
            None,
            self.max_length,
            &TruncationStrategy::LongestFirst,
            0,
        );
        let ids = tokenized_input.token_ids;
        let tokens = ids
            .iter()
            .map(|id| self.tokenizer.vocab().id_to_token(id))
            .collect::<Vec<String>>();

        if tokenized_input.num_truncated_tokens > 0 {
            debug!(
                truncated = tokenized_input.num_truncated_tokens,
                "input truncated to the maximum sequence length"
            );
        }
        Ok(TokenizationOutput { ids, tokens })
    }

    /// Runs a single inference pass on the input text and collects the embedding artifacts.
    ///
    /// Gradient tracking is disabled and dropout layers are off: repeated calls with the same
    /// input return identical values. The token, position and token type embeddings are read
    /// from the embedding tables, the summary vector from the final hidden state.
    pub fn extract(&self, text: &str) -> Result<EmbeddingBundle, ExplorerError> {
        let TokenizationOutput { ids, tokens } = self.tokenize(text)?;
        let device = self.var_store.device();
        let input_ids = Tensor::from_slice(&ids).to(device);
        let position_ids = Tensor::arange(ids.len() as i64, (Kind::Int64, device));
        let token_type_ids = position_ids.zeros_like();

        let (token_embeddings, position_embeddings, token_type_embeddings, summary, attentions) =
            no_grad(|| -> Result<_, ExplorerError> {
                let model_output = self.model.forward_t(
                    Some(&input_ids.unsqueeze(0)),
                    None,
                    None,
                    None,
                    None,
                    None,
                    None,
                    false,
                )?;
                let all_attentions = model_output.all_attentions.ok_or_else(|| {
                    ExplorerError::InvalidConfigurationError("No attention outputted".into())
                })?;

                Ok((
                    lookup(&self.embedding_tables.word, &input_ids)?,
                    lookup(&self.embedding_tables.position, &position_ids)?,
                    lookup(&self.embedding_tables.token_type, &token_type_ids)?,
                    model_output.hidden_state.get(0).get(0),
                    all_attentions,
                ))
            })?;

        let bundle = EmbeddingBundle {
            tokens,
            token_embeddings: to_matrix(token_embeddings)?,
            position_embeddings: to_matrix(position_embeddings)?,
            token_type_embeddings: to_matrix(token_type_embeddings)?,
            summary_vector: to_vector(summary)?,
            attentions: self.to_attention_output(attentions)?,
        };
        debug!(
            tokens = bundle.tokens.len(),
            hidden_size = self.hidden_size,
            layers = bundle.attentions.len(),
            "extracted embeddings"
        );
        Ok(bundle)
    }

    fn to_attention_output(
        &self,
        all_attentions: Vec<Tensor>,
    ) -> Result<AttentionOutput, ExplorerError> {
        all_attentions
            .into_iter()
            .map(|layer| {
                let layer = layer.get(0);
                (0..self.num_heads)
                    .map(|head| to_matrix(layer.get(head)))
                    .collect::<Result<AttentionLayer, ExplorerError>>()
            })
            .collect()
    }
}

impl EmbeddingSource for EmbeddingExtractor {
    fn tokenize(&self, text: &str) -> Result<TokenizationOutput, ExplorerError> {
        EmbeddingExtractor::tokenize(self, text)
    }

    fn extract(&self, text: &str) -> Result<EmbeddingBundle, ExplorerError> {
        EmbeddingExtractor::extract(self, text)
    }
}

fn to_matrix(tensor: Tensor) -> Result<Vec<Vec<f32>>, ExplorerError> {
    Ok(Vec::<Vec<f32>>::try_from(
        tensor.to_kind(Kind::Float).to_device(Device::Cpu),
    )?)
}

fn to_vector(tensor: Tensor) -> Result<Vec<f32>, ExplorerError> {
    Ok(Vec::<f32>::try_from(
        tensor.to_kind(Kind::Float).to_device(Device::Cpu),
    )?)
}
