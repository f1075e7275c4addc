//! # Model resources
//!
//! Files of the pretrained `bert-base-multilingual-uncased` encoder, as `(cache_subdir, url)` pairs
//! consumed by `RemoteResource::from_pretrained`. Resource providers are those of `rust_bert`.
//!
//! The weights are expected in the `.ot` format. Checkpoints only published as
//! `pytorch_model.bin` have to be converted with the `convert_model.py` utility of rust-bert and
//! loaded from a local directory (`EmbeddingExtractorConfig::local`).

pub use rust_bert::resources::{LocalResource, ResourceProvider};

#[cfg(feature = "remote")]
pub use rust_bert::resources::RemoteResource;

/// # Multilingual uncased BERT pretrained files
pub struct MultilingualBertResources;

impl MultilingualBertResources {
    /// Shared under Apache 2.0 license by the Google team at <https://github.com/google-research/bert>. Modified with conversion to C-array format.
    pub const MODEL: (&'static str, &'static str) = (
        "bert-base-multilingual-uncased/model",
        "https://huggingface.co/bert-base-multilingual-uncased/resolve/main/rust_model.ot",
    );
    /// Shared under Apache 2.0 license by the Google team at <https://github.com/google-research/bert>.
    pub const CONFIG: (&'static str, &'static str) = (
        "bert-base-multilingual-uncased/config",
        "https://huggingface.co/bert-base-multilingual-uncased/resolve/main/config.json",
    );
    /// Shared under Apache 2.0 license by the Google team at <https://github.com/google-research/bert>.
    pub const VOCAB: (&'static str, &'static str) = (
        "bert-base-multilingual-uncased/vocab",
        "https://huggingface.co/bert-base-multilingual-uncased/resolve/main/vocab.txt",
    );
}
