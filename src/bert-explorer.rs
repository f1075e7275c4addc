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

use bert_explorer::pipelines::embedding_extraction::{
    EmbeddingExtractor, EmbeddingExtractorConfig,
};
use bert_explorer::pipelines::explorer::{AnalysisPage, Explorer, DEFAULT_TEXT};
use bert_explorer::ExplorerError;
use anyhow::Context;
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tch::Device;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

const MODEL_DIR_HELP: &str = "Pretrained weights must be in the .ot format. Convert \
pytorch_model.bin with rust-bert's utils/convert_model.py and pass the resulting directory \
with --model-dir.";

#[derive(Parser, Debug)]
#[command(name = "bert-explorer")]
#[command(about = "Explore the embeddings and attention weights of a multilingual BERT encoder")]
#[command(after_help = MODEL_DIR_HELP)]
struct Args {
    /// Text to analyze.
    #[arg(long, default_value = DEFAULT_TEXT)]
    text: String,

    /// Directory holding config.json, vocab.txt and rust_model.ot. When omitted, the
    /// bert-base-multilingual-uncased files are downloaded, which requires a converted
    /// rust_model.ot to be published for that model.
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// HTML page to write.
    #[arg(long, default_value = "bert_explorer.html")]
    output: PathBuf,

    /// Read texts from stdin, one per line, and rewrite the page after each of them.
    #[arg(long)]
    interactive: bool,

    /// Attention layer displayed in the attention tab.
    #[arg(long, default_value = "0")]
    layer: usize,

    /// Attention head displayed in the attention tab.
    #[arg(long, default_value = "0")]
    head: usize,

    /// Run on CPU even if a GPU is available.
    #[arg(long)]
    cpu: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_writer(io::stderr)
        .with_env_filter(filter)
        .init();

    let device = if args.cpu {
        Device::Cpu
    } else {
        Device::cuda_if_available()
    };
    let config = extractor_config(args.model_dir.as_deref())?.with_device(device);
    let extractor = EmbeddingExtractor::new(config).with_context(|| match &args.model_dir {
        Some(model_dir) => format!("could not load the model from {}", model_dir.display()),
        None => format!("could not load the pretrained model. {MODEL_DIR_HELP}"),
    })?;
    info!(
        hidden_size = extractor.hidden_size(),
        layers = extractor.num_layers(),
        heads = extractor.num_heads(),
        "model loaded"
    );

    let explorer = Explorer::new(&extractor).with_attention_selection(args.layer, args.head);

    if !args.interactive {
        let page = explorer.analyze(&args.text)?;
        return write_page(&page, &args.output);
    }

    println!("Enter a text to analyze (Ctrl-D to quit):");
    for line in io::stdin().lock().lines() {
        let text = line?;
        match explorer.analyze(&text) {
            Ok(page) => write_page(&page, &args.output)?,
            Err(ExplorerError::EmptyInput) => println!("{}", ExplorerError::EmptyInput),
            Err(error) => eprintln!("Error: {error}"),
        }
        io::stdout().flush()?;
    }
    Ok(())
}

#[cfg(feature = "remote")]
fn extractor_config(model_dir: Option<&Path>) -> anyhow::Result<EmbeddingExtractorConfig> {
    Ok(match model_dir {
        Some(model_dir) => EmbeddingExtractorConfig::local(model_dir),
        None => EmbeddingExtractorConfig::default(),
    })
}

#[cfg(not(feature = "remote"))]
fn extractor_config(model_dir: Option<&Path>) -> anyhow::Result<EmbeddingExtractorConfig> {
    match model_dir {
        Some(model_dir) => Ok(EmbeddingExtractorConfig::local(model_dir)),
        None => anyhow::bail!("--model-dir is required when built without the `remote` feature"),
    }
}

fn write_page(page: &AnalysisPage, output: &Path) -> anyhow::Result<()> {
    println!("Tokens: {}", page.tokens.join(" "));
    std::fs::write(output, page.to_html())?;
    println!("Page written to {}", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn help_documents_local_models() {
        let help = Args::command().render_long_help().to_string();
        assert!(help.contains("--model-dir"));
        assert!(help.contains("convert_model.py"));
    }

    #[test]
    fn defaults() {
        let args = Args::parse_from(["bert-explorer"]);
        assert_eq!(args.text, DEFAULT_TEXT);
        assert_eq!(args.output, PathBuf::from("bert_explorer.html"));
        assert_eq!((args.layer, args.head), (0, 0));
        assert!(args.model_dir.is_none());
    }
}
