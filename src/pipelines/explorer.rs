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

//! # Explorer page
//!
//! Page controller tying the extractor to the chart renderers. On every trigger the input text is
//! validated, tokenized and run through the model once, and each artifact is handed to its
//! renderer. Charts are grouped in five tabs and keyed by token index so that the same token can be
//! followed across tabs.
//!
//! ```no_run
//! use bert_explorer::pipelines::embedding_extraction::{
//!     EmbeddingExtractor, EmbeddingExtractorConfig,
//! };
//! use bert_explorer::pipelines::explorer::{Explorer, DEFAULT_TEXT};
//!
//! # fn main() -> anyhow::Result<()> {
//! let extractor = EmbeddingExtractor::new(EmbeddingExtractorConfig::default())?;
//! let explorer = Explorer::new(&extractor);
//!
//! let page = explorer.analyze(DEFAULT_TEXT)?;
//! std::fs::write("bert_explorer.html", page.to_html())?;
//! # Ok(())
//! # }
//! ```

use crate::pipelines::embedding_extraction::EmbeddingSource;
use crate::pipelines::visualization::{
    render_attention_heatmap_for, render_vector_table, token_selector, Chart,
};
use crate::ExplorerError;
use tracing::{debug, warn};

/// Placeholder input of the page
pub const DEFAULT_TEXT: &str = "Привет мир!";

const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.27.0.min.js";

/// The five views of an analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TabKind {
    TokenEmbeddings,
    PositionEmbeddings,
    TokenTypeEmbeddings,
    SummaryVector,
    Attention,
}

impl TabKind {
    pub const ALL: [TabKind; 5] = [
        TabKind::TokenEmbeddings,
        TabKind::PositionEmbeddings,
        TabKind::TokenTypeEmbeddings,
        TabKind::SummaryVector,
        TabKind::Attention,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            TabKind::TokenEmbeddings => "Token embeddings",
            TabKind::PositionEmbeddings => "Position embeddings",
            TabKind::TokenTypeEmbeddings => "Token type embeddings",
            TabKind::SummaryVector => "CLS vector",
            TabKind::Attention => "Attention map",
        }
    }

    fn id(&self) -> &'static str {
        match self {
            TabKind::TokenEmbeddings => "token-embeddings",
            TabKind::PositionEmbeddings => "position-embeddings",
            TabKind::TokenTypeEmbeddings => "token-type-embeddings",
            TabKind::SummaryVector => "summary-vector",
            TabKind::Attention => "attention",
        }
    }
}

/// A chart with its stable key and the sub-header displayed above it
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedChart {
    pub key: String,
    pub subheader: String,
    pub chart: Chart,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tab {
    pub kind: TabKind,
    pub charts: Vec<KeyedChart>,
}

/// # Result of one analysis
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisPage {
    /// Analyzed text
    pub text: String,
    /// Tokens, including boundary tokens
    pub tokens: Vec<String>,
    /// Vocabulary ids of the tokens
    pub token_ids: Vec<i64>,
    /// Tabs, in `TabKind::ALL` order
    pub tabs: Vec<Tab>,
}

impl AnalysisPage {
    pub fn tab(&self, kind: TabKind) -> Option<&Tab> {
        self.tabs.iter().find(|tab| tab.kind == kind)
    }

    /// Renders a self-contained HTML page (charts drawn by Plotly, loaded from its CDN).
    pub fn to_html(&self) -> String {
        let mut tab_inputs = String::new();
        let mut tab_labels = String::new();
        let mut tab_panels = String::new();
        let mut scripts = String::new();

        for (index, tab) in self.tabs.iter().enumerate() {
            let id = tab.kind.id();
            tab_inputs.push_str(&format!(
                "<input type=\"radio\" name=\"tabs\" id=\"tab-{id}\"{}>\n",
                if index == 0 { " checked" } else { "" }
            ));
            tab_labels.push_str(&format!(
                "<label for=\"tab-{id}\">{}</label>\n",
                tab.kind.label()
            ));

            tab_panels.push_str(&format!("<section class=\"panel\" id=\"panel-{id}\">\n"));
            for keyed_chart in &tab.charts {
                tab_panels.push_str(&format!(
                    "<h3>{}</h3>\n<div class=\"chart\" id=\"{}\"></div>\n",
                    escape_html(&keyed_chart.subheader),
                    keyed_chart.key
                ));
                let figure = keyed_chart.chart.to_plotly_json();
                scripts.push_str(&format!(
                    "draw(\"{}\", {});\n",
                    keyed_chart.key,
                    escape_script(&figure.to_string())
                ));
            }
            tab_panels.push_str("</section>\n");
        }

        let token_list = self
            .tokens
            .iter()
            .map(|token| format!("<code>{}</code>", escape_html(token)))
            .collect::<Vec<String>>()
            .join(" ");

        let panel_rules = self
            .tabs
            .iter()
            .map(|tab| {
                let id = tab.kind.id();
                format!(
                    "#tab-{id}:checked ~ .panels #panel-{id} {{ display: block; }}\n\
                     #tab-{id}:checked ~ nav label[for=\"tab-{id}\"] {{ background-color: #2193b0; color: white; }}"
                )
            })
            .collect::<Vec<String>>()
            .join("\n");

        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>BERT embeddings explorer</title>
<script src="{PLOTLY_CDN}"></script>
<style>
{STYLE}
{panel_rules}
</style>
</head>
<body>
<header>
<h1>BERT embeddings explorer</h1>
<p>Explore the different kinds of BERT embeddings for your text.</p>
</header>
<main>
<div class="input"><h2>Input</h2><pre>{text}</pre></div>
<h2>Tokenization</h2>
<p class="tokens">{token_list}</p>
<div class="tabs">
{tab_inputs}<nav>
{tab_labels}</nav>
<div class="panels">
{tab_panels}</div>
</div>
</main>
<footer>
{ABOUT}
</footer>
<script>
function draw(id, figure) {{
  Plotly.newPlot(id, figure.data, figure.layout, {{responsive: true}});
}}
{scripts}</script>
</body>
</html>
"#,
            text = escape_html(&self.text),
        )
    }
}

const STYLE: &str = r#"body { margin: 0; font-family: sans-serif; background: linear-gradient(135deg, #f5f7fa 0%, #c3cfe2 100%); }
header { background: linear-gradient(45deg, #2193b0, #6dd5ed); padding: 2rem; border-radius: 15px; color: white; text-align: center; margin: 2rem auto; max-width: 1200px; box-shadow: 0 4px 6px rgba(0,0,0,0.1); }
main, footer { max-width: 1200px; margin: 0 auto; padding: 0 2rem 2rem; }
.input { background-color: #ffffff; padding: 2rem; border-radius: 15px; margin-bottom: 2rem; box-shadow: 0 2px 12px rgba(0,0,0,0.1); border: 1px solid #e0e0e0; }
.input pre { border: 2px solid #e0e0e0; border-radius: 10px; padding: 1rem; font-size: 16px; white-space: pre-wrap; }
.tokens code { background: #ffffff; border-radius: 5px; padding: 0.1rem 0.4rem; margin: 0.1rem; display: inline-block; }
.tabs { background-color: #ffffff; border-radius: 10px; padding: 1rem; margin-top: 2rem; box-shadow: 0 2px 12px rgba(0,0,0,0.1); }
.tabs > input { display: none; }
.tabs nav label { display: inline-block; padding: 0.8rem 1.5rem; border-radius: 10px; cursor: pointer; }
.tabs nav label:hover { box-shadow: 0 2px 4px rgba(0,0,0,0.1); }
.panel { display: none; }"#;

const ABOUT: &str = r#"<h3>About BERT embeddings</h3>
<ul>
<li><strong>Token embeddings</strong>: rows of the word embedding table for each token of the input text</li>
<li><strong>Position embeddings</strong>: encode the position of each token in the sequence</li>
<li><strong>Token type embeddings</strong>: distinguish the segments of the input (a single segment here)</li>
<li><strong>CLS vector</strong>: final hidden state of the special classification token, representing the whole sequence</li>
</ul>"#;

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for character in value.chars() {
        match character {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(character),
        }
    }
    escaped
}

/// JSON embedded in a `<script>` block must not close the block
fn escape_script(json: &str) -> String {
    json.replace('<', "\\u003c")
}

/// # Explorer
/// Holds the extractor it was given at construction, and renders one `AnalysisPage` per call to
/// `analyze`.
pub struct Explorer<S: EmbeddingSource> {
    source: S,
    attention_layer: usize,
    attention_head: usize,
}

impl<S: EmbeddingSource> Explorer<S> {
    pub fn new(source: S) -> Self {
        Explorer {
            source,
            attention_layer: 0,
            attention_head: 0,
        }
    }

    /// Selects the attention layer and head displayed in the attention tab (default: 0, 0)
    pub fn with_attention_selection(mut self, layer: usize, head: usize) -> Self {
        self.attention_layer = layer;
        self.attention_head = head;
        self
    }

    /// Analyzes the input text.
    ///
    /// # Errors
    ///
    /// `ExplorerError::EmptyInput` for empty or whitespace-only text, in which case the extractor
    /// is not called. Extraction and rendering errors are propagated.
    pub fn analyze(&self, text: &str) -> Result<AnalysisPage, ExplorerError> {
        if text.trim().is_empty() {
            warn!("rejected empty input");
            return Err(ExplorerError::EmptyInput);
        }

        let tokenization = self.source.tokenize(text)?;
        let bundle = self.source.extract(text)?;
        if tokenization.tokens != bundle.tokens {
            return Err(ExplorerError::ValueError(
                "Tokenization and extraction disagree on the token sequence".into(),
            ));
        }
        let sequence_length = bundle.tokens.len();
        if bundle.token_embeddings.len() != sequence_length
            || bundle.position_embeddings.len() != sequence_length
            || bundle.token_type_embeddings.len() != sequence_length
        {
            return Err(ExplorerError::ValueError(format!(
                "Embedding matrices do not match the {sequence_length} tokens"
            )));
        }

        let (indices, tokens) = token_selector(&bundle.tokens);

        let token_embeddings = indices
            .iter()
            .zip(tokens.iter())
            .map(|(&idx, token)| KeyedChart {
                key: format!("token_emb_{idx}"),
                subheader: format!("Token: {token}"),
                chart: render_vector_table(
                    &bundle.token_embeddings[idx],
                    &format!("Embedding vector for token '{token}'"),
                ),
            })
            .collect();

        let position_embeddings = indices
            .iter()
            .zip(tokens.iter())
            .map(|(&idx, token)| KeyedChart {
                key: format!("pos_emb_{idx}"),
                subheader: format!("Position {idx} (token: {token})"),
                chart: render_vector_table(
                    &bundle.position_embeddings[idx],
                    &format!("Position embedding for position {idx}"),
                ),
            })
            .collect();

        let token_type_embeddings = indices
            .iter()
            .zip(tokens.iter())
            .map(|(&idx, token)| KeyedChart {
                key: format!("type_emb_{idx}"),
                subheader: format!("Token: {token}"),
                chart: render_vector_table(
                    &bundle.token_type_embeddings[idx],
                    &format!("Token type embedding for '{token}'"),
                ),
            })
            .collect();

        let summary_vector = vec![KeyedChart {
            key: "summary_vector".to_string(),
            subheader: "CLS vector".to_string(),
            chart: render_vector_table(&bundle.summary_vector, "CLS vector values"),
        }];

        let attention = vec![KeyedChart {
            key: "attention".to_string(),
            subheader: "Attention between tokens".to_string(),
            chart: render_attention_heatmap_for(
                &bundle.attentions,
                &bundle.tokens,
                self.attention_layer,
                self.attention_head,
            )?,
        }];

        let tabs = vec![
            Tab {
                kind: TabKind::TokenEmbeddings,
                charts: token_embeddings,
            },
            Tab {
                kind: TabKind::PositionEmbeddings,
                charts: position_embeddings,
            },
            Tab {
                kind: TabKind::TokenTypeEmbeddings,
                charts: token_type_embeddings,
            },
            Tab {
                kind: TabKind::SummaryVector,
                charts: summary_vector,
            },
            Tab {
                kind: TabKind::Attention,
                charts: attention,
            },
        ];
        debug!(tokens = bundle.tokens.len(), "rendered analysis page");

        Ok(AnalysisPage {
            text: text.to_string(),
            tokens: bundle.tokens,
            token_ids: tokenization.ids,
            tabs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipelines::embedding_extraction::{EmbeddingBundle, TokenizationOutput};
    use std::cell::Cell;

    #[derive(Default)]
    struct CountingSource {
        calls: Cell<usize>,
    }

    impl CountingSource {
        fn split(text: &str) -> Vec<String> {
            let mut tokens = vec!["[CLS]".to_string()];
            tokens.extend(text.split_whitespace().map(str::to_string));
            tokens.push("[SEP]".to_string());
            tokens
        }
    }

    impl EmbeddingSource for CountingSource {
        fn tokenize(&self, text: &str) -> Result<TokenizationOutput, ExplorerError> {
            self.calls.set(self.calls.get() + 1);
            let tokens = Self::split(text);
            Ok(TokenizationOutput {
                ids: (0..tokens.len() as i64).collect(),
                tokens,
            })
        }

        fn extract(&self, text: &str) -> Result<EmbeddingBundle, ExplorerError> {
            self.calls.set(self.calls.get() + 1);
            let tokens = Self::split(text);
            let n = tokens.len();
            let rows = (0..n).map(|i| vec![i as f32, 0.5]).collect::<Vec<_>>();
            let uniform = vec![vec![1.0 / n as f32; n]; n];
            Ok(EmbeddingBundle {
                tokens,
                token_embeddings: rows.clone(),
                position_embeddings: rows.clone(),
                token_type_embeddings: vec![vec![0.25, 0.75]; n],
                summary_vector: vec![0.1, 0.2],
                attentions: vec![vec![uniform.clone(), uniform]; 2],
            })
        }
    }

    #[test]
    fn empty_input_never_reaches_the_source() {
        let source = CountingSource::default();
        let explorer = Explorer::new(&source);

        for text in ["", "   ", "\n\t"] {
            let error = explorer.analyze(text).unwrap_err();
            assert!(matches!(error, ExplorerError::EmptyInput));
            assert_eq!(error.to_string(), "Please enter some text to analyze.");
        }
        assert_eq!(source.calls.get(), 0);
    }

    #[test]
    fn one_tokenization_and_one_extraction_per_analysis() {
        let source = CountingSource::default();
        let explorer = Explorer::new(&source);

        explorer.analyze("hello world").unwrap();
        assert_eq!(source.calls.get(), 2);
    }

    #[test]
    fn charts_are_keyed_by_token_index() {
        let explorer = Explorer::new(CountingSource::default());
        let page = explorer.analyze("hello world").unwrap();

        assert_eq!(page.tokens, vec!["[CLS]", "hello", "world", "[SEP]"]);
        assert_eq!(page.token_ids, vec![0, 1, 2, 3]);
        assert_eq!(
            page.tabs.iter().map(|tab| tab.kind).collect::<Vec<_>>(),
            TabKind::ALL.to_vec()
        );

        let keys = |kind: TabKind| {
            page.tab(kind)
                .unwrap()
                .charts
                .iter()
                .map(|chart| chart.key.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(
            keys(TabKind::TokenEmbeddings),
            vec!["token_emb_0", "token_emb_1", "token_emb_2", "token_emb_3"]
        );
        assert_eq!(
            keys(TabKind::PositionEmbeddings),
            vec!["pos_emb_0", "pos_emb_1", "pos_emb_2", "pos_emb_3"]
        );
        assert_eq!(
            keys(TabKind::TokenTypeEmbeddings),
            vec!["type_emb_0", "type_emb_1", "type_emb_2", "type_emb_3"]
        );
        assert_eq!(keys(TabKind::SummaryVector), vec!["summary_vector"]);
        assert_eq!(keys(TabKind::Attention), vec!["attention"]);

        let token_tab = page.tab(TabKind::TokenEmbeddings).unwrap();
        assert_eq!(token_tab.charts[1].subheader, "Token: hello");
        assert_eq!(
            token_tab.charts[1].chart.title(),
            "Embedding vector for token 'hello'"
        );
    }

    #[test]
    fn attention_selection() {
        let explorer = Explorer::new(CountingSource::default()).with_attention_selection(1, 1);
        let page = explorer.analyze("hello").unwrap();
        let attention = &page.tab(TabKind::Attention).unwrap().charts[0];
        assert_eq!(
            attention.chart.title(),
            "Attention between tokens (layer 1, head 1)"
        );

        let explorer = Explorer::new(CountingSource::default()).with_attention_selection(2, 0);
        assert!(matches!(
            explorer.analyze("hello"),
            Err(ExplorerError::ValueError(_))
        ));
    }

    #[test]
    fn html_page() {
        let explorer = Explorer::new(CountingSource::default());
        let page = explorer.analyze("<b> &").unwrap();
        let html = page.to_html();

        assert!(html.contains("<pre>&lt;b&gt; &amp;</pre>"));
        assert!(html.contains("<code>&lt;b&gt;</code>"));
        assert!(!html.contains("<b>"));
        assert!(html.contains("About BERT embeddings"));
        assert!(html.contains("id=\"token_emb_0\""));
        assert!(html.contains("id=\"attention\""));
        for kind in TabKind::ALL {
            assert!(html.contains(kind.label()));
        }
    }

    #[test]
    fn html_escaping() {
        assert_eq!(
            escape_html("<b>\"a\" & 'b'</b>"),
            "&lt;b&gt;&quot;a&quot; &amp; &#39;b&#39;&lt;/b&gt;"
        );
        assert_eq!(
            escape_script("{\"x\":\"</script>\"}"),
            "{\"x\":\"\\u003c/script>\"}"
        );
    }
}
