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

//! # Charts for the extracted embeddings
//!
//! Purely presentational: every renderer borrows its input and returns a `Chart` that can be
//! serialized as a [Plotly](https://plotly.com/javascript/) figure.
//!
//! ```no_run
//! use bert_explorer::pipelines::visualization::render_vector_table;
//!
//! let chart = render_vector_table(&[0.123456, -1.0], "Summary vector");
//! let figure = chart.to_plotly_json();
//! ```

use crate::pipelines::embedding_extraction::{AttentionHead, AttentionOutput};
use crate::ExplorerError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const TABLE_HEIGHT: u32 = 400;
const TABLE_MARGIN: u32 = 50;
const HEATMAP_HEIGHT: u32 = 600;
const HEATMAP_WIDTH: u32 = 800;
const HEATMAP_COLORSCALE: &str = "Viridis";

/// Plotly layout margins, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Margin {
    pub l: u32,
    pub r: u32,
    pub t: u32,
    pub b: u32,
}

impl Margin {
    pub fn uniform(value: u32) -> Self {
        Margin {
            l: value,
            r: value,
            t: value,
            b: value,
        }
    }
}

/// # Two-column table: dimension index and value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableChart {
    pub title: String,
    pub header: [String; 2],
    pub dimensions: Vec<usize>,
    /// Values rounded to 4 decimal places
    pub values: Vec<f64>,
    pub height: u32,
    pub margin: Margin,
}

/// # Square heatmap of attention weights
/// `z[i][j]` is the weight from query token `i` (row) to key token `j` (column).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapChart {
    pub title: String,
    pub x_labels: Vec<String>,
    pub y_labels: Vec<String>,
    pub z: Vec<Vec<f32>>,
    pub x_title: String,
    pub y_title: String,
    pub colorscale: String,
    pub height: u32,
    pub width: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Chart {
    Table(TableChart),
    Heatmap(HeatmapChart),
}

impl Chart {
    pub fn title(&self) -> &str {
        match self {
            Chart::Table(table) => &table.title,
            Chart::Heatmap(heatmap) => &heatmap.title,
        }
    }

    /// Serializes the chart as a Plotly figure (`{"data": [...], "layout": {...}}`).
    ///
    /// Heatmap axes are indexed by token position, with the token strings as tick labels, so that
    /// repeated tokens keep their own row and column.
    pub fn to_plotly_json(&self) -> Value {
        match self {
            Chart::Table(table) => json!({
                "data": [{
                    "type": "table",
                    "header": { "values": table.header, "align": "left" },
                    "cells": {
                        "values": [table.dimensions, table.values],
                        "align": "left",
                        "format": [Value::Null, ".4f"],
                    },
                }],
                "layout": {
                    "title": { "text": table.title },
                    "height": table.height,
                    "margin": table.margin,
                },
            }),
            Chart::Heatmap(heatmap) => {
                let x_positions = (0..heatmap.x_labels.len()).collect::<Vec<usize>>();
                let y_positions = (0..heatmap.y_labels.len()).collect::<Vec<usize>>();
                json!({
                    "data": [{
                        "type": "heatmap",
                        "z": heatmap.z,
                        "x": x_positions,
                        "y": y_positions,
                        "colorscale": heatmap.colorscale,
                    }],
                    "layout": {
                        "title": { "text": heatmap.title },
                        "xaxis": {
                            "title": { "text": heatmap.x_title },
                            "tickmode": "array",
                            "tickvals": x_positions,
                            "ticktext": heatmap.x_labels,
                        },
                        "yaxis": {
                            "title": { "text": heatmap.y_title },
                            "tickmode": "array",
                            "tickvals": y_positions,
                            "ticktext": heatmap.y_labels,
                        },
                        "height": heatmap.height,
                        "width": heatmap.width,
                    },
                })
            }
        }
    }
}

fn round_4(value: f32) -> f64 {
    (value as f64 * 1e4).round() / 1e4
}

/// Renders a vector as a two-column table (dimension, value), values rounded to 4 decimal places.
///
/// # Arguments
///
/// * `vector` - embedding to display, left untouched
/// * `title` - chart title
pub fn render_vector_table(vector: &[f32], title: &str) -> Chart {
    Chart::Table(TableChart {
        title: title.to_string(),
        header: ["Dimension".to_string(), "Value".to_string()],
        dimensions: (0..vector.len()).collect(),
        values: vector.iter().copied().map(round_4).collect(),
        height: TABLE_HEIGHT,
        margin: Margin::uniform(TABLE_MARGIN),
    })
}

/// Renders the attention weights of the first head of the first layer as a heatmap whose axes are
/// labelled with the tokens.
pub fn render_attention_heatmap(
    attentions: &AttentionOutput,
    tokens: &[String],
) -> Result<Chart, ExplorerError> {
    render_attention_heatmap_for(attentions, tokens, 0, 0)
}

/// Renders the attention weights of an arbitrary `(layer, head)` pair as a heatmap.
///
/// # Errors
///
/// Returns `ExplorerError::ValueError` if the layer or head does not exist, or if the attention
/// matrix is not `tokens.len()` x `tokens.len()`.
pub fn render_attention_heatmap_for(
    attentions: &AttentionOutput,
    tokens: &[String],
    layer: usize,
    head: usize,
) -> Result<Chart, ExplorerError> {
    let attention_layer = attentions.get(layer).ok_or_else(|| {
        ExplorerError::ValueError(format!(
            "Attention layer {layer} out of range ({} layers)",
            attentions.len()
        ))
    })?;
    let attention_head: &AttentionHead = attention_layer.get(head).ok_or_else(|| {
        ExplorerError::ValueError(format!(
            "Attention head {head} out of range ({} heads)",
            attention_layer.len()
        ))
    })?;

    let size = tokens.len();
    if attention_head.len() != size || attention_head.iter().any(|row| row.len() != size) {
        return Err(ExplorerError::ValueError(format!(
            "Attention matrix does not match the {size} tokens"
        )));
    }

    let title = if (layer, head) == (0, 0) {
        "Attention between tokens".to_string()
    } else {
        format!("Attention between tokens (layer {layer}, head {head})")
    };

    Ok(Chart::Heatmap(HeatmapChart {
        title,
        x_labels: tokens.to_vec(),
        y_labels: tokens.to_vec(),
        z: attention_head.clone(),
        x_title: "Target tokens".to_string(),
        y_title: "Source tokens".to_string(),
        colorscale: HEATMAP_COLORSCALE.to_string(),
        height: HEATMAP_HEIGHT,
        width: HEATMAP_WIDTH,
    }))
}

/// Indices and tokens used to key the per-token charts across tabs.
pub fn token_selector(tokens: &[String]) -> (Vec<usize>, Vec<String>) {
    ((0..tokens.len()).collect(), tokens.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn vector_table_rounds_to_four_decimals() {
        let vector = vec![0.123456_f32, 1.23456, 2.0];
        let chart = render_vector_table(&vector, "Summary vector");

        let Chart::Table(table) = chart else {
            panic!("expected a table chart");
        };
        assert_eq!(table.title, "Summary vector");
        assert_eq!(table.dimensions, vec![0, 1, 2]);
        assert!((table.values[0] - 0.1235).abs() < 1e-9);
        assert!((table.values[1] - 1.2346).abs() < 1e-9);
        assert!((table.values[2] - 2.0).abs() < 1e-9);
        // the input is borrowed and left untouched
        assert_eq!(vector, vec![0.123456_f32, 1.23456, 2.0]);
    }

    #[test]
    fn vector_table_plotly_figure() {
        let figure = render_vector_table(&[0.5, 0.25], "Token").to_plotly_json();

        assert_eq!(figure["data"][0]["type"], "table");
        assert_eq!(figure["data"][0]["cells"]["values"][0], json!([0, 1]));
        assert_eq!(figure["data"][0]["cells"]["values"][1], json!([0.5, 0.25]));
        assert_eq!(figure["data"][0]["cells"]["format"][1], ".4f");
        assert_eq!(figure["layout"]["height"], 400);
        assert_eq!(figure["layout"]["margin"]["l"], 50);
    }

    #[test]
    fn empty_vector_renders_empty_table() {
        let Chart::Table(table) = render_vector_table(&[], "Empty") else {
            panic!("expected a table chart");
        };
        assert!(table.dimensions.is_empty());
        assert!(table.values.is_empty());
    }

    #[test]
    fn heatmap_selects_first_layer_and_head() {
        let attentions: AttentionOutput = vec![
            vec![
                vec![vec![0.75, 0.25], vec![0.5, 0.5]],
                vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            ],
            vec![vec![vec![0.1, 0.9], vec![0.9, 0.1]]],
        ];
        let tokens = tokens(&["[CLS]", "[SEP]"]);

        let Chart::Heatmap(heatmap) = render_attention_heatmap(&attentions, &tokens).unwrap()
        else {
            panic!("expected a heatmap chart");
        };
        assert_eq!(heatmap.z, vec![vec![0.75, 0.25], vec![0.5, 0.5]]);
        assert_eq!(heatmap.x_labels, tokens);
        assert_eq!(heatmap.y_labels, tokens);
        assert_eq!(heatmap.colorscale, "Viridis");
        assert_eq!((heatmap.height, heatmap.width), (600, 800));

        let Chart::Heatmap(heatmap) =
            render_attention_heatmap_for(&attentions, &tokens, 1, 0).unwrap()
        else {
            panic!("expected a heatmap chart");
        };
        assert_eq!(heatmap.z, vec![vec![0.1, 0.9], vec![0.9, 0.1]]);
    }

    #[test]
    fn heatmap_rejects_missing_layer_or_head() {
        let attentions: AttentionOutput = vec![vec![vec![vec![1.0]]]];
        let tokens = tokens(&["[CLS]"]);

        assert!(matches!(
            render_attention_heatmap_for(&attentions, &tokens, 1, 0),
            Err(ExplorerError::ValueError(_))
        ));
        assert!(matches!(
            render_attention_heatmap_for(&attentions, &tokens, 0, 3),
            Err(ExplorerError::ValueError(_))
        ));
        assert!(matches!(
            render_attention_heatmap(&vec![], &tokens),
            Err(ExplorerError::ValueError(_))
        ));
    }

    #[test]
    fn heatmap_rejects_mismatched_tokens() {
        let attentions: AttentionOutput = vec![vec![vec![vec![0.5, 0.5], vec![0.5, 0.5]]]];
        let result = render_attention_heatmap(&attentions, &tokens(&["[CLS]"]));
        assert!(matches!(result, Err(ExplorerError::ValueError(_))));
    }

    #[test]
    fn heatmap_keeps_repeated_tokens_apart() {
        let attentions: AttentionOutput = vec![vec![vec![
            vec![0.2, 0.4, 0.4],
            vec![0.3, 0.3, 0.4],
            vec![0.1, 0.1, 0.8],
        ]]];
        let tokens = tokens(&["[CLS]", "la", "la"]);
        let figure = render_attention_heatmap(&attentions, &tokens)
            .unwrap()
            .to_plotly_json();

        assert_eq!(figure["data"][0]["x"], json!([0, 1, 2]));
        assert_eq!(figure["layout"]["xaxis"]["ticktext"], json!(["[CLS]", "la", "la"]));
        assert_eq!(figure["layout"]["yaxis"]["title"]["text"], "Source tokens");
    }

    #[test]
    fn token_selector_indexes_tokens() {
        let (indices, selected) = token_selector(&tokens(&["[CLS]", "hello", "[SEP]"]));
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(selected, tokens(&["[CLS]", "hello", "[SEP]"]));
    }
}
