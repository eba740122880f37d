//! ONNX Runtime embedder using the `ort` crate.
//!
//! Runs the `all-MiniLM-L6-v2` sentence-transformer: tokenize, run the BERT
//! encoder, mean-pool the last hidden state over the attention mask and
//! L2-normalize. Output matches what the scraper stored for each post.
use std::path::Path;
use std::sync::Mutex;

use ort::session::Session;
use ort::value::Tensor;
use tracing::{debug, info};

use super::tokenizer::BertTokenizer;
use super::{Embedder, EmbeddingError, check_embedding, l2_normalize};

/// ONNX-backed embedder implementing the `Embedder` trait.
pub struct OnnxEmbedder {
    session: Mutex<Session>,
    tokenizer: BertTokenizer,
    dimensions: usize,
}

impl OnnxEmbedder {
    /// Load `model.onnx` and `tokenizer.json` from `model_dir`.
    ///
    /// `dimensions` is the hidden size of the model (384 for MiniLM-L6).
    pub fn new(model_dir: &Path, dimensions: usize) -> Result<Self, EmbeddingError> {
        let model_path = model_dir.join("model.onnx");

        if !model_path.exists() {
            return Err(EmbeddingError::ModelLoadFailed(format!(
                "model.onnx not found in {}",
                model_dir.display()
            )));
        }

        info!("Initializing ONNX Runtime...");

        // Single-threaded caller; keep the runtime small.
        let session = Session::builder()
            .map_err(|e| EmbeddingError::ModelLoadFailed(format!("session builder error: {e}")))?
            .with_intra_threads(2)
            .map_err(|e| EmbeddingError::ModelLoadFailed(format!("thread config error: {e}")))?
            .commit_from_file(&model_path)
            .map_err(|e| EmbeddingError::ModelLoadFailed(format!("model load error: {e}")))?;

        let tokenizer = BertTokenizer::from_model_dir(model_dir)
            .map_err(|e| EmbeddingError::TokenizerError(e.to_string()))?;

        info!(
            vocab_size = tokenizer.vocab_size(),
            dimensions, "ONNX embedding model loaded"
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            dimensions,
        })
    }
}

impl Embedder for OnnxEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let tokens = self
            .tokenizer
            .tokenize(text)
            .map_err(|e| EmbeddingError::TokenizerError(format!("tokenization failed: {e}")))?;

        let seq_len = tokens.input_ids.len();
        debug!(seq_len, "embedding text");

        // (shape, data) tuples avoid coupling to ort's ndarray version
        let input_ids_val = Tensor::from_array(([1usize, seq_len], tokens.input_ids.clone()))
            .map_err(|e| EmbeddingError::InferenceFailed(format!("input_ids error: {e}")))?;
        let attention_mask_val =
            Tensor::from_array(([1usize, seq_len], tokens.attention_mask.clone())).map_err(
                |e| EmbeddingError::InferenceFailed(format!("attention_mask error: {e}")),
            )?;
        let token_type_ids_val = Tensor::from_array(([1usize, seq_len], vec![0i64; seq_len]))
            .map_err(|e| EmbeddingError::InferenceFailed(format!("token_type_ids error: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| EmbeddingError::InferenceFailed(format!("lock poisoned: {e}")))?;
        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_val,
                "attention_mask" => attention_mask_val,
                "token_type_ids" => token_type_ids_val,
            ])
            .map_err(|e| EmbeddingError::InferenceFailed(format!("inference failed: {e}")))?;

        // last_hidden_state: [1, seq_len, hidden]
        let (_shape, hidden_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbeddingError::InferenceFailed(format!("output extraction: {e}")))?;

        if hidden_data.len() != seq_len * self.dimensions {
            return Err(EmbeddingError::MalformedOutput(format!(
                "hidden state has {} values, expected {seq_len}x{}",
                hidden_data.len(),
                self.dimensions
            )));
        }

        let mut embedding = mean_pooling(
            hidden_data,
            &tokens.attention_mask,
            seq_len,
            self.dimensions,
        );
        l2_normalize(&mut embedding);
        check_embedding(&embedding, self.dimensions)?;

        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Mean pooling over hidden states weighted by attention mask.
///
/// `hidden_data` is a flat array with shape `[1, seq_len, hidden_size]`.
fn mean_pooling(
    hidden_data: &[f32],
    attention_mask: &[i64],
    seq_len: usize,
    hidden_size: usize,
) -> Vec<f32> {
    let mut result = vec![0.0f32; hidden_size];
    let mut mask_sum: f32 = 0.0;

    for t in 0..seq_len {
        let mask = attention_mask[t] as f32;
        mask_sum += mask;

        for h in 0..hidden_size {
            result[h] += hidden_data[t * hidden_size + h] * mask;
        }
    }

    if mask_sum > 0.0 {
        for v in &mut result {
            *v /= mask_sum;
        }
    }

    result
}
