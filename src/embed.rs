//! Verse embedding: ONNX sentence encoder and the on-disk vector index.
//!
//! The index is three artifacts written together and only valid together:
//! `embeddings.npy` (float32 `[N, D]` matrix), `verse_ids.json` (row order),
//! and `metadata.json` (verse id to identity/text). Loading validates the
//! three-way shape invariant and fails fast on any mismatch.

use crate::models::{SearchResult, Verse, VerseMeta};
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::{Array2, ArrayView1};
use ndarray_npy::{ReadNpyExt, WriteNpyExt};
use ort::session::Session;
use ort::value::Tensor;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokenizers::Tokenizer;

const MATRIX_FILE: &str = "embeddings.npy";
const VERSE_IDS_FILE: &str = "verse_ids.json";
const METADATA_FILE: &str = "metadata.json";

#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ONNX runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[error("tokenizer error: {0}")]
    Tokenizer(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("npy read error: {0}")]
    NpyRead(#[from] ndarray_npy::ReadNpyError),
    #[error("npy write error: {0}")]
    NpyWrite(#[from] ndarray_npy::WriteNpyError),
    #[error("index artifact missing: {0}")]
    MissingArtifact(PathBuf),
    #[error("index shape mismatch: {0}")]
    ShapeMismatch(String),
}

/// Encoding options from the `embedding.*` configuration keys.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Prefix each verse with `"{book} {chapter}:{verse} — "` before encoding.
    pub include_context: bool,
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        EmbeddingConfig {
            include_context: true,
            batch_size: 32,
        }
    }
}

/// Sentence encoder: ONNX session plus its tokenizer.
///
/// Output vectors are mean-pooled over attended positions and L2
/// normalized; the retriever still computes full cosine and does not rely
/// on the normalization.
pub struct VerseEncoder {
    session: Session,
    tokenizer: Tokenizer,
}

impl VerseEncoder {
    pub fn new(model_path: &Path, tokenizer_path: &Path) -> Result<Self, EmbedError> {
        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| EmbedError::Tokenizer(e.to_string()))?;

        Ok(VerseEncoder { session, tokenizer })
    }

    /// Encode one text into a fixed-dimension vector.
    pub fn encode(&mut self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vectors = self.encode_batch(&[text.to_string()])?;
        Ok(vectors.pop().unwrap_or_default())
    }

    /// Encode a batch of texts, padding to the longest sequence.
    pub fn encode_batch(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| EmbedError::Tokenizer(e.to_string()))?;

        let batch = encodings.len();
        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(1)
            .max(1);

        let mut input_ids: Vec<i64> = Vec::with_capacity(batch * max_len);
        let mut attention_mask: Vec<i64> = Vec::with_capacity(batch * max_len);
        let mut token_type_ids: Vec<i64> = Vec::with_capacity(batch * max_len);

        for encoding in &encodings {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            let types = encoding.get_type_ids();

            input_ids.extend(ids.iter().map(|&id| id as i64));
            input_ids.extend(std::iter::repeat(0).take(max_len - ids.len()));
            attention_mask.extend(mask.iter().map(|&m| m as i64));
            attention_mask.extend(std::iter::repeat(0).take(max_len - mask.len()));
            token_type_ids.extend(types.iter().map(|&t| t as i64));
            token_type_ids.extend(std::iter::repeat(0).take(max_len - types.len()));
        }

        // Keep a copy of the mask for pooling before it moves into the tensor
        let pool_mask = attention_mask.clone();

        let inputs = ort::inputs![
            "input_ids" => Tensor::from_array(([batch, max_len], input_ids))?,
            "attention_mask" => Tensor::from_array(([batch, max_len], attention_mask))?,
            "token_type_ids" => Tensor::from_array(([batch, max_len], token_type_ids))?,
        ];

        let outputs = self.session.run(inputs)?;
        let (shape, data) = outputs["last_hidden_state"].try_extract_tensor::<f32>()?;

        // shape is [batch, seq_len, hidden_dim]
        let seq_len = shape[1] as usize;
        let dim = shape[2] as usize;

        let mut vectors = Vec::with_capacity(batch);
        for b in 0..batch {
            // Mean pooling over attended positions only
            let mut mean = vec![0.0f32; dim];
            let mut attended = 0.0f32;
            for s in 0..seq_len {
                if pool_mask[b * max_len + s] == 0 {
                    continue;
                }
                attended += 1.0;
                let base = (b * seq_len + s) * dim;
                for d in 0..dim {
                    mean[d] += data[base + d];
                }
            }
            if attended > 0.0 {
                for v in &mut mean {
                    *v /= attended;
                }
            }

            // L2 normalization for cosine similarity
            let norm: f32 = mean.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 0.0 {
                for v in &mut mean {
                    *v /= norm;
                }
            }

            vectors.push(mean);
        }

        Ok(vectors)
    }
}

/// The loaded vector index: matrix, row order, and per-verse metadata.
///
/// Immutable once constructed; multiple readers may share one instance.
#[derive(Debug)]
pub struct EmbeddingIndex {
    matrix: Array2<f32>,
    verse_ids: Vec<i64>,
    metadata: BTreeMap<i64, VerseMeta>,
    row_of: HashMap<i64, usize>,
    row_norms: Vec<f32>,
    by_reference: HashMap<String, i64>,
}

impl EmbeddingIndex {
    /// Assemble an index, enforcing the three-way shape invariant.
    pub fn new(
        matrix: Array2<f32>,
        verse_ids: Vec<i64>,
        metadata: BTreeMap<i64, VerseMeta>,
    ) -> Result<Self, EmbedError> {
        if matrix.nrows() != verse_ids.len() || verse_ids.len() != metadata.len() {
            return Err(EmbedError::ShapeMismatch(format!(
                "matrix rows {}, verse ids {}, metadata entries {}",
                matrix.nrows(),
                verse_ids.len(),
                metadata.len()
            )));
        }
        for verse_id in &verse_ids {
            if !metadata.contains_key(verse_id) {
                return Err(EmbedError::ShapeMismatch(format!(
                    "verse id {} has no metadata entry",
                    verse_id
                )));
            }
        }

        let row_of: HashMap<i64, usize> = verse_ids
            .iter()
            .enumerate()
            .map(|(row, &id)| (id, row))
            .collect();
        let row_norms = matrix
            .rows()
            .into_iter()
            .map(|row| row.dot(&row).sqrt())
            .collect();
        let by_reference = metadata
            .iter()
            .map(|(&id, meta)| (meta.reference.clone(), id))
            .collect();

        Ok(EmbeddingIndex {
            matrix,
            verse_ids,
            metadata,
            row_of,
            row_norms,
            by_reference,
        })
    }

    pub fn len(&self) -> usize {
        self.verse_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verse_ids.is_empty()
    }

    /// Embedding dimension `D`.
    pub fn dim(&self) -> usize {
        self.matrix.ncols()
    }

    pub fn meta(&self, verse_id: i64) -> Option<&VerseMeta> {
        self.metadata.get(&verse_id)
    }

    /// The stored vector for one verse.
    pub fn vector(&self, verse_id: i64) -> Option<ArrayView1<'_, f32>> {
        self.row_of.get(&verse_id).map(|&row| self.matrix.row(row))
    }

    /// Resolve a canonical reference string to its verse id.
    pub fn lookup_reference(&self, reference: &str) -> Option<i64> {
        self.by_reference.get(reference).copied()
    }

    /// Rank all verses by cosine similarity against a query vector.
    ///
    /// Results are sorted by descending score, ties broken by lower verse
    /// id. `exclude` removes one verse (the cross-reference source).
    pub fn search_by_vector(
        &self,
        query: &[f32],
        top_k: usize,
        book_filter: Option<&str>,
        min_score: Option<f32>,
        exclude: Option<i64>,
    ) -> Vec<SearchResult> {
        if top_k == 0 || self.is_empty() || query.len() != self.dim() {
            return Vec::new();
        }

        let query = ArrayView1::from(query);
        let query_norm = query.dot(&query).sqrt();
        if query_norm == 0.0 {
            return Vec::new();
        }

        let dots = self.matrix.dot(&query);

        let mut scored: Vec<(i64, f32)> = dots
            .iter()
            .enumerate()
            .map(|(row, &dot)| {
                let norm = self.row_norms[row];
                let score = if norm > 0.0 { dot / (norm * query_norm) } else { 0.0 };
                (self.verse_ids[row], score)
            })
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        scored
            .into_iter()
            .filter(|&(id, _)| Some(id) != exclude)
            .filter(|&(_, score)| min_score.map_or(true, |t| score >= t))
            .filter_map(|(id, score)| {
                let meta = self.metadata.get(&id)?;
                if let Some(book) = book_filter {
                    if meta.book != book {
                        return None;
                    }
                }
                Some(SearchResult {
                    verse_id: id,
                    book: meta.book.clone(),
                    chapter: meta.chapter,
                    verse: meta.verse,
                    reference: meta.reference.clone(),
                    text: meta.text.clone(),
                    score,
                })
            })
            .take(top_k)
            .collect()
    }

    /// Nearest neighbors of a stored verse, excluding the verse itself.
    pub fn neighbors_of(&self, verse_id: i64, top_k: usize) -> Vec<SearchResult> {
        let vector = match self.vector(verse_id) {
            Some(v) => v.to_vec(),
            None => return Vec::new(),
        };
        self.search_by_vector(&vector, top_k, None, None, Some(verse_id))
    }

    /// Write the three artifacts into `dir`.
    pub fn save(&self, dir: &Path) -> Result<(), EmbedError> {
        std::fs::create_dir_all(dir)?;

        let matrix_file = File::create(dir.join(MATRIX_FILE))?;
        self.matrix.write_npy(matrix_file)?;

        serde_json::to_writer(File::create(dir.join(VERSE_IDS_FILE))?, &self.verse_ids)?;
        serde_json::to_writer(File::create(dir.join(METADATA_FILE))?, &self.metadata)?;

        Ok(())
    }

    /// Load and validate the three artifacts from `dir`.
    pub fn load(dir: &Path) -> Result<Self, EmbedError> {
        for name in [MATRIX_FILE, VERSE_IDS_FILE, METADATA_FILE] {
            let path = dir.join(name);
            if !path.exists() {
                return Err(EmbedError::MissingArtifact(path));
            }
        }

        let matrix = Array2::<f32>::read_npy(File::open(dir.join(MATRIX_FILE))?)?;
        let verse_ids: Vec<i64> = serde_json::from_reader(File::open(dir.join(VERSE_IDS_FILE))?)?;
        let metadata: BTreeMap<i64, VerseMeta> =
            serde_json::from_reader(File::open(dir.join(METADATA_FILE))?)?;

        Self::new(matrix, verse_ids, metadata)
    }
}

/// Encode the whole corpus into a fresh index.
///
/// Batches verses through the encoder (default batch size 32) and reports
/// progress. The first batch fixes the embedding dimension.
pub fn build_index(
    verses: &[Verse],
    encoder: &mut VerseEncoder,
    config: &EmbeddingConfig,
    show_progress: bool,
) -> Result<EmbeddingIndex, EmbedError> {
    let batch_size = config.batch_size.max(1);

    let progress = if show_progress {
        let pb = ProgressBar::new(verses.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})",
                )
                .unwrap()
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let mut rows: Vec<Vec<f32>> = Vec::with_capacity(verses.len());

    for chunk in verses.chunks(batch_size) {
        let texts: Vec<String> = chunk
            .iter()
            .map(|verse| {
                if config.include_context {
                    format!("{} — {}", verse.reference(), verse.text)
                } else {
                    verse.text.clone()
                }
            })
            .collect();

        rows.extend(encoder.encode_batch(&texts)?);

        if let Some(pb) = &progress {
            pb.inc(chunk.len() as u64);
        }
    }

    if let Some(pb) = &progress {
        pb.finish_and_clear();
    }

    let dim = rows.first().map_or(0, Vec::len);
    let mut matrix = Array2::<f32>::zeros((rows.len(), dim));
    for (i, row) in rows.iter().enumerate() {
        if row.len() != dim {
            return Err(EmbedError::ShapeMismatch(format!(
                "encoder returned {} dims for row {}, expected {}",
                row.len(),
                i,
                dim
            )));
        }
        for (j, &value) in row.iter().enumerate() {
            matrix[[i, j]] = value;
        }
    }

    let verse_ids: Vec<i64> = verses.iter().map(|v| v.verse_id).collect();
    let metadata: BTreeMap<i64, VerseMeta> = verses
        .iter()
        .map(|v| {
            (
                v.verse_id,
                VerseMeta {
                    book: v.book.clone(),
                    chapter: v.chapter,
                    verse: v.verse,
                    reference: v.reference(),
                    text: v.text.clone(),
                },
            )
        })
        .collect();

    EmbeddingIndex::new(matrix, verse_ids, metadata)
}
