//! Contiguous dataset helpers and batch streams.
//!
//! `Dataset` provides validated, row-major storage for stimulus/response matrices.
//! Evaluation consumes data through [`BatchStream`], a finite and restartable
//! sequence of `(inputs, targets)` batches; [`DataLoader`] is the in-memory implementation.

use crate::{Error, Result};

/// Validation data: stimuli and the responses recorded for them.
///
/// Stored as contiguous row-major buffers:
/// - `stimuli.len() == len * input_dim`
/// - `responses.len() == len * target_dim`
#[derive(Debug, Clone)]
pub struct Dataset {
    stimuli: Vec<f32>,
    responses: Vec<f32>,
    len: usize,
    input_dim: usize,
    target_dim: usize,
}

impl Dataset {
    /// Build a dataset from flat buffers.
    ///
    /// `stimuli` is `(len, input_dim)` and `responses` is `(len, target_dim)`.
    pub fn from_flat(
        stimuli: Vec<f32>,
        responses: Vec<f32>,
        input_dim: usize,
        target_dim: usize,
    ) -> Result<Self> {
        if input_dim == 0 || target_dim == 0 {
            return Err(Error::InvalidData(format!(
                "input_dim and target_dim must be > 0, got ({input_dim}, {target_dim})"
            )));
        }
        if !stimuli.len().is_multiple_of(input_dim) {
            return Err(Error::InvalidData(format!(
                "stimuli length {} is not divisible by input_dim {input_dim}",
                stimuli.len()
            )));
        }
        let len = stimuli.len() / input_dim;
        if responses.len() != len * target_dim {
            return Err(Error::InvalidData(format!(
                "responses length {} does not match len * target_dim ({len} * {target_dim})",
                responses.len()
            )));
        }

        Ok(Self {
            stimuli,
            responses,
            len,
            input_dim,
            target_dim,
        })
    }

    /// Build a dataset from per-example rows (copied into contiguous storage).
    pub fn from_rows(stimuli: &[Vec<f32>], responses: &[Vec<f32>]) -> Result<Self> {
        if stimuli.len() != responses.len() {
            return Err(Error::InvalidData(format!(
                "stimuli/responses row count mismatch: {} vs {}",
                stimuli.len(),
                responses.len()
            )));
        }
        let input_dim = stimuli.first().map_or(0, Vec::len);
        let target_dim = responses.first().map_or(0, Vec::len);
        Self::from_flat(
            flatten(stimuli, input_dim, "stimulus")?,
            flatten(responses, target_dim, "response")?,
            input_dim,
            target_dim,
        )
    }

    #[inline]
    /// Returns the number of examples.
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    #[inline]
    /// Number of response channels.
    pub fn target_dim(&self) -> usize {
        self.target_dim
    }

    #[inline]
    /// Returns the `idx`-th `(stimulus, response)` pair.
    ///
    /// Panics if `idx >= len`.
    pub fn example(&self, idx: usize) -> (&[f32], &[f32]) {
        (
            &self.stimuli[idx * self.input_dim..(idx + 1) * self.input_dim],
            &self.responses[idx * self.target_dim..(idx + 1) * self.target_dim],
        )
    }
}

fn flatten(rows: &[Vec<f32>], dim: usize, what: &str) -> Result<Vec<f32>> {
    let mut flat = Vec::with_capacity(rows.len() * dim);
    for (i, row) in rows.iter().enumerate() {
        if row.len() != dim {
            return Err(Error::InvalidData(format!(
                "{what} row {i} has len {}, expected {dim}",
                row.len()
            )));
        }
        flat.extend_from_slice(row);
    }
    Ok(flat)
}

/// One batch of aligned stimuli and responses.
///
/// `inputs` is `(len, input_dim)` and `targets` is `(len, target_dim)`, both row-major.
#[derive(Debug, Clone, Copy)]
pub struct Batch<'a> {
    pub inputs: &'a [f32],
    pub targets: &'a [f32],
    pub len: usize,
}

/// A finite, restartable sequence of batches.
///
/// Every call to [`BatchStream::batches`] starts from the beginning. Items are `Result`s
/// so streams backed by fallible sources can surface errors mid-iteration.
pub trait BatchStream {
    type Iter<'a>: Iterator<Item = Result<Batch<'a>>>
    where
        Self: 'a;

    fn input_dim(&self) -> usize;

    fn target_dim(&self) -> usize;

    fn batches(&self) -> Self::Iter<'_>;
}

/// Fixed-size batches over an in-memory [`Dataset`], in row order.
///
/// The final batch is short when `len` is not a multiple of `batch_size`.
#[derive(Debug, Clone, Copy)]
pub struct DataLoader<'d> {
    dataset: &'d Dataset,
    batch_size: usize,
}

impl<'d> DataLoader<'d> {
    pub fn new(dataset: &'d Dataset, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be > 0".to_owned()));
        }
        Ok(Self {
            dataset,
            batch_size,
        })
    }

    #[inline]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[inline]
    pub fn dataset(&self) -> &'d Dataset {
        self.dataset
    }
}

impl BatchStream for DataLoader<'_> {
    type Iter<'a>
        = Batches<'a>
    where
        Self: 'a;

    fn input_dim(&self) -> usize {
        self.dataset.input_dim()
    }

    fn target_dim(&self) -> usize {
        self.dataset.target_dim()
    }

    fn batches(&self) -> Batches<'_> {
        Batches {
            dataset: self.dataset,
            batch_size: self.batch_size,
            next: 0,
        }
    }
}

/// Iterator returned by [`DataLoader::batches`].
#[derive(Debug, Clone)]
pub struct Batches<'a> {
    dataset: &'a Dataset,
    batch_size: usize,
    next: usize,
}

impl<'a> Iterator for Batches<'a> {
    type Item = Result<Batch<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        let total = self.dataset.len();
        if self.next >= total {
            return None;
        }
        let start = self.next;
        let end = (start + self.batch_size).min(total);
        self.next = end;

        let in_dim = self.dataset.input_dim();
        let t_dim = self.dataset.target_dim();
        Some(Ok(Batch {
            inputs: &self.dataset.stimuli[start * in_dim..end * in_dim],
            targets: &self.dataset.responses[start * t_dim..end * t_dim],
            len: end - start,
        }))
    }
}
