//! Beam search decoding.
//!
//! Model-agnostic: the model is driven through [`DecoderStep`], which returns
//! log-probabilities for the token that follows a decoder prefix.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GeneratorConfig;
use crate::error::{Result, StudyMateError};

/// One decoding step of a sequence model.
pub trait DecoderStep {
    /// Log-probabilities over the vocabulary for the token following `prefix`.
    ///
    /// `prefix` always starts with the decoder start token.
    fn next_log_probs(&mut self, prefix: &[u32]) -> Result<Vec<f32>>;
}

impl<F> DecoderStep for F
where
    F: FnMut(&[u32]) -> Result<Vec<f32>>,
{
    fn next_log_probs(&mut self, prefix: &[u32]) -> Result<Vec<f32>> {
        self(prefix)
    }
}

/// Search settings shared by every model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Beam width.
    pub num_beams: usize,
    /// Maximum number of generated tokens, end-of-sequence included.
    pub max_new_tokens: usize,
    /// Finish as soon as `num_beams` hypotheses are complete.
    pub early_stopping: bool,
    /// Exponent applied to the hypothesis length when scoring.
    pub length_penalty: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self::from(&GeneratorConfig::default())
    }
}

impl From<&GeneratorConfig> for GenerationParams {
    fn from(config: &GeneratorConfig) -> Self {
        Self {
            num_beams: config.num_beams,
            max_new_tokens: config.max_new_tokens,
            early_stopping: config.early_stopping,
            length_penalty: config.length_penalty,
        }
    }
}

/// Special token ids that frame a decoded sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialTokens {
    /// First token fed to the decoder.
    pub decoder_start: u32,
    /// Token that ends a hypothesis.
    pub eos: u32,
}

#[derive(Debug, Clone)]
struct Beam {
    tokens: Vec<u32>,
    log_prob: f32,
}

#[derive(Debug, Clone)]
struct Finished {
    tokens: Vec<u32>,
    score: f32,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    beam: usize,
    token: u32,
    log_prob: f32,
}

fn length_normalized(log_prob: f32, length: usize, length_penalty: f32) -> f32 {
    log_prob / (length.max(1) as f32).powf(length_penalty)
}

/// The `n` highest-scoring `(token, log_prob)` pairs, best first, ties by token id.
fn top_tokens(log_probs: &[f32], n: usize) -> Vec<(u32, f32)> {
    let by_score = |a: &(u32, f32), b: &(u32, f32)| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0));

    let mut scored: Vec<(u32, f32)> =
        log_probs.iter().enumerate().map(|(id, lp)| (id as u32, *lp)).collect();
    if n < scored.len() {
        scored.select_nth_unstable_by(n, by_score);
        scored.truncate(n);
    }
    scored.sort_by(by_score);
    scored
}

/// Run beam search and return the best hypothesis.
///
/// The returned tokens exclude the decoder start token and the end-of-sequence
/// token. Hypotheses are ranked by summed log-probability divided by
/// `generated_length ^ length_penalty`.
///
/// # Errors
///
/// Returns [`StudyMateError::Generation`] if `num_beams` is zero, or any error
/// raised by the decoder step.
pub fn beam_search(
    step: &mut impl DecoderStep,
    params: &GenerationParams,
    special: SpecialTokens,
) -> Result<Vec<u32>> {
    if params.num_beams == 0 {
        return Err(StudyMateError::Generation("num_beams must be greater than zero".into()));
    }

    let num_beams = params.num_beams;
    let mut beams = vec![Beam { tokens: vec![special.decoder_start], log_prob: 0.0 }];
    let mut finished: Vec<Finished> = Vec::new();
    let mut done = false;

    for generated in 1..=params.max_new_tokens {
        let mut candidates = Vec::with_capacity(beams.len() * num_beams * 2);
        for (index, beam) in beams.iter().enumerate() {
            let log_probs = step.next_log_probs(&beam.tokens)?;
            for (token, log_prob) in top_tokens(&log_probs, 2 * num_beams) {
                let log_prob = beam.log_prob + log_prob;
                candidates.push(Candidate { beam: index, token, log_prob });
            }
        }
        candidates.sort_by(|a, b| {
            b.log_prob
                .total_cmp(&a.log_prob)
                .then(a.beam.cmp(&b.beam))
                .then(a.token.cmp(&b.token))
        });

        let mut next = Vec::with_capacity(num_beams);
        for (rank, candidate) in candidates.into_iter().enumerate() {
            let parent = &beams[candidate.beam];
            if candidate.token == special.eos {
                // Only an end token ranked inside the beam width completes a hypothesis.
                if rank < num_beams {
                    let score =
                        length_normalized(candidate.log_prob, generated, params.length_penalty);
                    finished.push(Finished { tokens: parent.tokens[1..].to_vec(), score });
                }
                continue;
            }
            let mut tokens = parent.tokens.clone();
            tokens.push(candidate.token);
            next.push(Beam { tokens, log_prob: candidate.log_prob });
            if next.len() == num_beams {
                break;
            }
        }
        beams = next;

        if beams.is_empty() || is_done(&finished, &beams, generated, params) {
            debug!(generated, finished = finished.len(), "beam search finished early");
            done = true;
            break;
        }
    }

    // Hit the token limit with beams that can still win: score them as they stand.
    if !done {
        for beam in &beams {
            let length = beam.tokens.len() - 1;
            finished.push(Finished {
                tokens: beam.tokens[1..].to_vec(),
                score: length_normalized(beam.log_prob, length, params.length_penalty),
            });
        }
    }

    finished
        .into_iter()
        .reduce(|best, f| {
            if f.score.total_cmp(&best.score) == Ordering::Greater { f } else { best }
        })
        .map(|f| f.tokens)
        .ok_or_else(|| StudyMateError::Generation("beam search produced no hypothesis".into()))
}

fn is_done(
    finished: &[Finished],
    beams: &[Beam],
    generated: usize,
    params: &GenerationParams,
) -> bool {
    if finished.len() < params.num_beams {
        return false;
    }
    if params.early_stopping {
        return true;
    }
    let worst_kept = worst_of_best(finished, params.num_beams);
    let best_running = beams
        .iter()
        .map(|b| length_normalized(b.log_prob, generated, params.length_penalty))
        .fold(f32::NEG_INFINITY, f32::max);
    best_running <= worst_kept
}

/// Score of the `n`-th best finished hypothesis.
fn worst_of_best(finished: &[Finished], n: usize) -> f32 {
    let mut scores: Vec<f32> = finished.iter().map(|f| f.score).collect();
    scores.sort_by(|a, b| b.total_cmp(a));
    scores[n.min(scores.len()) - 1]
}
