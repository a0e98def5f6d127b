//! Prompt template and token-budget assembly.

use tracing::debug;

use crate::error::Result;

/// Delimiter placed between retrieved passages in the context block.
pub const CONTEXT_DELIMITER: &str = "\n\n---\n\n";

/// Instructions that open every prompt.
pub const INSTRUCTIONS: &str = "You are an expert assistant. Your task is to answer the user's \
question based *only* on the following context extracted from a document.\n\
Summarize the information in a clear, narrative paragraph. Do not mention the context directly.\n\
If the answer is not available in the provided context, state that you cannot find the \
information in the document.";

fn header() -> String {
    format!("{INSTRUCTIONS}\n\nCONTEXT:\n")
}

fn tail(question: &str) -> String {
    format!("\n\nQUESTION: {question}\n\nANSWER:")
}

/// Join passages in ranked order with [`CONTEXT_DELIMITER`].
pub fn join_context<P: AsRef<str>>(passages: &[P]) -> String {
    passages.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(CONTEXT_DELIMITER)
}

/// Tokenize the prompt so that it fits in `max_tokens`, end-of-sequence included.
///
/// The instruction header and the question tail are reserved first and the
/// context is cut from its end. If header and tail alone overflow, the context
/// is dropped and the header is cut from its end. If the tail alone overflows,
/// only the beginning of the tail is kept.
///
/// `tokenize` must not add special tokens.
pub fn encode_prompt<F>(
    mut tokenize: F,
    eos_token_id: u32,
    question: &str,
    context: &str,
    max_tokens: usize,
) -> Result<Vec<u32>>
where
    F: FnMut(&str) -> Result<Vec<u32>>,
{
    let budget = max_tokens.saturating_sub(1);

    let mut header_ids = tokenize(&header())?;
    let mut context_ids = tokenize(context)?;
    let mut tail_ids = tokenize(&tail(question))?;
    let full_len = header_ids.len() + context_ids.len() + tail_ids.len();

    if tail_ids.len() > budget {
        header_ids.clear();
        context_ids.clear();
        tail_ids.truncate(budget);
    } else if header_ids.len() + tail_ids.len() > budget {
        context_ids.clear();
        header_ids.truncate(budget - tail_ids.len());
    } else {
        context_ids.truncate(budget - header_ids.len() - tail_ids.len());
    }

    let mut ids = Vec::with_capacity(budget + 1);
    ids.extend(header_ids);
    ids.extend(context_ids);
    ids.extend(tail_ids);
    if ids.len() < full_len {
        debug!(prompt_tokens = full_len, kept_tokens = ids.len(), "truncated prompt");
    }
    ids.push(eos_token_id);
    Ok(ids)
}
