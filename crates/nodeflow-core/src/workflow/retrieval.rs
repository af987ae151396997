//! Retrieval augmentation for knowledge-backed PROCESS nodes.
//!
//! Queries the retrieval collaborator, drops chunks under the similarity
//! threshold, packs the rest into a token budget, and appends the cited
//! context to the system prompt used for one completion call. The node's
//! own configuration is never touched; callers get a fresh prompt back.

use nodeflow_types::knowledge::{RagConfig, RankedChunk};
use serde::{Deserialize, Serialize};

use crate::knowledge::box_retriever::BoxKnowledgeRetriever;

use super::error::ProcessorError;

const CONTEXT_HEADER: &str = "以下是从知识库中检索到的相关内容，请参考这些内容回答问题：";

/// A chunk that made it into the prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub document_name: String,
    pub chunk_index: u32,
    pub similarity: f32,
}

/// Effective prompt for one invocation plus what was injected.
#[derive(Debug, Clone, PartialEq)]
pub struct Augmentation {
    pub system_prompt: Option<String>,
    pub citations: Vec<Citation>,
}

/// Retrieve from `kb_id` and build the augmented system prompt.
pub async fn augment(
    retriever: &BoxKnowledgeRetriever,
    kb_id: &str,
    query: &str,
    rag: &RagConfig,
    system_prompt: Option<&str>,
) -> Result<Augmentation, ProcessorError> {
    let chunks = retriever
        .retrieve(kb_id, query, rag.top_k, rag.threshold)
        .await?;
    let retrieved = chunks.len();
    let (context, citations) = assemble(chunks, rag);

    tracing::debug!(
        kb_id,
        retrieved,
        injected = citations.len(),
        "knowledge context assembled"
    );

    let system_prompt = match (system_prompt, context.is_empty()) {
        (base, true) => base.map(str::to_string),
        (Some(base), false) if !base.trim().is_empty() => {
            Some(format!("{base}\n\n{CONTEXT_HEADER}\n\n{context}"))
        }
        (_, false) => Some(format!("{CONTEXT_HEADER}\n\n{context}")),
    };

    Ok(Augmentation {
        system_prompt,
        citations,
    })
}

/// Filter, rank and pack chunks into the context budget.
///
/// Whole chunks are added in descending similarity while they fit; the first
/// chunk that does not fit is truncated to the remaining budget and packing
/// stops.
pub fn assemble(chunks: Vec<RankedChunk>, rag: &RagConfig) -> (String, Vec<Citation>) {
    let mut chunks: Vec<RankedChunk> = chunks
        .into_iter()
        .filter(|c| c.similarity >= rag.threshold)
        .collect();
    chunks.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    chunks.truncate(rag.top_k);

    let mut remaining = rag.max_context_tokens;
    let mut sections = Vec::new();
    let mut citations = Vec::new();

    for chunk in chunks {
        if remaining == 0 {
            break;
        }
        let cost = estimate_tokens(&chunk.content);
        let content = if cost <= remaining {
            remaining -= cost;
            chunk.content.clone()
        } else {
            let truncated = truncate_to_tokens(&chunk.content, remaining);
            remaining = 0;
            if truncated.is_empty() {
                break;
            }
            truncated
        };
        sections.push(format!("[来源: {}]\n{}", chunk.document_name, content));
        citations.push(Citation {
            document_name: chunk.document_name,
            chunk_index: chunk.chunk_index,
            similarity: chunk.similarity,
        });
    }

    (sections.join("\n\n"), citations)
}

/// Rough token estimate: four ASCII characters per token, one token per
/// non-ASCII character.
pub fn estimate_tokens(text: &str) -> usize {
    let (ascii, other) = text.chars().fold((0usize, 0usize), |(a, o), c| {
        if c.is_ascii() { (a + 1, o) } else { (a, o + 1) }
    });
    ascii.div_ceil(4) + other
}

/// Longest prefix of `text` whose estimate fits `budget`, in one pass.
fn truncate_to_tokens(text: &str, budget: usize) -> String {
    let (mut ascii, mut other) = (0usize, 0usize);
    for (idx, c) in text.char_indices() {
        if c.is_ascii() {
            ascii += 1;
        } else {
            other += 1;
        }
        if ascii.div_ceil(4) + other > budget {
            return text[..idx].to_string();
        }
    }
    text.to_string()
}
