//! Content processing pipeline: cleaning, embedding, extraction, and
//! coherence checks that feed the Classifier (SPEC_FULL.md §4.2-§4.3, §4.7).

pub mod cleaner;
pub mod coherence;
pub mod daemon_ipc_client;
pub mod embeddings;
pub mod extractor;
pub mod llm_subprocess;
