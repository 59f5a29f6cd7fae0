/// Embedder trait and shared types for text embedding.
pub mod mock;

use std::borrow::Cow;

use thiserror::Error;

/// Appended to text cut down to the embedder's character budget.
pub const TRUNCATION_MARKER: &str = "…[truncated]";

/// Errors that can occur during embedding operations.
#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("inference failed: {0}")]
    InferenceFailed(String),

    #[error("batch embedding not supported")]
    BatchUnsupported,

    #[error("embedding timed out after {0}s")]
    Timeout(u64),

    #[error("expected {expected} vectors, got {actual}")]
    CountMismatch { expected: usize, actual: usize },
}

/// Trait for text embedding implementations.
///
/// All implementations must be `Send + Sync` to allow concurrent use
/// behind `Arc`.
pub trait Embedder: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError>;

    /// Embed multiple text strings into vectors, one per input, in order.
    fn embed_batch(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        Err(EmbedderError::BatchUnsupported)
    }

    /// Whether `embed_batch` is a real primitive. Callers fall back to
    /// per-text `embed` when it is not.
    fn supports_batch(&self) -> bool {
        false
    }

    /// Return the dimensionality of the embedding vectors.
    fn dimensions(&self) -> usize;
}

/// Cut `text` to at most `max_chars` characters, marking the cut.
pub fn prepare_text(text: &str, max_chars: usize) -> Cow<'_, str> {
    match text.char_indices().nth(max_chars) {
        None => Cow::Borrowed(text),
        Some((byte, _)) => Cow::Owned(format!("{}{TRUNCATION_MARKER}", &text[..byte])),
    }
}

/// Embed every text, through `embed_batch` when the embedder has one.
pub fn embed_all(embedder: &dyn Embedder, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
    let vectors = if embedder.supports_batch() {
        match embedder.embed_batch(texts) {
            Err(EmbedderError::BatchUnsupported) => embed_each(embedder, texts)?,
            other => other?,
        }
    } else {
        embed_each(embedder, texts)?
    };
    if vectors.len() != texts.len() {
        return Err(EmbedderError::CountMismatch {
            expected: texts.len(),
            actual: vectors.len(),
        });
    }
    Ok(vectors)
}

fn embed_each(embedder: &dyn Embedder, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
    texts.iter().map(|t| embedder.embed(t)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SingleOnly {
        calls: AtomicUsize,
    }

    impl Embedder for SingleOnly {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![text.len() as f32])
        }

        fn dimensions(&self) -> usize {
            1
        }
    }

    struct ShortBatch;

    impl Embedder for ShortBatch {
        fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedderError> {
            Ok(vec![0.0])
        }

        fn embed_batch(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
            Ok(vec![vec![0.0]])
        }

        fn supports_batch(&self) -> bool {
            true
        }

        fn dimensions(&self) -> usize {
            1
        }
    }

    #[test]
    fn test_prepare_text_short_is_borrowed() {
        assert!(matches!(prepare_text("hello", 10), Cow::Borrowed("hello")));
        assert!(matches!(prepare_text("hello", 5), Cow::Borrowed("hello")));
    }

    #[test]
    fn test_prepare_text_truncates_on_char_boundary() {
        let out = prepare_text("héllo wörld", 4);
        assert_eq!(out, "héll…[truncated]");
        assert!(out.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn test_embed_all_falls_back_to_single() {
        let embedder = SingleOnly {
            calls: AtomicUsize::new(0),
        };
        assert!(matches!(embedder.embed_batch(&["a"]), Err(EmbedderError::BatchUnsupported)));
        let vectors = embed_all(&embedder, &["a", "bb", "ccc"]).unwrap();
        assert_eq!(vectors, vec![vec![1.0], vec![2.0], vec![3.0]]);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_embed_all_count_mismatch() {
        let err = embed_all(&ShortBatch, &["a", "b"]).unwrap_err();
        assert!(matches!(err, EmbedderError::CountMismatch { expected: 2, actual: 1 }));
    }
}
