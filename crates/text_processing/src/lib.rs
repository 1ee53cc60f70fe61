//! Text processing for the parish chat backend
//!
//! - **Normalization**: canonical question form used as cache key
//! - **Similarity**: token-overlap score between normalized questions
//! - **Keywords**: whole-token phrase matching for vocabulary families
//!
//! # Example
//!
//! ```
//! use parish_chat_text_processing::{normalize, similarity};
//!
//! let a = normalize("¿Qué es Eloos?");
//! assert_eq!(a, normalize("que es eloos"));
//! assert_eq!(similarity(&a, "que es eloos"), 1.0);
//! ```

pub mod keywords;
pub mod normalize;
pub mod similarity;

pub use keywords::KeywordSet;
pub use normalize::{char_len, normalize, tokenize};
pub use similarity::similarity;
