pub mod assembler;
pub mod estimator;

pub use assembler::{AssembledContext, Budget, ContextAssembler};
pub use estimator::{ArcTokenizer, Tiktoken, TokenEstimator, Tokenizer};
