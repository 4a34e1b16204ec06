pub mod context;
pub mod extractor;
pub mod pipeline;
pub mod scanner;
