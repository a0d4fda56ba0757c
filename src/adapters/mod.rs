pub mod llm;
pub mod openai;

pub use openai::ChatEndpoint;
