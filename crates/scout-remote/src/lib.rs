pub mod gemini;
pub mod protocol;
pub mod serper;

pub use gemini::GeminiBackend;
pub use serper::SerperSearch;
