pub mod categorizer;
pub mod discoverer;
pub mod llm;
pub mod scraper;
pub mod summarizer;

pub use categorizer::CategorizeProcessor;
pub use discoverer::SourceDiscoverer;
pub use llm::Claude;
pub use scraper::{HttpScraper, PageScraper, ScrapeProcessor};
pub use summarizer::SummarizeProcessor;
