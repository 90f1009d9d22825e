//! Persisted outputs.
//!
//! # Output Structure
//!
//! ```text
//! data_dir/
//! ├── prices.json        # PriceBar rows, rewritten every crawl
//! ├── news_corpus.json   # ArticleRecord rows, rewritten at every checkpoint
//! ├── combined.json      # CombinedRow rows
//! └── ticker_news.log
//! ```

pub mod json;
