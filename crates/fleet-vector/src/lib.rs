//! # fleet-vector
//!
//! Semantic index adapter. [`SemanticIndex`] is the capability surface the
//! mirror and the router depend on; [`DataServicesIndex`] talks to the
//! data-services REST API and [`MemoryIndex`] keeps everything in process.
//!
//! ```rust,no_run
//! use fleet_vector::{DataServicesIndex, IndexConfig, SearchQuery, SemanticIndex};
//!
//! # async fn example() -> Result<(), fleet_vector::IndexError> {
//! let index = DataServicesIndex::new(IndexConfig::new("http://localhost:8000"))?;
//! let response = index
//!     .search("agent_cards", &SearchQuery::new("python code").with_limit(5))
//!     .await?;
//! for hit in response.result {
//!     println!("{:.3} {}", hit.score, hit.content);
//! }
//! # Ok(())
//! # }
//! ```

pub mod data_services;
pub mod document;
pub mod error;
pub mod index;
pub mod memory;

pub use data_services::{DEFAULT_BASE_URL, DataServicesIndex, IndexConfig};
pub use document::{Document, SearchHit, SearchMode, SearchQuery, SearchResponse};
pub use error::{IndexError, IndexResult};
pub use index::SemanticIndex;
pub use memory::MemoryIndex;
