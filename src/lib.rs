//! neardup - near-duplicate document detection with MinHash and LSH.
//!
//! Documents are condensed into fixed-size MinHash signatures whose
//! element-wise agreement estimates the Jaccard similarity of their token
//! sets. Signatures of known (labeled) documents are banded into an
//! [`LshIndex`], which returns likely near-duplicates of a new document
//! without comparing it to the whole corpus. Candidates are then ranked by
//! estimated similarity.
//!
//! # Quick start
//!
//! ```
//! use neardup::{Condenser, LshConfig, LshIndex};
//! use neardup::ranking::rank;
//!
//! let condenser = Condenser::from_spec("ws:norm::128").unwrap();
//! let corpus = [
//!     ("B", condenser.signature("the quick fox")),
//!     ("C", condenser.signature("totally different text")),
//! ];
//!
//! let mut index = LshIndex::new(&LshConfig::new(0.5, 128)).unwrap();
//! for (id, sig) in &corpus {
//!     index.insert(id, sig).unwrap();
//! }
//!
//! let query = condenser.signature("The quick fox!");
//! let candidates = index.query(&query).unwrap();
//! let matches = rank(
//!     corpus
//!         .iter()
//!         .filter(|(id, _)| candidates.contains(*id))
//!         .map(|(id, sig)| (*id, sig)),
//!     &query,
//!     Some(0.5),
//! )
//! .unwrap();
//!
//! assert_eq!(matches.len(), 1);
//! assert_eq!(matches[0].id, "B");
//! assert_eq!(matches[0].similarity, 1.0);
//! ```

pub mod cli;
pub mod condenser;
pub mod data_dir;
pub mod document_db;
pub mod error;
pub mod evaluation;
pub mod hashing;
pub mod ingestion;
pub mod lsh;
pub mod normalizer;
pub mod output;
pub mod pipeline;
pub mod ranking;
pub mod signature;
pub mod store;
pub mod tokenizer;
pub mod walker;

pub use condenser::Condenser;
pub use data_dir::DataDir;
pub use document_db::DocumentDb;
pub use error::{Error, Result};
pub use lsh::{LshConfig, LshIndex, SharedIndex};
pub use pipeline::Pipeline;
pub use signature::{Signature, SignatureBuilder};
pub use store::{DocumentRecord, MemoryStore, SignatureStore};
