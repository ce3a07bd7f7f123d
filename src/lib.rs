//! # hoku
//!
//! **Lost-in-space star identification** in Rust: given a handful of star directions
//! measured in a sensor's body frame and no prior attitude, find which catalog stars they
//! are and the rotation that carries the catalog into the body frame.
//!
//! The crate collects several classic identification methods behind one interface so
//! they can be compared on the same catalog, index and synthetic workloads.
//!
//! ## Features
//!
//! - **Seven methods**: angle, dot-angle, planar and spherical triangle, pyramid,
//!   composite pyramid, and four-star asterism hashing with Bayes-factor verification
//! - **Invariant index tables**: sorted columnar tables with a K-vector rank side-table,
//!   so a range query on the primary invariant is a slice lookup
//! - **Spatial trees**: quad-tree and k-d tree arenas over a Mercator projection whose
//!   radius queries agree exactly with a linear catalog scan
//! - **Wahba solvers**: TRIAD and SVD, selectable per run
//! - **Comparison budget**: every search is bounded by `nu_max`, and running out of
//!   budget is reported separately from a genuine non-match
//! - **Zero-copy persistence**: table stores serialize with [rkyv](https://docs.rs/rkyv)
//! - **Synthetic workloads**: rotated catalog fields with extra, missing and shifted light
//!
//! ## Example
//!
//! ```no_run
//! use hoku::{build_store, Method, Parameters, IdentificationContext, StarCatalog, TableConfig};
//!
//! let catalog = StarCatalog::from_hipparcos_file("data/hip2.dat", 6.0, Some(2025.0))?;
//! let tables = build_store(&catalog, &TableConfig::default())?;
//! tables.save_to_file("data/hoku.rkyv")?;
//!
//! // body-frame unit vectors from a star tracker
//! let image: Vec<hoku::Star> = Vec::new();
//! let parameters = Parameters::for_method(Method::Pyramid);
//! let ctx = IdentificationContext::new(&image, 20.0, &catalog, &tables, &parameters);
//! let outcome = Method::Pyramid.run(&ctx);
//! match &outcome.result {
//!     Ok(found) => println!("{} stars identified, q = {}", found.stars.len(), found.rotation),
//!     Err(e) => println!("no identification: {e} (nu = {})", outcome.nu),
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Algorithm overview
//!
//! 1. **Index generation**: enumerate pairs, trios or quads of bright catalog stars that
//!    fit in the field of view and store their invariants in a sorted table
//! 2. **Subset search**: walk small subsets of the image in a fixed, repeatable order
//! 3. **Query and reduction**: look the subset's invariant up in the table and narrow the
//!    candidates to one catalog tuple
//! 4. **Alignment**: solve Wahba's problem for the tuple and overlay nearby catalog stars
//!    to grow the match set; accept once enough stars agree
//!

pub mod attitude;
pub mod benchmark;
/// Raw star catalog file formats: Hipparcos and the CSV catalog table
pub mod catalogs;
pub mod config;
pub mod geometry;
pub mod identification;
pub mod index;
pub mod star;
pub mod starcatalog;
pub mod tree;

pub use attitude::{find_matches, WahbaSolver};
pub use benchmark::Image;
pub use config::Config;
pub use identification::{
    AsterismCenters, Comparisons, Identification, IdentificationContext, IdentifyError,
    IdentifyOutcome, Method, Parameters, TieBreak,
};
pub use index::{build_store, build_table, InvariantTable, TableConfig, TableKind, TableStore, Window};
pub use star::*;
pub use starcatalog::*;
pub use tree::{KdTree, NearbyStars, QuadTree};

// Commonly used types
// Default query tolerances sit near 100 * f64::EPSILON, so everything is f64.
pub type Quaternion = nalgebra::UnitQuaternion<f64>;
pub type Vector3 = nalgebra::Vector3<f64>;
