//! Lost-in-space star identification.
//!
//! Each [`Method`] matches observed (body-frame) directions to catalog stars using a
//! different geometric invariant:
//!
//! 1. **Subset search**: walk minimal subsets of the image (pairs, trios or quads) in a
//!    fixed order, see [`enumerate`].
//! 2. **Index query**: compute the subset's invariant and range-query the method's
//!    [`InvariantTable`] with a `3 sigma` window.
//! 3. **Reduction**: narrow the candidates to one catalog tuple, by pivoting, witness
//!    stars or Bayes-factor scoring depending on the method.
//! 4. **Alignment**: solve the rotation from the reduced tuple and overlay catalog
//!    neighbours onto the image to grow the match set.
//!
//! Every comparison ticks a [`Comparisons`] budget. Running out of budget is reported as
//! [`IdentifyError::ExceededNuMax`], separately from genuine non-matches.

pub mod angle;
pub mod asterism;
pub mod composite;
pub mod dot_angle;
pub mod enumerate;
pub mod pyramid;
pub mod triangle;

#[cfg(test)]
mod fixture;

pub use asterism::AsterismCenters;

use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::attitude::{find_matches, AttitudeError, WahbaSolver};
use crate::index::{IndexError, InvariantTable, TableKind, TableStore};
use crate::star::{Label, Star};
use crate::starcatalog::StarCatalog;
use crate::tree::NearbyStars;
use crate::Quaternion;

// ── Errors ──────────────────────────────────────────────────────────────────

/// Outcome of a failed identification step.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IdentifyError {
    /// The index query returned no rows.
    #[error("no candidates found in the index")]
    NoCandidatesFound,
    #[error("no candidate pair survived filtering")]
    NoCandidatePairFound,
    #[error("no candidate trio survived filtering")]
    NoCandidateTrioFound,
    #[error("no candidate set survived filtering")]
    NoCandidateSetFound,
    /// Candidates remained ambiguous after every subset was tried.
    #[error("no confident reduction")]
    NoConfidentReduction,
    /// No subset produced a verified alignment.
    #[error("no confident alignment")]
    NoConfidentAlignment,
    /// The comparison budget `nu_max` was exceeded.
    #[error("comparison budget exceeded")]
    ExceededNuMax,
    #[error("method expects {expected} stars per subset, got {found}")]
    InvalidSubset { expected: usize, found: usize },
    #[error("star index {index} is outside an image of {len} stars")]
    StarOutOfRange { index: usize, len: usize },
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Attitude(#[from] AttitudeError),
}

impl IdentifyError {
    /// True for the policy stop, as opposed to a search that genuinely failed.
    pub fn is_budget_exceeded(&self) -> bool {
        matches!(self, IdentifyError::ExceededNuMax)
    }

    /// True when the caller misused the API or its inputs.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            IdentifyError::InvalidSubset { .. }
                | IdentifyError::StarOutOfRange { .. }
                | IdentifyError::Index(_)
                | IdentifyError::Attitude(_)
        )
    }

    /// True for the expected, frequent outcomes that simply move the search on.
    pub fn is_search_empty(&self) -> bool {
        matches!(
            self,
            IdentifyError::NoCandidatesFound
                | IdentifyError::NoCandidatePairFound
                | IdentifyError::NoCandidateTrioFound
                | IdentifyError::NoCandidateSetFound
                | IdentifyError::NoConfidentReduction
                | IdentifyError::NoConfidentAlignment
        )
    }
}

// ── Comparison budget ───────────────────────────────────────────────────────

/// Monotone comparison counter checked against `nu_max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Comparisons {
    count: usize,
    limit: usize,
}

impl Comparisons {
    pub fn new(limit: usize) -> Self {
        Self { count: 0, limit }
    }

    /// A counter that never runs out, for one-off queries.
    pub fn unlimited() -> Self {
        Self::new(usize::MAX)
    }

    /// Count one comparison. Fails once the count exceeds the limit.
    pub fn tick(&mut self) -> Result<(), IdentifyError> {
        self.count = self.count.saturating_add(1);
        if self.count > self.limit {
            return Err(IdentifyError::ExceededNuMax);
        }
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }
}

// ── Parameters ──────────────────────────────────────────────────────────────

/// What to do when a reduction leaves more than one candidate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Keep the first candidate in table order.
    #[default]
    First,
    /// Treat the subset as ambiguous and move on.
    Reject,
}

/// Tolerances and policies for one identification run.
///
/// All sigmas are in the unit of the invariant they apply to (degrees for angles).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameters {
    /// Query sigma of the primary invariant. Default `100 * EPSILON`.
    #[serde(alias = "sigma_1")]
    pub sigma_primary: f64,
    /// Query sigma of the second invariant. Default `100 * EPSILON`.
    #[serde(alias = "sigma_2")]
    pub sigma_secondary: f64,
    /// Query sigma of the third invariant. Default `100 * EPSILON`.
    #[serde(alias = "sigma_3")]
    pub sigma_tertiary: f64,
    /// Overlay match sigma, degrees. Default `100 * EPSILON`.
    #[serde(alias = "sigma_4")]
    pub sigma_overlay: f64,
    /// An identification needs more than this many matches (or the whole image).
    /// Default 4.
    pub gamma: usize,
    /// Comparison budget. Default 50000.
    pub nu_max: usize,
    /// Invariant table queried by the method. Default `"NO_TABLE"`.
    pub table_name: String,
    /// Asterism center table, used by the asterism method. Default `"NO_TABLE"`.
    pub center_table_name: String,
    /// Default TRIAD.
    pub solver: WahbaSolver,
    /// Default [`TieBreak::First`].
    pub tie_break: TieBreak,
    /// Spherical moment subdivision depth. Default 3.
    pub moment_depth: u32,
    /// Bayes utilities of the asterism method: true/false positive, true/false negative.
    pub u_tp: f64,
    pub u_fp: f64,
    pub u_tn: f64,
    pub u_fn: f64,
    /// Bayes factor an asterism alignment must exceed. Default 0.
    pub k_accept: f64,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            sigma_primary: 100.0 * f64::EPSILON,
            sigma_secondary: 100.0 * f64::EPSILON,
            sigma_tertiary: 100.0 * f64::EPSILON,
            sigma_overlay: 100.0 * f64::EPSILON,
            gamma: 4,
            nu_max: 50_000,
            table_name: "NO_TABLE".to_string(),
            center_table_name: "NO_TABLE".to_string(),
            solver: WahbaSolver::Triad,
            tie_break: TieBreak::First,
            moment_depth: 3,
            u_tp: 0.0,
            u_fp: 1.0,
            u_tn: 0.0,
            u_fn: -1.0,
            k_accept: 0.0,
        }
    }
}

impl Parameters {
    /// Defaults with the method's standard table names and sigmas filled in.
    pub fn for_method(method: Method) -> Self {
        let mut p = Self {
            table_name: method.table_kind().default_name().to_string(),
            ..Self::default()
        };
        match method {
            Method::PlanarTriangle | Method::SphericalTriangle | Method::CompositePyramid => {
                p.sigma_primary = 10.0 * f64::EPSILON;
                p.sigma_secondary = 10_000.0 * f64::EPSILON;
            }
            Method::Asterism => {
                p.center_table_name = TableKind::AsterismCenter.default_name().to_string();
            }
            _ => {}
        }
        p
    }
}

// ── Context and results ─────────────────────────────────────────────────────

/// Everything one identification run reads. Nothing here is mutated by a run.
#[derive(Clone, Copy)]
pub struct IdentificationContext<'a> {
    /// Observed body-frame directions.
    pub image: &'a [Star],
    /// Field of view in degrees.
    pub fov: f64,
    pub catalog: &'a StarCatalog,
    pub tables: &'a TableStore,
    /// Proximity index used for overlays; the catalog itself unless a tree is supplied.
    pub neighbors: &'a dyn NearbyStars,
    /// Asterism center tree, only used by [`Method::Asterism`].
    pub centers: Option<&'a AsterismCenters>,
    pub parameters: &'a Parameters,
}

impl<'a> IdentificationContext<'a> {
    pub fn new(
        image: &'a [Star],
        fov: f64,
        catalog: &'a StarCatalog,
        tables: &'a TableStore,
        parameters: &'a Parameters,
    ) -> Self {
        Self {
            image,
            fov,
            catalog,
            tables,
            neighbors: catalog,
            centers: None,
            parameters,
        }
    }

    pub fn with_neighbors(mut self, neighbors: &'a dyn NearbyStars) -> Self {
        self.neighbors = neighbors;
        self
    }

    pub fn with_centers(mut self, centers: &'a AsterismCenters) -> Self {
        self.centers = Some(centers);
        self
    }

    fn table(&self) -> Result<&'a InvariantTable, IdentifyError> {
        Ok(self.tables.get(&self.parameters.table_name)?)
    }

    fn body(&self, index: usize) -> Result<Star, IdentifyError> {
        self.image
            .get(index)
            .copied()
            .ok_or(IdentifyError::StarOutOfRange {
                index,
                len: self.image.len(),
            })
    }

    /// Catalog star for `label`, or `None` when the label is unknown.
    fn inertial(&self, label: Label) -> Option<Star> {
        let s = self.catalog.query_by_label(label);
        (!s.is_null()).then_some(s)
    }

    fn inertials(&self, labels: &[Label]) -> Option<Vec<Star>> {
        labels.iter().map(|&l| self.inertial(l)).collect()
    }

    /// Catalog stars within the field of view of `focus`.
    fn nearby(&self, focus: &Star) -> Vec<Star> {
        self.neighbors
            .nearby_stars(focus, self.fov, 2 * self.image.len())
    }

    /// Solve the rotation taking `inertial` onto `body` and overlay `candidates` with it.
    fn overlay(
        &self,
        body: &[Star],
        inertial: &[Star],
        candidates: &[Star],
    ) -> Result<(Vec<Star>, Quaternion), IdentifyError> {
        let q = self.parameters.solver.solve(body, inertial)?;
        let matches = find_matches(self.image, candidates, &q, self.parameters.sigma_overlay);
        Ok((matches, q))
    }

    /// More than `gamma` matches, or the whole image.
    fn is_success(&self, matches: &[Star]) -> bool {
        matches.len() > self.parameters.gamma || matches.len() == self.image.len()
    }
}

/// A successful identification.
#[derive(Debug, Clone, PartialEq)]
pub struct Identification {
    /// Observed stars with catalog labels attached; body vectors are untouched.
    pub stars: Vec<Star>,
    /// Rotation taking catalog directions into the body frame.
    pub rotation: Quaternion,
}

/// Result of [`Method::run`] together with the quantities a trial logger records.
#[derive(Debug, Clone)]
pub struct IdentifyOutcome {
    pub method: Method,
    pub result: Result<Identification, IdentifyError>,
    /// Comparisons spent.
    pub nu: usize,
    pub elapsed_ms: f64,
}

impl IdentifyOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Number of identified stars; zero on failure.
    pub fn result_size(&self) -> usize {
        self.result.as_ref().map(|id| id.stars.len()).unwrap_or(0)
    }

    pub fn error(&self) -> Option<&IdentifyError> {
        self.result.as_ref().err()
    }
}

// ── Methods ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Angle,
    DotAngle,
    PlanarTriangle,
    SphericalTriangle,
    Pyramid,
    CompositePyramid,
    Asterism,
}

impl Method {
    pub const ALL: [Method; 7] = [
        Method::Angle,
        Method::DotAngle,
        Method::PlanarTriangle,
        Method::SphericalTriangle,
        Method::Pyramid,
        Method::CompositePyramid,
        Method::Asterism,
    ];

    /// Kind of table the method queries.
    pub fn table_kind(self) -> TableKind {
        match self {
            Method::Angle | Method::Pyramid => TableKind::Angle,
            Method::DotAngle => TableKind::DotAngle,
            Method::PlanarTriangle | Method::CompositePyramid => TableKind::PlanarTriangle,
            Method::SphericalTriangle => TableKind::SphericalTriangle,
            Method::Asterism => TableKind::AsterismHash,
        }
    }

    /// Number of observed stars in one minimal subset.
    pub fn subset_size(self) -> usize {
        match self {
            Method::Angle => 2,
            Method::Asterism => 4,
            _ => 3,
        }
    }

    /// Catalog label tuples whose invariant matches the observed `subset` (indices into
    /// the image), without any reduction.
    pub fn query(
        self,
        ctx: &IdentificationContext,
        subset: &[usize],
    ) -> Result<Vec<Vec<Label>>, IdentifyError> {
        if subset.len() != self.subset_size() {
            return Err(IdentifyError::InvalidSubset {
                expected: self.subset_size(),
                found: subset.len(),
            });
        }
        for &index in subset {
            ctx.body(index)?;
        }
        match self {
            Method::Angle => angle::query(ctx, subset[0], subset[1]),
            Method::DotAngle => dot_angle::query(ctx, [subset[0], subset[1], subset[2]]),
            Method::PlanarTriangle | Method::SphericalTriangle => {
                triangle::query(ctx, self.table_kind(), [subset[0], subset[1], subset[2]])
            }
            Method::Pyramid => pyramid::query(ctx, [subset[0], subset[1], subset[2]]),
            Method::CompositePyramid => composite::query(ctx, [subset[0], subset[1], subset[2]]),
            Method::Asterism => {
                asterism::query(ctx, [subset[0], subset[1], subset[2], subset[3]])
            }
        }
    }

    /// Catalog labels of the first observed subset that reduces to a single candidate.
    pub fn reduce(
        self,
        ctx: &IdentificationContext,
        nu: &mut Comparisons,
    ) -> Result<Vec<Label>, IdentifyError> {
        match self {
            Method::Angle => angle::reduce(ctx, nu),
            Method::DotAngle => dot_angle::reduce(ctx, nu),
            Method::PlanarTriangle | Method::SphericalTriangle => {
                triangle::reduce(ctx, self.table_kind(), nu)
            }
            Method::Pyramid => pyramid::reduce(ctx, nu),
            Method::CompositePyramid => composite::reduce(ctx, nu),
            Method::Asterism => asterism::reduce(ctx, nu),
        }
    }

    /// Full identification: the first subset whose alignment verifies.
    pub fn identify(
        self,
        ctx: &IdentificationContext,
        nu: &mut Comparisons,
    ) -> Result<Identification, IdentifyError> {
        match self {
            Method::Angle => angle::identify(ctx, nu),
            Method::DotAngle => dot_angle::identify(ctx, nu),
            Method::PlanarTriangle | Method::SphericalTriangle => {
                triangle::identify(ctx, self.table_kind(), nu)
            }
            Method::Pyramid => pyramid::identify(ctx, nu),
            Method::CompositePyramid => composite::identify(ctx, nu),
            Method::Asterism => asterism::identify(ctx, nu),
        }
    }

    /// [`Method::identify`] with a fresh budget of `nu_max`, timed.
    pub fn run(self, ctx: &IdentificationContext) -> IdentifyOutcome {
        let t0 = Instant::now();
        let mut nu = Comparisons::new(ctx.parameters.nu_max);
        let result = self.identify(ctx, &mut nu);
        let elapsed_ms = t0.elapsed().as_secs_f64() * 1000.0;
        match &result {
            Ok(id) => debug!(
                "{:?}: identified {} of {} stars, nu = {}, {:.2} ms",
                self,
                id.stars.len(),
                ctx.image.len(),
                nu.count(),
                elapsed_ms
            ),
            Err(e) => debug!("{:?}: {} after nu = {}, {:.2} ms", self, e, nu.count(), elapsed_ms),
        }
        IdentifyOutcome {
            method: self,
            result,
            nu: nu.count(),
            elapsed_ms,
        }
    }
}

/// Flow control shared by the subset loops: keep searching on an empty result, stop on
/// anything else.
fn keep_searching<T>(attempt: Result<T, IdentifyError>) -> Result<Option<T>, IdentifyError> {
    match attempt {
        Ok(found) => Ok(Some(found)),
        Err(e) if e.is_search_empty() => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_trips_after_limit() {
        let mut nu = Comparisons::new(2);
        assert!(nu.tick().is_ok());
        assert!(nu.tick().is_ok());
        assert_eq!(nu.tick(), Err(IdentifyError::ExceededNuMax));
        assert_eq!(nu.count(), 3);
        nu.reset();
        assert!(nu.tick().is_ok());
    }

    #[test]
    fn error_classes_are_disjoint() {
        let errors = [
            IdentifyError::NoCandidatesFound,
            IdentifyError::NoConfidentAlignment,
            IdentifyError::ExceededNuMax,
            IdentifyError::InvalidSubset {
                expected: 2,
                found: 3,
            },
            IdentifyError::Index(IndexError::MissingTable("X".into())),
        ];
        for e in &errors {
            let classes = [e.is_budget_exceeded(), e.is_usage_error(), e.is_search_empty()];
            assert_eq!(classes.iter().filter(|c| **c).count(), 1, "{e:?}");
        }
    }

    #[test]
    fn method_defaults() {
        let p = Parameters::for_method(Method::SphericalTriangle);
        assert_eq!(p.table_name, "HOKU_SPHERE");
        assert_eq!(p.sigma_primary, 10.0 * f64::EPSILON);
        assert_eq!(p.sigma_secondary, 10_000.0 * f64::EPSILON);
        let p = Parameters::for_method(Method::Asterism);
        assert_eq!(p.center_table_name, "HOKU_CENTER");
        assert_eq!(Parameters::for_method(Method::Pyramid).table_name, "HOKU_ANGLE");
    }
}
