//! Planar and spherical triangle methods: area and polar moment of an observed trio,
//! disambiguated by pivoting the third star through the rest of the image.

use tracing::{debug, trace};

use super::enumerate::{Combinations, PERMUTATIONS_3};
use super::{
    keep_searching, Comparisons, IdentificationContext, Identification, IdentifyError, TieBreak,
};
use crate::geometry::trio;
use crate::index::{TableKind, Window};
use crate::star::Label;

/// `(area, moment)` of the observed trio, or `None` when the spherical formulas fail.
fn invariants(
    ctx: &IdentificationContext,
    kind: TableKind,
    [i, j, k]: [usize; 3],
) -> Result<Option<(f64, f64)>, IdentifyError> {
    let (b1, b2, b3) = (ctx.body(i)?.uvec(), ctx.body(j)?.uvec(), ctx.body(k)?.uvec());
    Ok(if kind == TableKind::SphericalTriangle {
        trio::spherical_area(&b1, &b2, &b3)
            .zip(trio::spherical_moment(&b1, &b2, &b3, ctx.parameters.moment_depth))
    } else {
        Some((trio::planar_area(&b1, &b2, &b3), trio::planar_moment(&b1, &b2, &b3)))
    })
}

/// Catalog trios whose area and moment match the observed trio. Labels are in catalog
/// order; the correspondence to `i, j, k` is not known yet.
pub(super) fn trios(
    ctx: &IdentificationContext,
    kind: TableKind,
    trio: [usize; 3],
) -> Result<Vec<[Label; 3]>, IdentifyError> {
    let Some((area, moment)) = invariants(ctx, kind, trio)? else {
        return Ok(Vec::new());
    };
    let p = ctx.parameters;
    let rows = ctx.table()?.range_query(
        Window::three_sigma(area, p.sigma_primary),
        &[(1, Window::three_sigma(moment, p.sigma_secondary))],
    )?;
    Ok(rows
        .iter()
        .map(|r| [r.labels()[0], r.labels()[1], r.labels()[2]])
        .collect())
}

pub fn query(
    ctx: &IdentificationContext,
    kind: TableKind,
    trio: [usize; 3],
) -> Result<Vec<Vec<Label>>, IdentifyError> {
    Ok(trios(ctx, kind, trio)?
        .iter()
        .map(|t| t.to_vec())
        .collect())
}

fn shared_labels(a: &[Label; 3], b: &[Label; 3]) -> usize {
    a.iter().filter(|l| b.contains(l)).count()
}

/// Narrow the candidates for `trio` to one catalog trio by pivoting.
///
/// Each remaining image star `p` is paired in turn with `(i, j)`, `(i, k)` and `(j, k)`,
/// so every label of a candidate is tested against some pivoted subset. Surviving
/// candidates must share two labels with some trio found for the pivoted subset. A pivot
/// that would eliminate every survivor is treated as a spurious star and skipped.
/// Returns the observed trio the labels belong to.
fn pivot(
    ctx: &IdentificationContext,
    kind: TableKind,
    trio: [usize; 3],
    nu: &mut Comparisons,
) -> Result<([usize; 3], [Label; 3]), IdentifyError> {
    nu.tick()?;
    let mut body = trio;
    let mut survivors = trios(ctx, kind, trio)?;

    for p in 0..ctx.image.len() {
        if body.contains(&p) {
            continue;
        }
        for (a, b) in [(0, 1), (0, 2), (1, 2)] {
            if survivors.len() == 1 {
                break;
            }
            nu.tick()?;
            let pivoted = [body[a], body[b], p];
            let next = trios(ctx, kind, pivoted)?;
            trace!("pivot {:?} -> {:?}: {} vs {} trios", body, pivoted, survivors.len(), next.len());
            if survivors.is_empty() {
                survivors = next;
                body = pivoted;
                break;
            }
            let kept: Vec<_> = survivors
                .iter()
                .filter(|t| next.iter().any(|u| shared_labels(t, u) >= 2))
                .copied()
                .collect();
            if !kept.is_empty() {
                survivors = kept;
            }
        }
    }

    match (survivors.len(), ctx.parameters.tie_break) {
        (0, _) => Err(IdentifyError::NoCandidateTrioFound),
        (1, _) | (_, TieBreak::First) => Ok((body, survivors[0])),
        (_, TieBreak::Reject) => Err(IdentifyError::NoConfidentReduction),
    }
}

/// Try every assignment of the catalog trio to the observed trio and keep the largest
/// overlay.
fn align(
    ctx: &IdentificationContext,
    body: [usize; 3],
    labels: [Label; 3],
) -> Result<Identification, IdentifyError> {
    let Some(inertial) = ctx.inertials(&labels) else {
        return Err(IdentifyError::NoCandidateTrioFound);
    };
    let observed = [ctx.body(body[0])?, ctx.body(body[1])?];
    let candidates = ctx.nearby(&inertial[0]);

    let mut best: Option<Identification> = None;
    for perm in PERMUTATIONS_3 {
        let assigned = [inertial[perm[0]], inertial[perm[1]]];
        let (stars, rotation) = ctx.overlay(&observed, &assigned, &candidates)?;
        if best.as_ref().is_none_or(|b| stars.len() > b.stars.len()) {
            best = Some(Identification { stars, rotation });
        }
    }
    match best {
        Some(found) if ctx.is_success(&found.stars) => Ok(found),
        _ => Err(IdentifyError::NoConfidentAlignment),
    }
}

pub fn reduce(
    ctx: &IdentificationContext,
    kind: TableKind,
    nu: &mut Comparisons,
) -> Result<Vec<Label>, IdentifyError> {
    for trio in Combinations::<3>::new(ctx.image.len()) {
        if let Some((_, labels)) = keep_searching(pivot(ctx, kind, trio, nu))? {
            return Ok(labels.to_vec());
        }
    }
    Err(IdentifyError::NoConfidentReduction)
}

pub fn identify(
    ctx: &IdentificationContext,
    kind: TableKind,
    nu: &mut Comparisons,
) -> Result<Identification, IdentifyError> {
    for trio in Combinations::<3>::new(ctx.image.len()) {
        let Some((body, labels)) = keep_searching(pivot(ctx, kind, trio, nu))? else {
            continue;
        };
        debug!("trio {:?} -> {:?}", body, labels);
        if let Some(found) = keep_searching(align(ctx, body, labels))? {
            return Ok(found);
        }
    }
    Err(IdentifyError::NoConfidentAlignment)
}
