//! Composite pyramid: the pyramid search driven by planar triangle invariants instead of
//! pairwise angles.

use std::collections::BTreeSet;

use tracing::{debug, trace};

use super::enumerate::{PyramidTrios, PERMUTATIONS_3};
use super::triangle;
use super::{
    keep_searching, Comparisons, IdentificationContext, Identification, IdentifyError, TieBreak,
};
use crate::index::TableKind;
use crate::star::{Label, Star};

const KIND: TableKind = TableKind::PlanarTriangle;

pub fn query(
    ctx: &IdentificationContext,
    trio: [usize; 3],
) -> Result<Vec<Vec<Label>>, IdentifyError> {
    triangle::query(ctx, KIND, trio)
}

/// The single catalog trio matching the observed trio, in catalog order.
fn catalog_trio(
    ctx: &IdentificationContext,
    trio: [usize; 3],
    nu: &mut Comparisons,
) -> Result<[Label; 3], IdentifyError> {
    nu.tick()?;
    let found = triangle::trios(ctx, KIND, trio)?;
    match (found.len(), ctx.parameters.tie_break) {
        (0, _) => Err(IdentifyError::NoCandidateTrioFound),
        (1, _) | (_, TieBreak::First) => Ok(found[0]),
        (_, TieBreak::Reject) => Err(IdentifyError::NoConfidentReduction),
    }
}

/// Assign the catalog trio to the observed trio by the largest overlay. Returns the
/// labels in observed order along with the overlay.
fn assign(
    ctx: &IdentificationContext,
    trio: [usize; 3],
    labels: [Label; 3],
) -> Result<([Label; 3], Identification), IdentifyError> {
    let Some(inertial) = ctx.inertials(&labels) else {
        return Err(IdentifyError::NoCandidateTrioFound);
    };
    let body = [ctx.body(trio[0])?, ctx.body(trio[1])?];
    let candidates = ctx.nearby(&inertial[0]);

    let mut best: Option<([Label; 3], Identification)> = None;
    for perm in PERMUTATIONS_3 {
        let assigned = [inertial[perm[0]], inertial[perm[1]]];
        let (stars, rotation) = ctx.overlay(&body, &assigned, &candidates)?;
        if best.as_ref().is_none_or(|(_, b)| stars.len() > b.stars.len()) {
            best = Some((perm.map(|p| labels[p]), Identification { stars, rotation }));
        }
    }
    best.ok_or(IdentifyError::NoConfidentAlignment)
}

/// Third labels of the catalog trios for `(a, b, e)` that contain both `r_a` and `r_b`.
fn thirds(
    ctx: &IdentificationContext,
    (a, r_a): (usize, Label),
    (b, r_b): (usize, Label),
    e: usize,
    nu: &mut Comparisons,
) -> Result<BTreeSet<Label>, IdentifyError> {
    nu.tick()?;
    Ok(triangle::trios(ctx, KIND, [a, b, e])?
        .into_iter()
        .filter(|t| t.contains(&r_a) && t.contains(&r_b))
        .filter_map(|t| t.into_iter().find(|l| *l != r_a && *l != r_b))
        .collect())
}

fn witnessed(
    ctx: &IdentificationContext,
    [i, j, k]: [usize; 3],
    [r_i, r_j, r_k]: [Label; 3],
    e: usize,
    nu: &mut Comparisons,
) -> Result<bool, IdentifyError> {
    let mut found = thirds(ctx, (i, r_i), (j, r_j), e, nu)?;
    for (a, b) in [((i, r_i), (k, r_k)), ((j, r_j), (k, r_k))] {
        if found.is_empty() {
            return Ok(false);
        }
        let next = thirds(ctx, a, b, e, nu)?;
        found.retain(|l| next.contains(l));
    }
    found.retain(|l| *l != r_i && *l != r_j && *l != r_k);
    if found.len() != 1 {
        return Ok(false);
    }
    let labels: Vec<_> = [r_i, r_j, r_k].into_iter().chain(found).collect();
    Ok(ctx
        .inertials(&labels)
        .is_some_and(|four| Star::all_within_angle(&four, ctx.fov)))
}

/// Labels in observed order and the overlay for a confirmed trio.
fn reduce_trio(
    ctx: &IdentificationContext,
    trio: [usize; 3],
    nu: &mut Comparisons,
) -> Result<([Label; 3], Identification), IdentifyError> {
    let catalog = catalog_trio(ctx, trio, nu)?;
    let (labels, overlay) = assign(ctx, trio, catalog)?;
    trace!("trio {:?} -> {:?}, looking for a witness", trio, labels);
    for e in (0..ctx.image.len()).filter(|e| !trio.contains(e)) {
        if witnessed(ctx, trio, labels, e, nu)? {
            debug!("trio {:?} -> {:?} confirmed by star {}", trio, labels, e);
            return Ok((labels, overlay));
        }
    }
    Err(IdentifyError::NoConfidentReduction)
}

pub fn reduce(ctx: &IdentificationContext, nu: &mut Comparisons) -> Result<Vec<Label>, IdentifyError> {
    if ctx.image.len() < 4 {
        return Err(IdentifyError::NoConfidentReduction);
    }
    for trio in PyramidTrios::new(ctx.image.len()) {
        if let Some((labels, _)) = keep_searching(reduce_trio(ctx, trio, nu))? {
            return Ok(labels.to_vec());
        }
    }
    Err(IdentifyError::NoConfidentReduction)
}

pub fn identify(
    ctx: &IdentificationContext,
    nu: &mut Comparisons,
) -> Result<Identification, IdentifyError> {
    if ctx.image.len() < 4 {
        return Err(IdentifyError::NoConfidentAlignment);
    }
    for trio in PyramidTrios::new(ctx.image.len()) {
        let Some((_, overlay)) = keep_searching(reduce_trio(ctx, trio, nu))? else {
            continue;
        };
        if ctx.is_success(&overlay.stars) {
            return Ok(overlay);
        }
    }
    Err(IdentifyError::NoConfidentAlignment)
}
