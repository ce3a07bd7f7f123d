//! Pyramid method: three pairwise-angle queries pin down a trio, a fourth star confirms
//! it.

use std::collections::BTreeSet;

use tracing::{debug, trace};

use super::enumerate::PyramidTrios;
use super::{keep_searching, Comparisons, IdentificationContext, Identification, IdentifyError};
use crate::index::Window;
use crate::star::{Label, Star};

/// Catalog pairs matching the separation of observed stars `a` and `b`. One comparison.
fn pairs(
    ctx: &IdentificationContext,
    a: usize,
    b: usize,
    nu: &mut Comparisons,
) -> Result<Vec<[Label; 2]>, IdentifyError> {
    nu.tick()?;
    let theta = Star::angle_between(&ctx.body(a)?, &ctx.body(b)?);
    let rows = ctx
        .table()?
        .range_query(Window::three_sigma(theta, ctx.parameters.sigma_primary), &[])?;
    Ok(rows.iter().map(|r| [r.labels()[0], r.labels()[1]]).collect())
}

fn labels_in(pairs: &[[Label; 2]]) -> BTreeSet<Label> {
    pairs.iter().flatten().copied().collect()
}

/// Labels that appear in both pair lists.
fn common(a: &[[Label; 2]], b: &[[Label; 2]]) -> BTreeSet<Label> {
    labels_in(a).intersection(&labels_in(b)).copied().collect()
}

/// Everything paired with `label` in `pairs`.
fn partners(pairs: &[[Label; 2]], label: Label) -> BTreeSet<Label> {
    pairs
        .iter()
        .filter_map(|&[x, y]| match (x == label, y == label) {
            (true, _) => Some(y),
            (_, true) => Some(x),
            _ => None,
        })
        .collect()
}

/// Candidate label sets `(T_i, T_j, T_k)` for the observed trio.
fn candidate_sets(
    ctx: &IdentificationContext,
    [i, j, k]: [usize; 3],
    nu: &mut Comparisons,
) -> Result<[BTreeSet<Label>; 3], IdentifyError> {
    let ij = pairs(ctx, i, j, nu)?;
    let ik = pairs(ctx, i, k, nu)?;
    let jk = pairs(ctx, j, k, nu)?;
    if ij.is_empty() || ik.is_empty() || jk.is_empty() {
        return Err(IdentifyError::NoCandidatesFound);
    }
    let t_i = common(&ij, &ik);
    let t_j: BTreeSet<_> = common(&ij, &jk).difference(&t_i).copied().collect();
    let t_k: BTreeSet<_> = common(&ik, &jk)
        .into_iter()
        .filter(|l| !t_i.contains(l) && !t_j.contains(l))
        .collect();
    Ok([t_i, t_j, t_k])
}

pub fn query(
    ctx: &IdentificationContext,
    trio: [usize; 3],
) -> Result<Vec<Vec<Label>>, IdentifyError> {
    let mut nu = Comparisons::unlimited();
    let [t_i, t_j, t_k] = candidate_sets(ctx, trio, &mut nu)?;
    let mut out = Vec::new();
    for &a in &t_i {
        for &b in &t_j {
            for &c in &t_k {
                out.push(vec![a, b, c]);
            }
        }
    }
    Ok(out)
}

fn single(set: &BTreeSet<Label>) -> Option<Label> {
    match set.len() {
        1 => set.first().copied(),
        _ => None,
    }
}

/// A fourth observed star `e` confirms the trio when exactly one catalog star pairs
/// with all three catalog labels at the observed separations, and the four fit in the
/// field.
fn witnessed(
    ctx: &IdentificationContext,
    trio: [usize; 3],
    labels: [Label; 3],
    e: usize,
    nu: &mut Comparisons,
) -> Result<bool, IdentifyError> {
    let mut found: Option<BTreeSet<Label>> = None;
    for (&body, &label) in trio.iter().zip(&labels) {
        let with_e = partners(&pairs(ctx, body, e, nu)?, label);
        let narrowed: BTreeSet<_> = match found {
            None => with_e,
            Some(prev) => prev.intersection(&with_e).copied().collect(),
        };
        if narrowed.is_empty() {
            return Ok(false);
        }
        found = Some(narrowed);
    }
    let Some(mut found) = found else {
        return Ok(false);
    };
    found.retain(|l| !labels.contains(l));
    let Some(witness) = single(&found) else {
        return Ok(false);
    };

    let mut four = match ctx.inertials(&labels) {
        Some(stars) => stars,
        None => return Ok(false),
    };
    match ctx.inertial(witness) {
        Some(s) => four.push(s),
        None => return Ok(false),
    }
    Ok(Star::all_within_angle(&four, ctx.fov))
}

/// Labels for the observed trio, confirmed by the first witness in index order.
fn reduce_trio(
    ctx: &IdentificationContext,
    trio: [usize; 3],
    nu: &mut Comparisons,
) -> Result<[Label; 3], IdentifyError> {
    let [t_i, t_j, t_k] = candidate_sets(ctx, trio, nu)?;
    if t_i.is_empty() || t_j.is_empty() || t_k.is_empty() {
        return Err(IdentifyError::NoCandidateTrioFound);
    }
    let (Some(r_i), Some(r_j), Some(r_k)) = (single(&t_i), single(&t_j), single(&t_k)) else {
        return Err(IdentifyError::NoConfidentReduction);
    };
    let labels = [r_i, r_j, r_k];
    trace!("trio {:?} -> {:?}, looking for a witness", trio, labels);

    for e in (0..ctx.image.len()).filter(|e| !trio.contains(e)) {
        if witnessed(ctx, trio, labels, e, nu)? {
            debug!("trio {:?} -> {:?} confirmed by star {}", trio, labels, e);
            return Ok(labels);
        }
    }
    Err(IdentifyError::NoConfidentReduction)
}

pub fn reduce(ctx: &IdentificationContext, nu: &mut Comparisons) -> Result<Vec<Label>, IdentifyError> {
    if ctx.image.len() < 4 {
        return Err(IdentifyError::NoConfidentReduction);
    }
    for trio in PyramidTrios::new(ctx.image.len()) {
        if let Some(labels) = keep_searching(reduce_trio(ctx, trio, nu))? {
            return Ok(labels.to_vec());
        }
    }
    Err(IdentifyError::NoConfidentReduction)
}

fn align(
    ctx: &IdentificationContext,
    trio: [usize; 3],
    labels: [Label; 3],
) -> Result<Identification, IdentifyError> {
    let Some(inertial) = ctx.inertials(&labels) else {
        return Err(IdentifyError::NoCandidateTrioFound);
    };
    let body = trio
        .iter()
        .map(|&t| ctx.body(t))
        .collect::<Result<Vec<_>, _>>()?;
    let (stars, rotation) = ctx.overlay(&body, &inertial, &ctx.nearby(&inertial[0]))?;
    if ctx.is_success(&stars) {
        Ok(Identification { stars, rotation })
    } else {
        Err(IdentifyError::NoConfidentAlignment)
    }
}

pub fn identify(
    ctx: &IdentificationContext,
    nu: &mut Comparisons,
) -> Result<Identification, IdentifyError> {
    if ctx.image.len() < 4 {
        return Err(IdentifyError::NoConfidentAlignment);
    }
    for trio in PyramidTrios::new(ctx.image.len()) {
        let Some(labels) = keep_searching(reduce_trio(ctx, trio, nu))? else {
            continue;
        };
        if let Some(found) = keep_searching(align(ctx, trio, labels))? {
            return Ok(found);
        }
    }
    Err(IdentifyError::NoConfidentAlignment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identification::fixture::{assert_identified, Scene};
    use crate::identification::{IdentificationContext, Method};

    #[test]
    fn identifies_noise_free_image() {
        let scene = Scene::new(41);
        let params = scene.parameters(Method::Pyramid);
        let ctx = scene.context(&params);
        let mut nu = Comparisons::new(params.nu_max);
        let found = identify(&ctx, &mut nu).expect("identified");
        assert_identified(&scene, &found);
        // three pair queries plus three per witness
        assert!(nu.count() >= 6);
    }

    #[test]
    fn query_is_the_true_trio() {
        let scene = Scene::new(42);
        let params = scene.parameters(Method::Pyramid);
        let ctx = scene.context(&params);
        let truth: Vec<_> = (0..3).map(|i| scene.truth_label(i)).collect();
        assert_eq!(query(&ctx, [0, 1, 2]).expect("query"), vec![truth]);
    }

    #[test]
    fn needs_four_stars() {
        let scene = Scene::new(43);
        let params = scene.parameters(Method::Pyramid);
        let ctx = scene.context(&params);
        let short = IdentificationContext {
            image: &scene.image[..3],
            ..ctx
        };
        let mut nu = Comparisons::new(params.nu_max);
        assert_eq!(
            identify(&short, &mut nu),
            Err(IdentifyError::NoConfidentAlignment)
        );
    }

    #[test]
    fn set_helpers() {
        let ab = [[1, 2], [3, 4]];
        let ac = [[1, 5], [6, 7]];
        assert_eq!(common(&ab, &ac), BTreeSet::from([1]));
        assert_eq!(partners(&ab, 4), BTreeSet::from([3]));
        assert_eq!(partners(&ac, 9), BTreeSet::new());
    }
}
