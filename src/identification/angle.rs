//! Angle method: identify a pair of stars by their angular separation alone.

use tracing::{debug, trace};

use super::enumerate::Combinations;
use super::{keep_searching, Comparisons, IdentificationContext, Identification, IdentifyError};
use crate::index::Window;
use crate::star::{Label, Star};

/// Every catalog pair whose separation falls in the `3 sigma` window around the
/// separation of observed stars `i` and `j`.
pub fn query(
    ctx: &IdentificationContext,
    i: usize,
    j: usize,
) -> Result<Vec<Vec<Label>>, IdentifyError> {
    let theta = Star::angle_between(&ctx.body(i)?, &ctx.body(j)?);
    let rows = ctx
        .table()?
        .range_query(Window::three_sigma(theta, ctx.parameters.sigma_primary), &[])?;
    Ok(rows.iter().map(|r| r.labels().to_vec()).collect())
}

/// The catalog pair whose separation is closest to `theta`. Ties keep the first row.
fn closest_pair(ctx: &IdentificationContext, theta: f64) -> Result<[Label; 2], IdentifyError> {
    let rows = ctx
        .table()?
        .range_query(Window::three_sigma(theta, ctx.parameters.sigma_primary), &[])?;
    let mut best: Option<(f64, [Label; 2])> = None;
    for row in &rows {
        let d = (row.value(0) - theta).abs();
        if best.is_none_or(|(b, _)| d < b) {
            best = Some((d, [row.labels()[0], row.labels()[1]]));
        }
    }
    trace!("theta {:.9}: {} candidate pairs", theta, rows.len());
    best.map(|(_, labels)| labels)
        .ok_or(IdentifyError::NoCandidatesFound)
}

/// Catalog pair for observed stars `i` and `j`. Pairs wider than the field of view are
/// skipped.
fn reduce_pair(
    ctx: &IdentificationContext,
    i: usize,
    j: usize,
) -> Result<[Label; 2], IdentifyError> {
    let theta = Star::angle_between(&ctx.body(i)?, &ctx.body(j)?);
    if theta > ctx.fov {
        return Err(IdentifyError::NoCandidatePairFound);
    }
    closest_pair(ctx, theta)
}

pub fn reduce(ctx: &IdentificationContext, nu: &mut Comparisons) -> Result<Vec<Label>, IdentifyError> {
    for [i, j] in Combinations::<2>::new(ctx.image.len()) {
        nu.tick()?;
        if let Some(labels) = keep_searching(reduce_pair(ctx, i, j))? {
            return Ok(labels.to_vec());
        }
    }
    Err(IdentifyError::NoConfidentReduction)
}

/// Try both assignments of the catalog pair to the observed pair and keep the one with
/// the larger overlay.
fn align(
    ctx: &IdentificationContext,
    i: usize,
    j: usize,
    labels: [Label; 2],
) -> Result<Identification, IdentifyError> {
    let body = [ctx.body(i)?, ctx.body(j)?];
    let (Some(r0), Some(r1)) = (ctx.inertial(labels[0]), ctx.inertial(labels[1])) else {
        return Err(IdentifyError::NoCandidatePairFound);
    };
    let candidates = ctx.nearby(&r0);

    let mut best: Option<Identification> = None;
    for inertial in [[r0, r1], [r1, r0]] {
        let (stars, rotation) = ctx.overlay(&body, &inertial, &candidates)?;
        if best.as_ref().is_none_or(|b| stars.len() > b.stars.len()) {
            best = Some(Identification { stars, rotation });
        }
    }
    match best {
        Some(found) if ctx.is_success(&found.stars) => Ok(found),
        _ => Err(IdentifyError::NoConfidentAlignment),
    }
}

pub fn identify(
    ctx: &IdentificationContext,
    nu: &mut Comparisons,
) -> Result<Identification, IdentifyError> {
    for [i, j] in Combinations::<2>::new(ctx.image.len()) {
        nu.tick()?;
        let Some(labels) = keep_searching(reduce_pair(ctx, i, j))? else {
            continue;
        };
        debug!("pair ({}, {}) -> {:?}", i, j, labels);
        if let Some(found) = keep_searching(align(ctx, i, j, labels))? {
            return Ok(found);
        }
    }
    Err(IdentifyError::NoConfidentAlignment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identification::fixture::{assert_identified, Scene};
    use crate::identification::Method;

    #[test]
    fn identifies_noise_free_image() {
        let scene = Scene::new(7);
        let params = scene.parameters(Method::Angle);
        let ctx = scene.context(&params);
        let mut nu = Comparisons::new(params.nu_max);
        let found = identify(&ctx, &mut nu).expect("identified");
        assert_identified(&scene, &found);
        assert!(nu.count() >= 1);
    }

    #[test]
    fn query_contains_true_pair() {
        let scene = Scene::new(8);
        let params = scene.parameters(Method::Angle);
        let ctx = scene.context(&params);
        let truth = [scene.truth_label(0), scene.truth_label(1)];
        let hits = query(&ctx, 0, 1).expect("query");
        assert!(hits
            .iter()
            .any(|l| l == &truth || l == &[truth[1], truth[0]]));
    }

    #[test]
    fn reduce_returns_first_pair_labels() {
        let scene = Scene::new(9);
        let params = scene.parameters(Method::Angle);
        let ctx = scene.context(&params);
        let mut nu = Comparisons::new(params.nu_max);
        let mut labels = reduce(&ctx, &mut nu).expect("reduced");
        labels.sort_unstable();
        let mut truth = vec![scene.truth_label(0), scene.truth_label(1)];
        truth.sort_unstable();
        assert_eq!(labels, truth);
    }

    #[test]
    fn tiny_budget_is_reported() {
        let scene = Scene::new(10);
        let params = scene.parameters(Method::Angle);
        let ctx = scene.context(&params);
        let mut nu = Comparisons::new(0);
        assert_eq!(identify(&ctx, &mut nu), Err(IdentifyError::ExceededNuMax));
        assert_eq!(nu.count(), 1);
    }
}
