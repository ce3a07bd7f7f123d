//! Dot-angle method: two separations from a center star plus the angle between them.

use tracing::debug;

use super::enumerate::Combinations;
use super::{
    keep_searching, Comparisons, IdentificationContext, Identification, IdentifyError, TieBreak,
};
use crate::geometry::trio;
use crate::index::Window;
use crate::star::{Label, Star};

/// Rows matching observed stars `(i, j)` around center `c`, labels in `(i, j, c)` order.
///
/// Empty unless `theta(c, i) <= theta(c, j)`.
fn rows_for(
    ctx: &IdentificationContext,
    i: usize,
    j: usize,
    c: usize,
) -> Result<Vec<[Label; 3]>, IdentifyError> {
    let (bi, bj, bc) = (ctx.body(i)?, ctx.body(j)?, ctx.body(c)?);
    let theta_1 = Star::angle_between(&bc, &bi);
    let theta_2 = Star::angle_between(&bc, &bj);
    if theta_1 > theta_2 {
        return Ok(Vec::new());
    }
    let phi = trio::dot_angle(&bi.uvec(), &bj.uvec(), &bc.uvec());
    let p = ctx.parameters;
    let rows = ctx.table()?.range_query(
        Window::three_sigma(theta_1, p.sigma_primary),
        &[
            (1, Window::three_sigma(theta_2, p.sigma_secondary)),
            (2, Window::three_sigma(phi, p.sigma_tertiary)),
        ],
    )?;
    Ok(rows
        .iter()
        .map(|r| [r.labels()[0], r.labels()[1], r.labels()[2]])
        .collect())
}

/// Candidates for the trio with the last star as center, both orderings of the others.
pub fn query(
    ctx: &IdentificationContext,
    [i, j, c]: [usize; 3],
) -> Result<Vec<Vec<Label>>, IdentifyError> {
    let mut out: Vec<Vec<Label>> = rows_for(ctx, i, j, c)?
        .into_iter()
        .map(|l| l.to_vec())
        .collect();
    out.extend(
        rows_for(ctx, j, i, c)?
            .into_iter()
            .map(|[lj, li, lc]| vec![li, lj, lc]),
    );
    Ok(out)
}

/// Labels for observed `(i, j, c)`, in that order.
fn reduce_trio(
    ctx: &IdentificationContext,
    [i, j, c]: [usize; 3],
) -> Result<[Label; 3], IdentifyError> {
    let mut rows = rows_for(ctx, i, j, c)?;
    let swapped = rows.is_empty();
    if swapped {
        rows = rows_for(ctx, j, i, c)?;
    }
    let first = match (rows.len(), ctx.parameters.tie_break) {
        (0, _) => return Err(IdentifyError::NoCandidatesFound),
        (1, _) | (_, TieBreak::First) => rows[0],
        (_, TieBreak::Reject) => return Err(IdentifyError::NoConfidentReduction),
    };
    Ok(if swapped {
        [first[1], first[0], first[2]]
    } else {
        first
    })
}

pub fn reduce(ctx: &IdentificationContext, nu: &mut Comparisons) -> Result<Vec<Label>, IdentifyError> {
    for trio in Combinations::<3>::new(ctx.image.len()) {
        nu.tick()?;
        if let Some(labels) = keep_searching(reduce_trio(ctx, trio))? {
            return Ok(labels.to_vec());
        }
    }
    Err(IdentifyError::NoConfidentReduction)
}

/// The three stars are labeled directly; no overlay is attempted.
pub fn identify(
    ctx: &IdentificationContext,
    nu: &mut Comparisons,
) -> Result<Identification, IdentifyError> {
    for trio in Combinations::<3>::new(ctx.image.len()) {
        nu.tick()?;
        let Some(labels) = keep_searching(reduce_trio(ctx, trio))? else {
            continue;
        };
        let Some(inertial) = ctx.inertials(&labels) else {
            continue;
        };
        let mut body = Vec::with_capacity(3);
        for (&index, &label) in trio.iter().zip(&labels) {
            body.push(ctx.body(index)?.with_label(label));
        }
        let rotation = ctx.parameters.solver.solve(&body, &inertial)?;
        debug!("trio {:?} -> {:?}", trio, labels);
        return Ok(Identification {
            stars: body,
            rotation,
        });
    }
    Err(IdentifyError::NoConfidentAlignment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identification::fixture::{assert_identified, Scene};
    use crate::identification::{Method, Parameters};

    #[test]
    fn identifies_noise_free_image() {
        let scene = Scene::new(21);
        let params = scene.parameters(Method::DotAngle);
        let ctx = scene.context(&params);
        let mut nu = Comparisons::new(params.nu_max);
        let found = identify(&ctx, &mut nu).expect("identified");
        assert_eq!(found.stars.len(), 3);
        assert_identified(&scene, &found);
    }

    #[test]
    fn query_keeps_observed_order() {
        let scene = Scene::new(22);
        let params = scene.parameters(Method::DotAngle);
        let ctx = scene.context(&params);
        let truth: Vec<_> = (0..3).map(|i| scene.truth_label(i)).collect();
        let hits = query(&ctx, [0, 1, 2]).expect("query");
        assert_eq!(hits, vec![truth]);
    }

    #[test]
    fn wide_windows_follow_tie_break() {
        let scene = Scene::new(23);
        let reject = Parameters {
            sigma_primary: 10.0,
            sigma_secondary: 10.0,
            sigma_tertiary: 180.0,
            tie_break: TieBreak::Reject,
            ..scene.parameters(Method::DotAngle)
        };
        let ctx = scene.context(&reject);
        let mut nu = Comparisons::new(reject.nu_max);
        assert_eq!(
            reduce(&ctx, &mut nu),
            Err(IdentifyError::NoConfidentReduction)
        );

        let first = Parameters {
            tie_break: TieBreak::First,
            ..reject
        };
        let ctx = scene.context(&first);
        let mut nu = Comparisons::new(first.nu_max);
        assert!(reduce(&ctx, &mut nu).is_ok());
    }
}
