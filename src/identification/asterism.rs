//! Asterism method: hash four observed stars, look the code up, then weigh the proposed
//! alignment against the alignments implied by neighbouring asterisms.

use rand::Rng;
use tracing::{debug, trace};

use super::enumerate::Combinations;
use super::{keep_searching, Comparisons, IdentificationContext, Identification, IdentifyError, TieBreak};
use crate::attitude::find_matches;
use crate::geometry::asterism::{self, AsterismHash};
use crate::index::{IndexError, InvariantTable, TableKind, Window};
use crate::star::{Label, Star};
use crate::tree::{KdTree, DEFAULT_WIDTH};
use crate::Quaternion;

// ── Center index ────────────────────────────────────────────────────────────

/// K-d tree over the centers of every hashed asterism.
#[derive(Debug, Clone)]
pub struct AsterismCenters {
    tree: KdTree,
    /// Labels of each asterism in `A, B, C, D` order, indexed by center-table row.
    labels: Vec<[Label; 4]>,
}

impl AsterismCenters {
    /// Build from an asterism center table. The tree's insertion order is shuffled
    /// with `rng`.
    pub fn build<R: Rng + ?Sized>(table: &InvariantTable, rng: &mut R) -> Result<Self, IndexError> {
        if table.kind() != TableKind::AsterismCenter {
            return Err(IndexError::WrongKind {
                table: table.name().to_string(),
                expected: TableKind::AsterismCenter,
                found: table.kind(),
            });
        }
        let mut centers = Vec::with_capacity(table.len());
        let mut labels = Vec::with_capacity(table.len());
        for row in table.rows() {
            let l = row.labels();
            labels.push([l[0], l[1], l[2], l[3]]);
            centers.push(
                Star::new(row.value(0), row.value(1), row.value(2)).with_label(row.index() as Label),
            );
        }
        Ok(Self {
            tree: KdTree::build(&centers, DEFAULT_WIDTH, rng),
            labels,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Asterisms whose center lies within `radius_deg` of `focus`, in center-table order.
    pub fn nearby(&self, focus: &Star, radius_deg: f64) -> Vec<[Label; 4]> {
        let mut rows: Vec<usize> = self
            .tree
            .query(focus, radius_deg, 16)
            .iter()
            .filter_map(|s| s.label.map(|l| l as usize))
            .collect();
        rows.sort_unstable();
        rows.into_iter().filter_map(|r| self.labels.get(r).copied()).collect()
    }
}

/// Neighbouring asterisms from the tree when one is supplied, otherwise by scanning the
/// center table.
fn nearby_asterisms(
    ctx: &IdentificationContext,
    focus: &Star,
) -> Result<Vec<[Label; 4]>, IdentifyError> {
    if let Some(centers) = ctx.centers {
        return Ok(centers.nearby(focus, ctx.fov));
    }
    let table = ctx.tables.get(&ctx.parameters.center_table_name)?;
    Ok(table
        .rows()
        .filter(|r| {
            let c = Star::new(r.value(0), r.value(1), r.value(2));
            Star::angle_between(&c, focus) <= ctx.fov
        })
        .map(|r| {
            let l = r.labels();
            [l[0], l[1], l[2], l[3]]
        })
        .collect())
}

// ── Lookup ──────────────────────────────────────────────────────────────────

fn observed(ctx: &IdentificationContext, quad: [usize; 4]) -> Result<[Star; 4], IdentifyError> {
    Ok([
        ctx.body(quad[0])?,
        ctx.body(quad[1])?,
        ctx.body(quad[2])?,
        ctx.body(quad[3])?,
    ])
}

/// Catalog asterisms whose code matches `hash`, labels in `A, B, C, D` order.
fn matching_rows(
    ctx: &IdentificationContext,
    hash: &AsterismHash,
) -> Result<Vec<[Label; 4]>, IdentifyError> {
    let p = ctx.parameters;
    let [cx, cy, dx, dy] = hash.code;
    let rows = ctx.table()?.range_query(
        Window::three_sigma(cx, p.sigma_primary),
        &[
            (1, Window::three_sigma(cy, p.sigma_secondary)),
            (2, Window::three_sigma(dx, p.sigma_secondary)),
            (3, Window::three_sigma(dy, p.sigma_secondary)),
        ],
    )?;
    Ok(rows
        .iter()
        .map(|r| {
            let l = r.labels();
            [l[0], l[1], l[2], l[3]]
        })
        .collect())
}

/// Put `A, B, C, D` labels back into the order the stars were given in.
fn given_order(hash: &AsterismHash, abcd: [Label; 4]) -> [Label; 4] {
    let mut out = abcd;
    for (t, &position) in hash.order.iter().enumerate() {
        out[position] = abcd[t];
    }
    out
}

/// Every matching catalog asterism, labels in the order of `quad`. A quad that does not
/// hash gives no candidates.
pub fn query(
    ctx: &IdentificationContext,
    quad: [usize; 4],
) -> Result<Vec<Vec<Label>>, IdentifyError> {
    let Some(hash) = asterism::hash(&observed(ctx, quad)?) else {
        return Ok(Vec::new());
    };
    Ok(matching_rows(ctx, &hash)?
        .into_iter()
        .map(|abcd| given_order(&hash, abcd).to_vec())
        .collect())
}

/// The observed stars in `A, B, C, D` order and the one catalog asterism proposed for
/// them.
fn propose(
    ctx: &IdentificationContext,
    quad: [usize; 4],
    nu: &mut Comparisons,
) -> Result<(AsterismHash, [Star; 4], [Label; 4]), IdentifyError> {
    nu.tick()?;
    let stars = observed(ctx, quad)?;
    let Some(hash) = asterism::hash(&stars) else {
        return Err(IdentifyError::NoCandidateSetFound);
    };
    let rows = matching_rows(ctx, &hash)?;
    trace!("quad {:?}: {} matching asterisms", quad, rows.len());
    let abcd = match (rows.len(), ctx.parameters.tie_break) {
        (0, _) => return Err(IdentifyError::NoCandidatesFound),
        (1, _) | (_, TieBreak::First) => rows[0],
        (_, TieBreak::Reject) => return Err(IdentifyError::NoConfidentReduction),
    };
    Ok((hash, hash.arrange(&stars), abcd))
}

pub fn reduce(ctx: &IdentificationContext, nu: &mut Comparisons) -> Result<Vec<Label>, IdentifyError> {
    for quad in Combinations::<4>::new(ctx.image.len()) {
        if let Some((hash, _, abcd)) = keep_searching(propose(ctx, quad, nu))? {
            return Ok(given_order(&hash, abcd).to_vec());
        }
    }
    Err(IdentifyError::NoConfidentReduction)
}

// ── Alignment scoring ───────────────────────────────────────────────────────

/// Image stars split by whether an alignment explains them.
#[derive(Debug, Clone, Default)]
struct Classified {
    matched: Vec<Star>,
    unmatched: Vec<Star>,
    rotation: Option<Quaternion>,
}

fn same(a: &Star, b: &Star) -> bool {
    a == b && a.label == b.label
}

/// Align the observed `A, B` stars with the catalog asterism `abcd` and overlay the
/// catalog around it.
fn classify(
    ctx: &IdentificationContext,
    body: &[Star; 4],
    abcd: &[Label; 4],
) -> Result<Classified, IdentifyError> {
    let Some(inertial) = ctx.inertials(abcd) else {
        return Ok(Classified {
            unmatched: ctx.image.to_vec(),
            ..Classified::default()
        });
    };
    let q = ctx.parameters.solver.solve(&body[..2], &inertial[..2])?;
    let matched = find_matches(
        ctx.image,
        &ctx.nearby(&inertial[0]),
        &q,
        ctx.parameters.sigma_overlay,
    );
    let unmatched = ctx
        .image
        .iter()
        .filter(|s| !matched.iter().any(|m| m == *s))
        .copied()
        .collect();
    Ok(Classified {
        matched,
        unmatched,
        rotation: Some(q),
    })
}

/// Utility of `proposed` measured against `compared`.
fn compare_alignments(ctx: &IdentificationContext, proposed: &Classified, compared: &Classified) -> f64 {
    let p = ctx.parameters;
    let mut score = 0.0;
    for s in &proposed.matched {
        score += if compared.matched.iter().any(|c| same(s, c)) {
            p.u_tp
        } else {
            p.u_fp
        };
    }
    for s in &proposed.unmatched {
        score += if compared.unmatched.iter().any(|c| same(s, c)) {
            p.u_tn
        } else {
            p.u_fn
        };
    }
    score
}

/// Bayes factor of the proposal over every asterism near its center, starting from 1.
fn bayes_factor(
    ctx: &IdentificationContext,
    body: &[Star; 4],
    abcd: &[Label; 4],
    proposed: &Classified,
) -> Result<f64, IdentifyError> {
    let Some(members) = ctx.inertials(abcd) else {
        return Ok(f64::NEG_INFINITY);
    };
    let mut b_f = 1.0;
    for alternative in nearby_asterisms(ctx, &asterism::center(&members))? {
        let compared = classify(ctx, body, &alternative)?;
        b_f += compare_alignments(ctx, proposed, &compared);
    }
    Ok(b_f)
}

pub fn identify(
    ctx: &IdentificationContext,
    nu: &mut Comparisons,
) -> Result<Identification, IdentifyError> {
    if ctx.image.len() < 4 {
        return Err(IdentifyError::NoConfidentAlignment);
    }
    for quad in Combinations::<4>::new(ctx.image.len()) {
        let Some((_, body, abcd)) = keep_searching(propose(ctx, quad, nu))? else {
            continue;
        };
        let proposed = classify(ctx, &body, &abcd)?;
        let Some(rotation) = proposed.rotation else {
            continue;
        };
        if !ctx.is_success(&proposed.matched) {
            continue;
        }
        let b_f = bayes_factor(ctx, &body, &abcd, &proposed)?;
        debug!(
            "quad {:?} -> {:?}: {} matches, Bayes factor {:.3}",
            quad,
            abcd,
            proposed.matched.len(),
            b_f
        );
        if b_f > ctx.parameters.k_accept {
            return Ok(Identification {
                stars: proposed.matched,
                rotation,
            });
        }
    }
    Err(IdentifyError::NoConfidentAlignment)
}
