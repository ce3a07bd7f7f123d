//! Integration tests: build invariant tables from synthetic catalogs, generate body-frame
//! images from known rotations, and check that every method recovers labels and
//! attitude.

mod test_data;

use std::collections::BTreeSet;

use hoku::attitude::{random_rotation, rotate};
use hoku::benchmark::Image;
use hoku::index::build::build_angle_table;
use hoku::{
    build_store, AsterismCenters, Comparisons, IdentificationContext, IdentifyError, KdTree,
    Method, NearbyStars, Parameters, QuadTree, Star, StarCatalog, TableConfig, TableKind,
    TableStore, TieBreak, Window,
};
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};
use test_data::{all_sky_stars, cluster_catalog, clustered_stars, five_star_catalog};

const FOV: f64 = 20.0;

fn tables_for(catalog: &StarCatalog) -> TableStore {
    build_store(
        catalog,
        &TableConfig {
            fov: FOV,
            ..TableConfig::default()
        },
    )
    .expect("tables build")
}

fn centers_for(tables: &TableStore) -> AsterismCenters {
    let mut rng = StdRng::seed_from_u64(99);
    AsterismCenters::build(
        tables
            .get(TableKind::AsterismCenter.default_name())
            .expect("center table"),
        &mut rng,
    )
    .expect("center tree")
}

/// Method defaults with tolerances suited to noise-free images.
fn noise_free(method: Method) -> Parameters {
    Parameters {
        sigma_primary: 1e-9,
        sigma_secondary: 1e-9,
        sigma_tertiary: 1e-9,
        sigma_overlay: 1e-9,
        ..Parameters::for_method(method)
    }
}

// ── Index ───────────────────────────────────────────────────────────────────

#[test]
fn test_five_star_angle_table() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();

    let catalog = five_star_catalog();
    let table = build_angle_table("FIVE", &catalog.all_bright(), &TableConfig::default())
        .expect("table builds");
    assert_eq!(table.len(), 10);

    let values: Vec<f64> = table.rows().map(|r| r.value(0)).collect();
    assert!(values.iter().all(|v| *v > 0.0));
    assert!(values.windows(2).all(|w| w[0] <= w[1]));

    let theta = Star::angle_between(&catalog.query_by_label(1), &catalog.query_by_label(2));
    let hits: Vec<Vec<u32>> = table
        .range_query(Window::new(theta, 1e-9), &[])
        .expect("polished")
        .iter()
        .map(|r| r.labels().to_vec())
        .collect();
    assert_eq!(hits, vec![vec![1, 2]]);

    let miss = table
        .range_query(Window::new(theta + 5.0, 1e-9), &[])
        .expect("polished");
    assert!(miss.is_empty());
}

#[test]
fn test_zero_tolerance_round_trip() {
    let catalog = cluster_catalog(1, 25);
    let table = build_angle_table("A", &catalog.all_bright(), &TableConfig::default())
        .expect("table builds");
    let stars = catalog.stars();
    for (i, a) in stars.iter().enumerate() {
        for b in &stars[i + 1..] {
            let theta = Star::angle_between(a, b);
            if theta >= FOV {
                continue;
            }
            let (la, lb) = (a.label.expect("labeled"), b.label.expect("labeled"));
            let hits = table
                .range_query(Window::new(theta, 0.0), &[])
                .expect("polished");
            assert!(
                hits.iter()
                    .any(|r| r.labels() == [la, lb] || r.labels() == [lb, la]),
                "pair ({la}, {lb}) not found at theta {theta}"
            );
        }
    }
}

#[test]
fn test_tolerance_monotonicity() {
    let catalog = cluster_catalog(2, 25);
    let table = build_angle_table("A", &catalog.all_bright(), &TableConfig::default())
        .expect("table builds");
    let mut rng = StdRng::seed_from_u64(20);
    for _ in 0..50 {
        let value = rng.random::<f64>() * 16.0;
        let mut previous: BTreeSet<usize> = BTreeSet::new();
        for tolerance in [0.0, 1e-6, 1e-3, 0.01, 0.1, 0.5, 2.0, 20.0] {
            let rows: BTreeSet<usize> = table
                .range_query(Window::new(value, tolerance), &[])
                .expect("polished")
                .iter()
                .map(|r| r.index())
                .collect();
            assert!(previous.is_subset(&rows), "window {value} +/- {tolerance} shrank");
            previous = rows;
        }
        assert_eq!(previous.len(), table.len());
    }
}

#[test]
fn test_table_rebuild_is_byte_identical() {
    let catalog = cluster_catalog(3, 15);
    let first = tables_for(&catalog).to_rkyv_bytes().expect("serializes");
    let second = tables_for(&catalog).to_rkyv_bytes().expect("serializes");
    assert_eq!(first, second);
}

#[test]
fn test_store_survives_save_and_load() {
    let catalog = cluster_catalog(4, 12);
    let tables = tables_for(&catalog);
    let path = std::env::temp_dir().join(format!("hoku-integration-{}.rkyv", std::process::id()));
    tables.save_to_file(&path).expect("save");
    let loaded = TableStore::load_from_file(&path).expect("load");
    std::fs::remove_file(&path).ok();
    assert_eq!(loaded, tables);
    for kind in TableKind::ALL {
        assert!(loaded.contains(kind.default_name()), "{kind:?}");
    }
}

// ── Spatial trees ───────────────────────────────────────────────────────────

fn labels_of(stars: &[Star]) -> BTreeSet<u32> {
    stars.iter().filter_map(|s| s.label).collect()
}

#[test]
fn test_trees_agree_with_linear_scan() {
    let catalog = StarCatalog::new(all_sky_stars(5, 3000), 6.0).expect("valid catalog");
    let mut rng = StdRng::seed_from_u64(50);
    let quad = QuadTree::build(catalog.stars(), hoku::tree::DEFAULT_WIDTH);
    let kd = KdTree::build(catalog.stars(), hoku::tree::DEFAULT_WIDTH, &mut rng);

    for _ in 0..50 {
        let focus = Star::random(&mut rng);
        let radius = 0.5 + rng.random::<f64>() * 30.0;
        let scan = labels_of(&catalog.nearby(&focus, radius, 0));
        assert_eq!(labels_of(&quad.nearby_stars(&focus, radius, 0)), scan);
        assert_eq!(labels_of(&kd.nearby_stars(&focus, radius, 0)), scan);
    }

    // caps over both poles and across the 180 degree meridian
    for focus in [
        Star::new(0.0, 0.0, 1.0),
        Star::new(0.0, 0.0, -1.0),
        Star::from_radec_deg(180.0, 10.0),
        Star::from_radec_deg(359.5, -60.0),
    ] {
        let scan = labels_of(&catalog.nearby(&focus, 12.0, 0));
        assert_eq!(labels_of(&quad.query(&focus, 12.0, 0)), scan);
        assert_eq!(labels_of(&kd.query(&focus, 12.0, 0)), scan);
    }
}

// ── Identification ──────────────────────────────────────────────────────────

struct Field {
    catalog: StarCatalog,
    tables: TableStore,
    centers: AsterismCenters,
    image: Image,
}

fn field(seed: u64) -> Field {
    let catalog = cluster_catalog(seed, 20);
    let tables = tables_for(&catalog);
    let centers = centers_for(&tables);
    let mut rng = StdRng::seed_from_u64(seed + 1000);
    let rotation = random_rotation(&mut rng);
    let image = Image::generate(
        &catalog,
        &Star::from_radec_deg(40.0, 25.0),
        FOV,
        rotation,
        &mut rng,
    );
    Field {
        catalog,
        tables,
        centers,
        image,
    }
}

#[test]
fn test_every_method_identifies_noise_free_image() {
    let _ = tracing_subscriber::fmt().with_env_filter("warn").try_init();

    for (seed, method) in Method::ALL.into_iter().enumerate() {
        let f = field(100 + seed as u64);
        let image = f.image.present();
        let params = noise_free(method);
        let ctx = IdentificationContext::new(&image, FOV, &f.catalog, &f.tables, &params)
            .with_centers(&f.centers);

        let outcome = method.run(&ctx);
        let found = outcome
            .result
            .as_ref()
            .unwrap_or_else(|e| panic!("{method:?} failed: {e}"));
        assert!(outcome.nu >= 1);
        assert!(outcome.elapsed_ms >= 0.0);
        assert_eq!(outcome.result_size(), found.stars.len());

        // labels are attached to the observed vectors, and all of them are right
        assert!(found.stars.len() >= 3, "{method:?}");
        assert_eq!(f.image.count_correct(&found.stars), found.stars.len(), "{method:?}");

        // the solved rotation puts a matched catalog star back on its observed vector
        let truth = f.image.rotation();
        let label = found.stars[0].label.expect("identified");
        let a = f.catalog.query_by_label(label);
        let err = Star::angle_between(&rotate(&a, truth), &rotate(&a, &found.rotation));
        assert!(err < 1e-6, "{method:?}: rotation off by {err} deg");
    }
}

#[test]
fn test_tree_neighbors_give_the_same_identification() {
    let f = field(7);
    let image = f.image.present();
    let params = noise_free(Method::Pyramid);
    let quad = QuadTree::build(f.catalog.stars(), hoku::tree::DEFAULT_WIDTH);

    let scan = IdentificationContext::new(&image, FOV, &f.catalog, &f.tables, &params);
    let tree = scan.with_neighbors(&quad);
    let a = Method::Pyramid.run(&scan).result.expect("scan identifies");
    let b = Method::Pyramid.run(&tree).result.expect("tree identifies");
    assert_eq!(labels_of(&a.stars), labels_of(&b.stars));
    assert_eq!(a.stars.len(), b.stars.len());
}

#[test]
fn test_pyramid_with_extra_light() {
    let mut f = field(8);
    let mut rng = StdRng::seed_from_u64(80);
    f.image.add_extra_light(3, &mut rng);
    let image = f.image.present();
    let params = noise_free(Method::Pyramid);
    let ctx = IdentificationContext::new(&image, FOV, &f.catalog, &f.tables, &params);
    let found = Method::Pyramid.run(&ctx).result.expect("identified");
    assert_eq!(f.image.count_correct(&found.stars), found.stars.len());
    assert!(found.stars.iter().all(|s| s.label.is_some()));
}

#[test]
fn test_budget_is_respected_without_leakage() {
    let f = field(9);
    // directions that belong to no catalog star, so no method can finish early
    let decoys = clustered_stars(900, 10, &Star::from_radec_deg(200.0, -40.0), 5.0)
        .into_iter()
        .map(|s| s.without_label())
        .collect::<Vec<_>>();
    let limit = 5;

    for method in Method::ALL {
        let params = Parameters {
            nu_max: limit,
            ..noise_free(method)
        };
        let ctx = IdentificationContext::new(&decoys, FOV, &f.catalog, &f.tables, &params)
            .with_centers(&f.centers);

        let mut nu = Comparisons::new(params.nu_max);
        let first = method.identify(&ctx, &mut nu);
        assert_eq!(first, Err(IdentifyError::ExceededNuMax), "{method:?}");
        assert!(nu.count() > limit);
        let spent = nu.count();

        nu.reset();
        let second = method.identify(&ctx, &mut nu);
        assert_eq!(second, first, "{method:?}");
        assert_eq!(nu.count(), spent, "{method:?}");

        let outcome = method.run(&ctx);
        assert!(outcome.error().is_some_and(|e| e.is_budget_exceeded()));
        assert_eq!(outcome.nu, spent);
    }
}

#[test]
fn test_exhausted_search_is_not_a_budget_stop() {
    let f = field(10);
    let decoys = clustered_stars(901, 6, &Star::from_radec_deg(200.0, -40.0), 5.0)
        .into_iter()
        .map(|s| s.without_label())
        .collect::<Vec<_>>();
    let params = noise_free(Method::Angle);
    let ctx = IdentificationContext::new(&decoys, FOV, &f.catalog, &f.tables, &params);
    let outcome = Method::Angle.run(&ctx);
    let err = outcome.error().expect("decoys are not identified");
    assert!(err.is_search_empty());
    assert!(!err.is_budget_exceeded());
    assert_eq!(outcome.nu, 15);
}

#[test]
fn test_pivot_separates_trios_sharing_two_labels() {
    // A and B lie on the 10 degree meridian and D is the mirror image of C across it, so
    // the catalog trios {A, B, C} and {A, B, D} are congruent under any tolerance. Only a
    // pivot that replaces A or B can tell them apart.
    let stars: Vec<Star> = [
        (10.0, 8.0),
        (10.0, 12.0),
        (12.0, 10.5),
        (8.0, 10.5),
        (11.0, 14.0),
        (12.5, 7.0),
    ]
    .iter()
    .enumerate()
    .map(|(i, &(ra, dec))| Star::from_radec_deg(ra, dec).with_label(i as u32 + 1))
    .collect();
    let catalog = StarCatalog::new(stars.clone(), 6.0).expect("valid catalog");
    let tables = tables_for(&catalog);

    let mut rng = StdRng::seed_from_u64(11);
    let q = random_rotation(&mut rng);
    // A, B, C, E, G observed; D is absent
    let image: Vec<Star> = [0, 1, 2, 4, 5]
        .iter()
        .map(|&i| rotate(&stars[i], &q).without_label())
        .collect();

    for method in [Method::PlanarTriangle, Method::SphericalTriangle] {
        let base = noise_free(method);
        let ctx = IdentificationContext::new(&image, FOV, &catalog, &tables, &base);
        let mut hits = method.query(&ctx, &[0, 1, 2]).expect("query runs");
        hits.sort();
        assert_eq!(hits, vec![vec![1, 2, 3], vec![1, 2, 4]], "{method:?}");

        for tie_break in [TieBreak::First, TieBreak::Reject] {
            let params = Parameters {
                tie_break,
                ..base.clone()
            };
            let ctx = IdentificationContext::new(&image, FOV, &catalog, &tables, &params);
            let mut nu = Comparisons::new(params.nu_max);
            let labels = method.reduce(&ctx, &mut nu).expect("reduced");
            assert_eq!(labels, vec![1, 2, 3], "{method:?} {tie_break:?}");
            // one query for the trio plus at most three per pivot star
            assert!(
                nu.count() <= 1 + 3 * (image.len() - 3),
                "{method:?} spent {}",
                nu.count()
            );
        }
    }
}

#[test]
fn test_query_is_exposed_per_method() {
    let f = field(12);
    let image = f.image.oracle().to_vec();
    let bodies: Vec<Star> = image.iter().map(|s| s.without_label()).collect();
    for method in Method::ALL {
        let params = noise_free(method);
        let ctx = IdentificationContext::new(&bodies, FOV, &f.catalog, &f.tables, &params)
            .with_centers(&f.centers);
        let subset: Vec<usize> = (0..method.subset_size()).collect();
        let hits = method.query(&ctx, &subset).expect("query runs");
        let truth: BTreeSet<u32> = subset.iter().filter_map(|&i| image[i].label).collect();
        // a quad outside the hash's well-formed region legitimately has no candidates
        if method == Method::Asterism && hits.is_empty() {
            continue;
        }
        assert!(
            hits.iter()
                .any(|h| h.iter().copied().collect::<BTreeSet<_>>() == truth),
            "{method:?}"
        );

        assert_eq!(
            method.query(&ctx, &[0]),
            Err(IdentifyError::InvalidSubset {
                expected: method.subset_size(),
                found: 1
            })
        );
    }
}

// ── Real catalog ────────────────────────────────────────────────────────────

#[test]
#[ignore = "needs data/hip2.dat"]
fn test_hipparcos_pyramid() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();

    let catalog = StarCatalog::from_hipparcos_file(test_data::HIPPARCOS_PATH, 4.5, Some(2025.0))
        .expect("catalog loads");
    let tables = build_store(
        &catalog,
        &TableConfig {
            fov: 15.0,
            ..TableConfig::default()
        },
    )
    .expect("tables build");

    let mut rng = StdRng::seed_from_u64(2025);
    let focus = Star::from_radec_deg(83.0, -1.0);
    let image = Image::generate(&catalog, &focus, 15.0, random_rotation(&mut rng), &mut rng);
    let bodies = image.present();
    let params = Parameters {
        sigma_primary: 1e-9,
        sigma_overlay: 1e-9,
        ..Parameters::for_method(Method::Pyramid)
    };
    let ctx = IdentificationContext::new(&bodies, 15.0, &catalog, &tables, &params);
    let outcome = Method::Pyramid.run(&ctx);
    let found = outcome.result.expect("identified");
    println!(
        "Identified {} of {} stars in {:.1} ms (nu = {})",
        found.stars.len(),
        bodies.len(),
        outcome.elapsed_ms,
        outcome.nu
    );
    assert_eq!(image.count_correct(&found.stars), found.stars.len());
}
