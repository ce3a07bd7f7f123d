//! Noise-free synthetic scene shared by the method tests.

use rand::rngs::StdRng;
use rand::SeedableRng;

use super::{AsterismCenters, Identification, IdentificationContext, Method, Parameters};
use crate::attitude::{random_rotation, rotate};
use crate::index::{build_store, TableConfig, TableKind, TableStore};
use crate::star::{Label, Star};
use crate::starcatalog::StarCatalog;
use crate::Quaternion;

pub(crate) const CATALOG_SIZE: usize = 20;
pub(crate) const IMAGE_SIZE: usize = 10;
pub(crate) const FOV: f64 = 20.0;

pub(crate) struct Scene {
    pub catalog: StarCatalog,
    pub tables: TableStore,
    pub centers: AsterismCenters,
    /// Observed stars, labels stripped.
    pub image: Vec<Star>,
    /// Catalog label of each observed star.
    pub truth: Vec<Label>,
    pub rotation: Quaternion,
}

impl Scene {
    /// Catalog stars scattered within 8 degrees of a fixed focus, so every pair fits in
    /// the field. The first [`IMAGE_SIZE`] are observed under a random rotation.
    pub fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let focus = Star::from_radec_deg(40.0, 25.0);
        let mut stars = Vec::with_capacity(CATALOG_SIZE);
        while stars.len() < CATALOG_SIZE {
            if let Some(s) = Star::random_near(&focus, 8.0, &mut rng) {
                stars.push(s.with_label(stars.len() as Label + 1));
            }
        }
        let catalog = StarCatalog::new(stars.clone(), 6.0).expect("valid catalog");
        let tables = build_store(
            &catalog,
            &TableConfig {
                fov: FOV,
                ..TableConfig::default()
            },
        )
        .expect("tables build");
        let centers = AsterismCenters::build(
            tables
                .get(TableKind::AsterismCenter.default_name())
                .expect("center table"),
            &mut rng,
        )
        .expect("center tree");

        let rotation = random_rotation(&mut rng);
        let observed = &stars[..IMAGE_SIZE];
        Self {
            image: observed
                .iter()
                .map(|s| rotate(s, &rotation).without_label())
                .collect(),
            truth: observed.iter().filter_map(|s| s.label).collect(),
            catalog,
            tables,
            centers,
            rotation,
        }
    }

    pub fn truth_label(&self, index: usize) -> Label {
        self.truth[index]
    }

    /// Method defaults with sigmas tight enough for noise-free data.
    pub fn parameters(&self, method: Method) -> Parameters {
        Parameters {
            sigma_primary: 1e-9,
            sigma_secondary: 1e-9,
            sigma_tertiary: 1e-9,
            sigma_overlay: 1e-9,
            ..Parameters::for_method(method)
        }
    }

    pub fn context<'a>(&'a self, parameters: &'a Parameters) -> IdentificationContext<'a> {
        IdentificationContext::new(&self.image, FOV, &self.catalog, &self.tables, parameters)
            .with_centers(&self.centers)
    }
}

/// Every identified star carries the label of the catalog star it was generated from,
/// and the rotation matches the one used to generate the image.
pub(crate) fn assert_identified(scene: &Scene, found: &Identification) {
    assert!(!found.stars.is_empty());
    for star in &found.stars {
        let index = scene
            .image
            .iter()
            .position(|s| s == star)
            .expect("identified star comes from the image");
        assert_eq!(star.label, Some(scene.truth[index]));
    }
    assert!(found.rotation.angle_to(&scene.rotation).to_degrees() < 1e-6);
}
