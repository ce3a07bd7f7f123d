//! Invariant index tables.
//!
//! Each table maps a geometric invariant computed from 2 to 4 catalog stars to the
//! labels of those stars. Tables are built offline (see [`build`]), sorted on their
//! first value column, and given a [`KVector`] rank side-table so that a closed range on
//! the primary invariant resolves to a contiguous slice of rows. Remaining columns are
//! filtered by a linear pass over that slice.
//!
//! Tables are kept in a named [`TableStore`], which serializes with rkyv.

pub mod build;
pub mod kvector;

pub use build::{build_store, build_table, TableConfig};
pub use kvector::KVector;

use std::collections::BTreeMap;
use std::path::Path;

use rkyv::{Archive, Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::star::Label;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexError {
    /// Rows were added after the last [`InvariantTable::polish`], or it was never called.
    #[error("table {0} has no rank index; polish it before querying")]
    NotReady(String),
    #[error("no table named {0}")]
    MissingTable(String),
    /// Raised by [`TableStore::create`] for a name that is already taken.
    #[error("table {0} already exists")]
    TableAlreadyExists(String),
    #[error("row with {labels} labels and {values} values does not fit table {table}")]
    RowShape {
        table: String,
        labels: usize,
        values: usize,
    },
    #[error("column {column} is out of range for table {table}")]
    NoSuchColumn { table: String, column: usize },
    #[error("table {table} holds {found:?} rows, expected {expected:?}")]
    WrongKind {
        table: String,
        expected: TableKind,
        found: TableKind,
    },
}

// ── Table kinds ─────────────────────────────────────────────────────────────

/// What a table indexes, which fixes its row shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Archive, Serialize, Deserialize)]
pub enum TableKind {
    /// Pairwise angle `theta` in degrees. Also used by the pyramid method.
    Angle,
    /// `theta_1`, `theta_2` (degrees, `theta_1 <= theta_2`) and the dot-angle `phi`.
    /// Labels are `(first, second, center)`.
    DotAngle,
    /// Flat triangle area and polar moment.
    PlanarTriangle,
    /// Spherical triangle area and polar moment.
    SphericalTriangle,
    /// Asterism code `cx, cy, dx, dy`, labels in `A, B, C, D` order.
    AsterismHash,
    /// Unit mean direction `i, j, k` of each hashed asterism.
    AsterismCenter,
}

impl TableKind {
    pub const ALL: [TableKind; 6] = [
        TableKind::Angle,
        TableKind::DotAngle,
        TableKind::PlanarTriangle,
        TableKind::SphericalTriangle,
        TableKind::AsterismHash,
        TableKind::AsterismCenter,
    ];

    /// Labels per row.
    pub fn arity(self) -> usize {
        match self {
            TableKind::Angle => 2,
            TableKind::DotAngle | TableKind::PlanarTriangle | TableKind::SphericalTriangle => 3,
            TableKind::AsterismHash | TableKind::AsterismCenter => 4,
        }
    }

    /// Values per row.
    pub fn width(self) -> usize {
        self.columns().len()
    }

    pub fn columns(self) -> &'static [&'static str] {
        match self {
            TableKind::Angle => &["theta"],
            TableKind::DotAngle => &["theta_1", "theta_2", "phi"],
            TableKind::PlanarTriangle | TableKind::SphericalTriangle => &["area", "moment"],
            TableKind::AsterismHash => &["cx", "cy", "dx", "dy"],
            TableKind::AsterismCenter => &["i", "j", "k"],
        }
    }

    /// Name used when a store is generated with [`build_store`].
    pub fn default_name(self) -> &'static str {
        match self {
            TableKind::Angle => "HOKU_ANGLE",
            TableKind::DotAngle => "HOKU_DOT",
            TableKind::PlanarTriangle => "HOKU_PLANE",
            TableKind::SphericalTriangle => "HOKU_SPHERE",
            TableKind::AsterismHash => "HOKU_HASH",
            TableKind::AsterismCenter => "HOKU_CENTER",
        }
    }
}

// ── Query windows ───────────────────────────────────────────────────────────

/// Closed interval `[value - tolerance, value + tolerance]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    pub value: f64,
    pub tolerance: f64,
}

impl Window {
    pub fn new(value: f64, tolerance: f64) -> Self {
        Self {
            value,
            tolerance: tolerance.abs(),
        }
    }

    /// The `3 sigma` window used by every identification query.
    pub fn three_sigma(value: f64, sigma: f64) -> Self {
        Self::new(value, 3.0 * sigma)
    }

    pub fn lo(&self) -> f64 {
        self.value - self.tolerance
    }

    pub fn hi(&self) -> f64 {
        self.value + self.tolerance
    }

    pub fn contains(&self, x: f64) -> bool {
        x >= self.lo() && x <= self.hi()
    }
}

// ── Invariant table ─────────────────────────────────────────────────────────

/// A columnar table of `(labels, values)` rows.
///
/// Labels are stored flat, `arity` per row. Values are stored column by column so the
/// primary column is a contiguous sorted slice once the table is polished.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct InvariantTable {
    name: String,
    kind: TableKind,
    labels: Vec<Label>,
    columns: Vec<Vec<f64>>,
    k_vector: Option<KVector>,
}

/// Borrowed view of one table row.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    table: &'a InvariantTable,
    index: usize,
}

impl<'a> Row<'a> {
    /// Position of the row in the sorted table.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn labels(&self) -> &'a [Label] {
        let a = self.table.kind.arity();
        &self.table.labels[self.index * a..(self.index + 1) * a]
    }

    pub fn value(&self, column: usize) -> f64 {
        self.table.columns[column][self.index]
    }

    pub fn values(&self) -> Vec<f64> {
        self.table.columns.iter().map(|c| c[self.index]).collect()
    }
}

impl InvariantTable {
    pub fn new(name: &str, kind: TableKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            labels: Vec::new(),
            columns: vec![Vec::new(); kind.width()],
            k_vector: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TableKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.columns[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when the rank index is current and queries are allowed.
    pub fn is_polished(&self) -> bool {
        self.k_vector.is_some()
    }

    /// Append a row. Drops the rank index until the next [`InvariantTable::polish`].
    pub fn push(&mut self, labels: &[Label], values: &[f64]) -> Result<(), IndexError> {
        if labels.len() != self.kind.arity() || values.len() != self.kind.width() {
            return Err(IndexError::RowShape {
                table: self.name.clone(),
                labels: labels.len(),
                values: values.len(),
            });
        }
        self.labels.extend_from_slice(labels);
        for (column, v) in self.columns.iter_mut().zip(values) {
            column.push(*v);
        }
        self.k_vector = None;
        Ok(())
    }

    pub fn row(&self, index: usize) -> Option<Row<'_>> {
        (index < self.len()).then_some(Row { table: self, index })
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        (0..self.len()).map(move |index| Row { table: self, index })
    }

    /// Sort rows by primary value (ties by labels) and rebuild the rank index.
    pub fn polish(&mut self) {
        let arity = self.kind.arity();
        let mut order = (0..self.len()).collect::<Vec<_>>();
        {
            let primary = &self.columns[0];
            let labels = &self.labels;
            order.sort_by(|&a, &b| {
                primary[a].total_cmp(&primary[b]).then_with(|| {
                    labels[a * arity..(a + 1) * arity].cmp(&labels[b * arity..(b + 1) * arity])
                })
            });
        }

        self.labels = order
            .iter()
            .flat_map(|&r| self.labels[r * arity..(r + 1) * arity].iter().copied())
            .collect();
        for column in self.columns.iter_mut() {
            *column = order.iter().map(|&r| column[r]).collect();
        }
        self.k_vector = Some(KVector::build(&self.columns[0]));
    }

    /// Rows whose primary value lies in `primary` and whose value in each filter column
    /// lies in the paired window. An empty result is not an error.
    pub fn range_query(
        &self,
        primary: Window,
        filters: &[(usize, Window)],
    ) -> Result<Vec<Row<'_>>, IndexError> {
        let k_vector = self
            .k_vector
            .as_ref()
            .ok_or_else(|| IndexError::NotReady(self.name.clone()))?;
        if let Some(&(column, _)) = filters.iter().find(|(c, _)| *c >= self.kind.width()) {
            return Err(IndexError::NoSuchColumn {
                table: self.name.clone(),
                column,
            });
        }

        let range = k_vector.range(&self.columns[0], primary.lo(), primary.hi());
        Ok(range
            .map(|index| Row { table: self, index })
            .filter(|row| filters.iter().all(|(c, w)| w.contains(row.value(*c))))
            .collect())
    }
}

// ── Table store ─────────────────────────────────────────────────────────────

/// Named registry of invariant tables.
#[derive(Debug, Clone, Default, PartialEq, Archive, Serialize, Deserialize)]
pub struct TableStore {
    tables: BTreeMap<String, InvariantTable>,
}

impl TableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `table` under its own name.
    pub fn create(&mut self, table: InvariantTable) -> Result<(), IndexError> {
        if self.tables.contains_key(table.name()) {
            return Err(IndexError::TableAlreadyExists(table.name().to_string()));
        }
        self.tables.insert(table.name().to_string(), table);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&InvariantTable, IndexError> {
        self.tables
            .get(name)
            .ok_or_else(|| IndexError::MissingTable(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

// ── Serialization ───────────────────────────────────────────────────────────

impl TableStore {
    /// Serialize the store to bytes using rkyv.
    pub fn to_rkyv_bytes(&self) -> anyhow::Result<Vec<u8>> {
        let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map_err(|e| anyhow::anyhow!("rkyv serialization failed: {}", e))?;
        Ok(bytes.to_vec())
    }

    /// Save the store to a file using rkyv.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let bytes = self.to_rkyv_bytes()?;
        std::fs::write(path.as_ref(), &bytes)?;
        info!(
            "Saved {} tables to {} ({} bytes)",
            self.len(),
            path.as_ref().display(),
            bytes.len()
        );
        Ok(())
    }

    /// Load a store from an rkyv file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        let store = rkyv::from_bytes::<Self, rkyv::rancor::Error>(&bytes)
            .map_err(|e| anyhow::anyhow!("rkyv deserialization failed: {}", e))?;
        info!(
            "Loaded {} tables from {}: {:?}",
            store.len(),
            path.as_ref().display(),
            store.names().collect::<Vec<_>>()
        );
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn angle_table() -> InvariantTable {
        let mut t = InvariantTable::new("T", TableKind::Angle);
        t.push(&[1, 2], &[3.0]).expect("row fits");
        t.push(&[1, 3], &[1.0]).expect("row fits");
        t.push(&[2, 3], &[2.0]).expect("row fits");
        t.push(&[0, 4], &[2.0]).expect("row fits");
        t.polish();
        t
    }

    #[test]
    fn polish_sorts_by_value_then_labels() {
        let t = angle_table();
        let rows: Vec<_> = t.rows().map(|r| (r.labels().to_vec(), r.value(0))).collect();
        assert_eq!(
            rows,
            vec![
                (vec![1, 3], 1.0),
                (vec![0, 4], 2.0),
                (vec![2, 3], 2.0),
                (vec![1, 2], 3.0)
            ]
        );
    }

    #[test]
    fn push_invalidates_index() {
        let mut t = angle_table();
        assert!(t.range_query(Window::new(2.0, 0.0), &[]).is_ok());
        t.push(&[5, 6], &[4.0]).expect("row fits");
        assert_eq!(
            t.range_query(Window::new(2.0, 0.0), &[]).map(|r| r.len()),
            Err(IndexError::NotReady("T".into()))
        );
        t.polish();
        assert_eq!(t.range_query(Window::new(4.0, 0.0), &[]).map(|r| r.len()), Ok(1));
    }

    #[test]
    fn wrong_row_shape_is_rejected() {
        let mut t = InvariantTable::new("T", TableKind::PlanarTriangle);
        assert!(matches!(
            t.push(&[1, 2], &[0.1, 0.2]),
            Err(IndexError::RowShape { .. })
        ));
    }

    #[test]
    fn secondary_filter() {
        let mut t = InvariantTable::new("tri", TableKind::PlanarTriangle);
        t.push(&[1, 2, 3], &[0.5, 0.10]).expect("row fits");
        t.push(&[1, 2, 4], &[0.5, 0.20]).expect("row fits");
        t.push(&[2, 3, 4], &[0.7, 0.10]).expect("row fits");
        t.polish();
        let rows = t
            .range_query(Window::new(0.5, 1e-9), &[(1, Window::new(0.2, 1e-9))])
            .expect("polished");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].labels(), &[1, 2, 4]);
        assert!(matches!(
            t.range_query(Window::new(0.5, 0.0), &[(2, Window::new(0.0, 1.0))]),
            Err(IndexError::NoSuchColumn { .. })
        ));
    }

    #[test]
    fn store_names_are_unique() {
        let mut store = TableStore::new();
        store.create(angle_table()).expect("first insert");
        assert_eq!(
            store.create(angle_table()),
            Err(IndexError::TableAlreadyExists("T".into()))
        );
        assert!(store.get("T").is_ok());
        assert_eq!(store.get("U").err(), Some(IndexError::MissingTable("U".into())));
    }

    #[test]
    fn store_round_trips_through_file() {
        let mut store = TableStore::new();
        store.create(angle_table()).expect("first insert");
        let path = std::env::temp_dir().join(format!("hoku-store-{}.rkyv", std::process::id()));
        store.save_to_file(&path).expect("save");
        let loaded = TableStore::load_from_file(&path).expect("load");
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, store);
        let rows = loaded
            .get("T")
            .and_then(|t| t.range_query(Window::new(1.0, 0.0), &[]).map(|r| r.len()));
        assert_eq!(rows, Ok(1));
    }
}
