//! Raw star catalog readers: Hipparcos (`hip2.dat`) and the CSV catalog table.

pub mod hipparcos;
pub mod table;
