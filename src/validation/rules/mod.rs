//! Individual validation rules, one concern per file.
pub(crate) mod params;
pub(crate) mod ports;
