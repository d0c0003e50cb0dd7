pub mod bathymetry;
pub mod corridor;
pub mod detour;
pub mod water;
