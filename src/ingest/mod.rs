/// External data sources: elevation rasters, the weather API, and the
/// historical event feed. Each source gets its own file.
pub mod dem;
pub mod events;
pub mod open_meteo;

#[cfg(test)]
pub(crate) mod fixtures;
