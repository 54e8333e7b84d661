pub mod basin;
pub mod config;
pub mod dataset;
pub mod dispatch;
pub mod error;
pub mod geoserver;
pub mod mask;
pub mod netcdf_io;
pub mod transfer;
