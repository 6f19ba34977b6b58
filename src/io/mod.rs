/*!
Helper functions for saving chain output to disk.
*/

#[cfg(feature = "csv")]
pub mod csv;
