//! Fixtures shared by the unit tests: synthetic PE images and metadata blobs.

pub mod builder;
