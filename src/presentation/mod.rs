//! Presentation layer: askama views for artifacts and the landing page.

pub mod views;
