//! A local photo catalog engine: ingestion, hierarchical tagging,
//! perceptual-hash duplicate detection, and a boolean tag-query compiler.
//!
//! This crate is the core described in the component design; the GUI,
//! slideshow viewer, and export engine are external collaborators that
//! consume these entry points.

pub mod config;
pub mod dater;
pub mod duplicate_engine;
pub mod error;
pub mod hasher;
pub mod query;
pub mod scanner;
pub mod store;
pub mod template;

use std::path::Path;

pub use config::CatalogConfig;
pub use error::{CatalogError, CatalogResult};
pub use store::Store;

/// Creates a fresh catalog at `path`, seeding the default tag tree.
pub async fn create_catalog(path: impl AsRef<Path>) -> CatalogResult<Store> {
    Store::create(path).await
}

/// Opens an existing catalog at `path`.
pub async fn open_catalog(path: impl AsRef<Path>) -> CatalogResult<Store> {
    Store::open(path).await
}

/// Scans `directory` into `store`, per §4.4.
pub async fn scan(
    store: &Store,
    directory: &Path,
    templates: Option<Vec<template::LoadedTemplate>>,
    recursive: bool,
    config: &CatalogConfig,
    on_progress: impl FnMut(usize, usize, &str),
) -> CatalogResult<scanner::ScanReport> {
    scanner::scan(store, directory, templates, recursive, config, on_progress).await
}

/// Parses and executes a boolean tag-query expression against `store`.
pub async fn query(store: &Store, expr: &str) -> CatalogResult<Vec<store::models::Image>> {
    query::query(store, expr).await
}

/// Runs one pass of the background perceptual hasher over every unhashed
/// image, writing fingerprints back via a dedicated store handle.
pub async fn hash_pending(
    catalog_db_path: &Path,
    config: &CatalogConfig,
    on_progress: impl Fn(usize, usize) + Send + Sync + 'static,
) -> CatalogResult<hasher::HashPassReport> {
    hasher::run_hash_pass(catalog_db_path, config, on_progress).await
}

/// Runs duplicate detection over every fully-hashed image and replaces
/// whatever duplicate groups existed before.
pub async fn detect_duplicates(
    store: &Store,
    threshold: u32,
    on_progress: impl FnMut(usize, usize) + Send,
) -> CatalogResult<usize> {
    duplicate_engine::detect_and_store(store, threshold, on_progress).await
}
