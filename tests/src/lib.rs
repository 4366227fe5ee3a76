//! Integration tests, grouped by area: instruction model and host (`core`), patching engine
//! (`patch`) and whole-pipeline scenarios (`e2e`).

#[cfg(test)]
mod core;
#[cfg(test)]
mod e2e;
