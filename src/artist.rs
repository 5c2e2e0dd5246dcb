//! Artist parent entity referenced by album handles.

use std::sync::Arc;

use crate::db_manager::sort_name;

/// Immutable artist value shared between albums via `Arc`.
#[derive(Debug)]
pub struct Artist {
    name: String,
    sort_name: String,
}

impl Artist {
    /// Creates a shared artist handle with a derived sort name.
    pub fn named(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            sort_name: sort_name(name),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sort_name(&self) -> &str {
        &self.sort_name
    }
}
