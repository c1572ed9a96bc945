// Copyright 2025 Calliope Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A cache for loaded stub definitions.
//!
//! Loading and preparing a service definition (proto descriptors, stub
//! factories) is expensive and its result is immutable, so clients share
//! one load per definition. Entries are keyed by the definition's path
//! plus the canonical JSON form of the load options: loading the same path
//! with the same options returns the same `Arc`, and [clear][StubCache::clear]
//! releases every entry so the next load starts fresh.
//!
//! Client construction normally goes through the process-wide
//! [default_stub_cache]; tests that need isolation create their own
//! [StubCache].

use crate::Result;
use crate::error::Error;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct CacheKey {
    path: String,
    options: String,
}

impl CacheKey {
    fn new<O: serde::Serialize>(path: &str, options: &O) -> Result<Self> {
        // serde_json writes object keys in sorted order, so two options
        // values that compare equal produce the same key string.
        let options = serde_json::to_string(options).map_err(Error::other)?;
        Ok(Self {
            path: path.to_string(),
            options,
        })
    }
}

/// A key-value store of loaded stub definitions.
#[derive(Default)]
pub struct StubCache {
    entries: Mutex<HashMap<CacheKey, Arc<dyn Any + Send + Sync>>>,
}

impl StubCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached value for `path` + `options`, loading it on the
    /// first request.
    ///
    /// Repeated calls with an equal key return clones of the same `Arc`.
    /// The loader runs under the cache lock, so loads for distinct keys
    /// serialize; a failed load caches nothing.
    pub fn get_or_load<T, O, F>(&self, path: &str, options: &O, load: F) -> Result<Arc<T>>
    where
        T: Send + Sync + 'static,
        O: serde::Serialize,
        F: FnOnce() -> Result<T>,
    {
        let key = CacheKey::new(path, options)?;
        let mut entries = self.entries.lock().expect("stub cache poisoned");
        if let Some(value) = entries.get(&key) {
            if let Ok(value) = value.clone().downcast::<T>() {
                return Ok(value);
            }
        }
        let value = Arc::new(load()?);
        entries.insert(key, value.clone());
        Ok(value)
    }

    /// The cached value for `path` + `options`, if any.
    pub fn get<T, O>(&self, path: &str, options: &O) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
        O: serde::Serialize,
    {
        let key = CacheKey::new(path, options).ok()?;
        let entries = self.entries.lock().expect("stub cache poisoned");
        entries.get(&key)?.clone().downcast::<T>().ok()
    }

    /// Releases every cached entry.
    pub fn clear(&self) {
        self.entries.lock().expect("stub cache poisoned").clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("stub cache poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for StubCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StubCache").field("len", &self.len()).finish()
    }
}

/// The process-wide cache used by client construction.
pub fn default_stub_cache() -> &'static StubCache {
    static DEFAULT: LazyLock<StubCache> = LazyLock::new(StubCache::new);
    &DEFAULT
}
