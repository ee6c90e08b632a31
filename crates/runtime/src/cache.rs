//! Shared script resource cache.
//!
//! Compiled scripts are deduplicated across consumers. The key is the
//! entire source text plus the patch-variable override map; consumers
//! (e.g. engine channels) borrow and release entries, and an entry is
//! destroyed once its last consumer released it. Each key is compiled at
//! most once.

use crate::vm::{PatchOverrides, ScriptVM};
use nkspc::ParsedScript;
use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;

/// Identifies one compiled script in the cache.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ScriptKey {
    /// The script's entire source code.
    pub code: String,
    /// Patch variables overridden by the consumer.
    pub patch_vars: PatchOverrides,
}

/// Opaque consumer handle; the host picks the values (e.g. one per engine
/// channel).
pub type ConsumerId = u64;

struct Entry {
    script: Rc<ParsedScript>,
    consumers: HashSet<ConsumerId>,
}

/// Cache of compiled scripts, keyed by source text and patch overrides.
#[derive(Default)]
pub struct ScriptCache {
    entries: BTreeMap<ScriptKey, Entry>,
}

impl ScriptCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Borrow the compiled form of a script for `consumer`, compiling it
    /// through `vm` on a cache miss.
    pub fn borrow(
        &mut self,
        vm: &mut ScriptVM,
        code: &str,
        patch_vars: &PatchOverrides,
        consumer: ConsumerId,
    ) -> Rc<ParsedScript> {
        let key = ScriptKey {
            code: code.to_string(),
            patch_vars: patch_vars.clone(),
        };
        let entry = self.entries.entry(key).or_insert_with(|| Entry {
            script: vm.load_script(code, patch_vars),
            consumers: HashSet::new(),
        });
        entry.consumers.insert(consumer);
        entry.script.clone()
    }

    /// Look up an entry without registering a consumer.
    pub fn get(&self, code: &str, patch_vars: &PatchOverrides) -> Option<Rc<ParsedScript>> {
        let key = ScriptKey {
            code: code.to_string(),
            patch_vars: patch_vars.clone(),
        };
        self.entries.get(&key).map(|e| e.script.clone())
    }

    /// Release one consumer's reference; drops the entry when nobody uses
    /// it anymore.
    pub fn release(&mut self, code: &str, patch_vars: &PatchOverrides, consumer: ConsumerId) {
        let key = ScriptKey {
            code: code.to_string(),
            patch_vars: patch_vars.clone(),
        };
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.consumers.remove(&consumer);
            if entry.consumers.is_empty() {
                self.entries.remove(&key);
            }
        }
    }

    /// Wildcard lookup: all consumers of the given source text, across all
    /// override maps. Used by tooling to find who uses a script.
    pub fn consumers_of_source(&self, code: &str) -> Vec<ConsumerId> {
        let mut out: Vec<ConsumerId> = self
            .entries
            .iter()
            .filter(|(k, _)| k.code == code)
            .flat_map(|(_, e)| e.consumers.iter().copied())
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = "on init\ndeclare patch $gain := 100\nend on";

    #[test]
    fn test_identical_keys_share_one_compile() {
        let mut vm = ScriptVM::new();
        let mut cache = ScriptCache::new();
        let overrides = PatchOverrides::new();
        let a = cache.borrow(&mut vm, SCRIPT, &overrides, 1);
        let b = cache.borrow(&mut vm, SCRIPT, &overrides, 2);
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(cache.entry_count(), 1);
    }

    #[test]
    fn test_different_overrides_get_distinct_scripts() {
        let mut vm = ScriptVM::new();
        let mut cache = ScriptCache::new();
        let plain = PatchOverrides::new();
        let mut loud = PatchOverrides::new();
        loud.insert("$gain".to_string(), "127".to_string());
        let a = cache.borrow(&mut vm, SCRIPT, &plain, 1);
        let b = cache.borrow(&mut vm, SCRIPT, &loud, 1);
        assert!(!Rc::ptr_eq(&a, &b));
        assert_eq!(cache.entry_count(), 2);
    }

    #[test]
    fn test_entry_dropped_with_last_consumer() {
        let mut vm = ScriptVM::new();
        let mut cache = ScriptCache::new();
        let overrides = PatchOverrides::new();
        cache.borrow(&mut vm, SCRIPT, &overrides, 1);
        cache.borrow(&mut vm, SCRIPT, &overrides, 2);
        cache.release(SCRIPT, &overrides, 1);
        assert_eq!(cache.entry_count(), 1);
        cache.release(SCRIPT, &overrides, 2);
        assert_eq!(cache.entry_count(), 0);
    }

    #[test]
    fn test_wildcard_lookup_spans_override_maps() {
        let mut vm = ScriptVM::new();
        let mut cache = ScriptCache::new();
        let plain = PatchOverrides::new();
        let mut loud = PatchOverrides::new();
        loud.insert("$gain".to_string(), "127".to_string());
        cache.borrow(&mut vm, SCRIPT, &plain, 1);
        cache.borrow(&mut vm, SCRIPT, &loud, 2);
        assert_eq!(cache.consumers_of_source(SCRIPT), vec![1, 2]);
        assert!(cache.consumers_of_source("on init\nend on").is_empty());
    }
}
