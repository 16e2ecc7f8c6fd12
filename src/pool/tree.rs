//! The engine's admission-control queue tree, parsed out of the
//! `impala_scheduled_allocations` configuration item.
//!
//! The document is kept as a `serde_json::Value` tree rather than a typed
//! struct: queues nest recursively, non-leaf queues carry no schedulable
//! properties, and leaf queues may carry configuration fields this crate
//! never reads (`impalaQueueTimeout`, future additions). Mutating the
//! parsed `Value` in place and re-serialising it preserves every field we
//! don't touch, rather than silently dropping them the way a narrowly
//! typed leaf struct would.

use serde_json::Value;

const ITEMS: &str = "items";
const NAME: &str = "name";
const VALUE: &str = "value";
const QUEUES: &str = "queues";
const SCHEDULABLE_PROPERTIES_LIST: &str = "schedulablePropertiesList";
const IMPALA_MAX_MEMORY: &str = "impalaMaxMemory";
const WEIGHT: &str = "weight";

pub const IMPALA_SCHEDULED_ALLOCATIONS: &str = "impala_scheduled_allocations";
const DOT: char = '.';

/// A single leaf pool's schedulable configuration, resolved from a dotted
/// path into the tree.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig<'a> {
    pub name: &'a str,
    properties: &'a Value,
}

impl<'a> PoolConfig<'a> {
    pub fn max_memory_mb(&self) -> f64 {
        self.properties
            .get(IMPALA_MAX_MEMORY)
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    }

    pub fn weight(&self) -> f64 {
        self.properties
            .get(WEIGHT)
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    }
}

/// The parsed `{queues: [...]}` document backing the engine's
/// `impala_scheduled_allocations` config item.
#[derive(Debug, Clone)]
pub struct ScheduledAllocations {
    document: Value,
}

impl ScheduledAllocations {
    /// Extract and parse `impala_scheduled_allocations` out of a fetched
    /// `{items: [{name, value}, ...]}` engine configuration document.
    pub fn from_engine_config(config: &Value) -> Result<Self, String> {
        let items = config
            .get(ITEMS)
            .and_then(Value::as_array)
            .ok_or_else(|| "engine config missing 'items' array".to_string())?;

        let raw_value = items
            .iter()
            .find(|item| item.get(NAME).and_then(Value::as_str) == Some(IMPALA_SCHEDULED_ALLOCATIONS))
            .and_then(|item| item.get(VALUE))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                format!("engine config missing item '{IMPALA_SCHEDULED_ALLOCATIONS}'")
            })?;

        let document: Value = serde_json::from_str(raw_value)
            .map_err(|e| format!("malformed {IMPALA_SCHEDULED_ALLOCATIONS} json: {e}"))?;

        Ok(Self { document })
    }

    fn queues(&self) -> &[Value] {
        self.document
            .get(QUEUES)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn queues_mut(&mut self) -> Option<&mut Vec<Value>> {
        self.document.get_mut(QUEUES).and_then(Value::as_array_mut)
    }

    /// Depth-first traversal yielding every leaf pool's dotted path.
    pub fn pool_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        collect_pool_names(self.queues(), "", &mut names);
        names
    }

    /// Resolve a dotted path to its leaf `PoolConfig`, or `None` if the path
    /// does not exist or names a non-leaf (container) queue.
    pub fn get_pool(&self, dotted: &str) -> Option<PoolConfig<'_>> {
        find_leaf(self.queues(), dotted).map(|(name, queue)| PoolConfig {
            name,
            properties: &queue[SCHEDULABLE_PROPERTIES_LIST][0],
        })
    }

    /// Mutate the matched leaf's `impalaMaxMemory`. No-op if the path does
    /// not resolve to a leaf.
    pub fn update_pool_memory(&mut self, dotted: &str, mb: f64) {
        if let Some(queue) = self.queues_mut().and_then(|q| find_leaf_mut(q, dotted)) {
            queue[SCHEDULABLE_PROPERTIES_LIST][0][IMPALA_MAX_MEMORY] = Value::from(mb);
        }
    }

    /// Re-encode the mutated queues document, wrapped as the single-item
    /// engine configuration payload the `update_config` API expects.
    pub fn serialise(&self) -> Value {
        let value_string = self.document.to_string();
        serde_json::json!({
            ITEMS: [{ NAME: IMPALA_SCHEDULED_ALLOCATIONS, VALUE: value_string }]
        })
    }
}

fn join_dotted(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}{DOT}{name}")
    }
}

fn collect_pool_names(queues: &[Value], parent: &str, out: &mut Vec<String>) {
    for queue in queues {
        let Some(name) = queue.get(NAME).and_then(Value::as_str) else {
            continue;
        };
        let current = join_dotted(parent, name);
        match queue.get(QUEUES).and_then(Value::as_array) {
            Some(children) if !children.is_empty() => collect_pool_names(children, &current, out),
            _ => out.push(current),
        }
    }
}

/// Walk `dotted` one path segment at a time against `queues`, mirroring the
/// head/remainder split used by the original implementation.
fn find_leaf<'a>(queues: &'a [Value], dotted: &str) -> Option<(&'a str, &'a Value)> {
    let (head, rest) = match dotted.split_once(DOT) {
        Some((h, r)) => (h, r),
        None => (dotted, ""),
    };

    for queue in queues {
        if queue.get(NAME).and_then(Value::as_str) != Some(head) {
            continue;
        }
        return match queue.get(QUEUES).and_then(Value::as_array) {
            Some(children) if !children.is_empty() => find_leaf(children, rest),
            _ if rest.is_empty() => {
                let name = queue.get(NAME).and_then(Value::as_str)?;
                Some((name, queue))
            }
            _ => None,
        };
    }
    None
}

fn find_leaf_mut<'a>(queues: &'a mut Vec<Value>, dotted: &str) -> Option<&'a mut Value> {
    let (head, rest) = match dotted.split_once(DOT) {
        Some((h, r)) => (h, r.to_string()),
        None => (dotted, String::new()),
    };

    for queue in queues.iter_mut() {
        if queue.get(NAME).and_then(Value::as_str) != Some(head) {
            continue;
        }
        let has_children = queue
            .get(QUEUES)
            .and_then(Value::as_array)
            .map(|c| !c.is_empty())
            .unwrap_or(false);
        return if has_children {
            find_leaf_mut(queue[QUEUES].as_array_mut()?, &rest)
        } else if rest.is_empty() {
            Some(queue)
        } else {
            None
        };
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_config() -> Value {
        json!({
            "items": [{
                "name": "impala_scheduled_allocations",
                "value": serde_json::to_string(&json!({
                    "queues": [{
                        "name": "root",
                        "queues": [
                            {
                                "name": "engineering",
                                "queues": [
                                    { "name": "etl", "queues": [], "schedulablePropertiesList": [
                                        { "impalaMaxMemory": 1000.0, "weight": 1.0, "impalaQueueTimeout": 5000 }
                                    ]},
                                ],
                            },
                            { "name": "default", "queues": [], "schedulablePropertiesList": [
                                { "impalaMaxMemory": 2000.0, "weight": 2.0, "impalaQueueTimeout": 5000 }
                            ]},
                        ],
                    }]
                })).unwrap(),
            }]
        })
    }

    #[test]
    fn pool_names_are_dotted_and_depth_first() {
        let allocations = ScheduledAllocations::from_engine_config(&sample_config()).unwrap();
        let mut names = allocations.pool_names();
        names.sort();
        assert_eq!(names, vec!["root.default", "root.engineering.etl"]);
    }

    #[test]
    fn get_pool_on_non_leaf_is_not_found() {
        let allocations = ScheduledAllocations::from_engine_config(&sample_config()).unwrap();
        assert!(allocations.get_pool("root").is_none());
        assert!(allocations.get_pool("root.engineering").is_none());
    }

    #[test]
    fn get_pool_on_unknown_path_is_not_found() {
        let allocations = ScheduledAllocations::from_engine_config(&sample_config()).unwrap();
        assert!(allocations.get_pool("root.nonexistent").is_none());
        assert!(allocations.get_pool("completely.unknown").is_none());
    }

    #[test]
    fn update_then_get_round_trips() {
        let mut allocations = ScheduledAllocations::from_engine_config(&sample_config()).unwrap();
        allocations.update_pool_memory("root.engineering.etl", 1500.0);
        assert_eq!(allocations.get_pool("root.engineering.etl").unwrap().max_memory_mb(), 1500.0);
        assert_eq!(allocations.get_pool("root.default").unwrap().max_memory_mb(), 2000.0);
    }

    #[test]
    fn serialise_then_parse_round_trips() {
        let mut allocations = ScheduledAllocations::from_engine_config(&sample_config()).unwrap();
        allocations.update_pool_memory("root.default", 2500.0);
        let reserialised = allocations.serialise();
        let reparsed = ScheduledAllocations::from_engine_config(&reserialised).unwrap();
        assert_eq!(reparsed.get_pool("root.default").unwrap().max_memory_mb(), 2500.0);
        let mut names = reparsed.pool_names();
        names.sort();
        assert_eq!(names, vec!["root.default", "root.engineering.etl"]);
    }

    #[test]
    fn unmodified_fields_survive_update_and_serialise() {
        let mut allocations = ScheduledAllocations::from_engine_config(&sample_config()).unwrap();
        allocations.update_pool_memory("root.default", 2500.0);
        let reserialised = allocations.serialise();
        let reparsed = ScheduledAllocations::from_engine_config(&reserialised).unwrap();
        assert_eq!(reparsed.get_pool("root.default").unwrap().weight(), 2.0);
    }
}
