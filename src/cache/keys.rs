//! Cache key derivation.
//!
//! Every key for an entity starts with the entity's prefix followed by `:`,
//! so prefix invalidation of `stack:1:` can never reach `stack:11:...`.

use crate::models::EntityKey;

/// Prefix covering every key that belongs to an entity
pub fn entity_prefix(entity: &EntityKey) -> String {
    format!("{}:", entity.cache_prefix())
}

pub fn stack_key(stack_id: i64) -> String {
    entity_prefix(&EntityKey::Stack(stack_id))
}

pub fn health_key(entity: &EntityKey) -> String {
    format!("{}health", entity_prefix(entity))
}

pub fn host_key(stack_id: i64, hostname: &str) -> String {
    format!("{}host:{}", stack_key(stack_id), hostname)
}

pub fn component_key(entity: &EntityKey, sls_path: &str) -> String {
    format!("{}component:{}", entity_prefix(entity), sls_path)
}
