//! Local and remote uniqueness checks.
//!
//! Both run after the structural pass, and only when it produced no errors.
//! Local checks compare the validated elements of one `objects` field; remote
//! checks ask an [`ObjectExistence`] collaborator whether a matching record
//! already exists.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::enums::{ErrorLevel, RuleType};
use crate::error::BackendError;
use crate::path::DataPath;
use crate::primitives::{canonical_macro_or_self, is_blank, parse_id, scalar_text};
use crate::report::ErrorSink;
use crate::resolve::FieldValueCache;
use crate::types::*;

/// Existence lookup used by `api_uniq` checks.
///
/// Returns the ids of the records matching `query`. The caller drops
/// `query.exclude_id` from the result, so implementations may ignore it.
pub trait ObjectExistence: Send + Sync {
    fn find(&self, query: &ExistenceQuery) -> Result<Vec<String>, BackendError>;
}

impl<F> ObjectExistence for F
where
    F: Fn(&ExistenceQuery) -> Result<Vec<String>, BackendError> + Send + Sync,
{
    fn find(&self, query: &ExistenceQuery) -> Result<Vec<String>, BackendError> {
        self(query)
    }
}

/// One remote lookup with every template substituted.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExistenceQuery {
    /// Resource part of the method, e.g. `host` for `host.get`.
    pub resource: String,
    pub method: String,
    pub filter: Map<String, Value>,
    pub params: Map<String, Value>,
    pub exclude_id: Option<String>,
}

/// Error that aborts the whole call.
#[derive(Debug)]
pub(crate) struct Fatal {
    pub(crate) path: DataPath,
    pub(crate) message: String,
}

// ─── Local ──────────────────────────────────────────────────────────────────

/// Validated elements of one `objects` field awaiting its `uniq` constraints.
pub(crate) struct LocalUniqCheck<'a> {
    pub(crate) row: &'a Rule,
    pub(crate) rule: &'a ObjectsRule,
    pub(crate) path: DataPath,
    pub(crate) elements: Vec<(String, Value)>,
}

/// Reports the first duplicate found, if any.
pub(crate) fn check_local(check: &LocalUniqCheck<'_>, sink: &mut ErrorSink) {
    for keys in &check.rule.uniq {
        let macro_keys: Vec<bool> = keys
            .iter()
            .map(|key| {
                check
                    .rule
                    .fields
                    .iter()
                    .find(|field| &field.name == key)
                    .is_some_and(|field| field.rules.iter().any(Rule::allows_macro))
            })
            .collect();

        let mut seen: Vec<Vec<Option<Value>>> = Vec::with_capacity(check.elements.len());
        for (index, element) in &check.elements {
            let projection: Vec<Option<Value>> = keys
                .iter()
                .zip(&macro_keys)
                .map(|(key, is_macro)| {
                    element.get(key).map(|value| match value {
                        Value::String(s) if *is_macro => Value::String(canonical_macro_or_self(s)),
                        other => other.clone(),
                    })
                })
                .collect();

            if seen.contains(&projection) {
                let Some(first_key) = keys.first() else {
                    continue;
                };
                let entry = keys
                    .iter()
                    .filter_map(|key| {
                        let value = element.get(key)?;
                        Some(format!("{}={}", key, scalar_text(value).unwrap_or_else(|| value.to_string())))
                    })
                    .collect::<Vec<_>>()
                    .join(", ");

                sink.add(
                    &check.path.key(index).field(first_key),
                    check
                        .row
                        .message("uniq", format!("Entry \"{}\" is not unique.", entry)),
                    ErrorLevel::LocalUniq,
                );
                return;
            }
            seen.push(projection);
        }
    }
}

// ─── Remote ─────────────────────────────────────────────────────────────────

/// An `api_uniq` descriptor bound to the object it was declared on.
pub(crate) struct RemoteUniqCheck<'a> {
    pub(crate) check: &'a ApiUniqCheck,
    pub(crate) path: DataPath,
}

/// Runs one remote check. A duplicate is added to `sink`; a backend failure or
/// a missing collaborator is returned as [`Fatal`].
pub(crate) fn check_remote(
    remote: &RemoteUniqCheck<'_>,
    cache: &FieldValueCache,
    existence: Option<&dyn ObjectExistence>,
    max_id: u64,
    sink: &mut ErrorSink,
) -> Result<(), Fatal> {
    let check = remote.check;
    let mut pin = None;

    let filter = substitute(&check.filter, &remote.path, cache, &mut pin)?;
    let params = substitute(&check.params, &remote.path, cache, &mut pin)?;

    // Extra parameters only count when there is no filter at all.
    let blank = if filter.is_empty() {
        params.values().all(is_blank)
    } else {
        filter.values().all(is_blank)
    };
    if blank {
        debug!(path = %remote.path, method = %check.method, "remote uniqueness check skipped");
        return Ok(());
    }

    let exclude_id = match &check.exclude_id {
        Some(reference) => {
            let target = remote.path.resolve_from_container(reference);
            let record = cache.get(&target).ok_or_else(|| unresolved(&remote.path, &target))?;
            match record.kind {
                Some(RuleType::Id) => parse_id(&record.value, max_id),
                _ => None,
            }
        }
        None => None,
    };

    let Some(existence) = existence else {
        return Err(Fatal {
            path: remote.path.clone(),
            message: "Object existence service is not configured.".to_string(),
        });
    };

    let query = ExistenceQuery {
        resource: check.resource().to_string(),
        method: check.method.clone(),
        filter,
        params,
        exclude_id,
    };

    let ids = existence.find(&query).map_err(|e| {
        warn!(path = %remote.path, method = %check.method, error = %e, "existence lookup failed");
        Fatal {
            path: remote.path.clone(),
            message: e.message,
        }
    })?;

    if ids
        .iter()
        .any(|id| Some(id.as_str()) != query.exclude_id.as_deref())
    {
        let path = pin.unwrap_or_else(|| remote.path.clone());
        sink.add(&path, "This object already exists.", ErrorLevel::RemoteUniq);
    }

    Ok(())
}

/// Replaces `{field_ref}` templates with cached scalars, null when unresolved.
/// `pin` receives the first substituted reference.
fn substitute(
    values: &Map<String, Value>,
    path: &DataPath,
    cache: &FieldValueCache,
    pin: &mut Option<DataPath>,
) -> Result<Map<String, Value>, Fatal> {
    let mut out = Map::new();
    for (name, value) in values {
        let Some(reference) = template_reference(value) else {
            out.insert(name.clone(), value.clone());
            continue;
        };

        let target = path.resolve_from_container(reference);
        let record = cache.get(&target).ok_or_else(|| unresolved(path, &target))?;
        let value = record.scalar().cloned().unwrap_or(Value::Null);
        if pin.is_none() {
            *pin = Some(target);
        }
        out.insert(name.clone(), value);
    }
    Ok(out)
}

fn unresolved(path: &DataPath, target: &DataPath) -> Fatal {
    Fatal {
        path: path.clone(),
        message: format!("Internal error: field reference {} was not resolved.", target),
    }
}
