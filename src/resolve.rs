//! Dependency Resolver.
//!
//! Before a data instance is validated, every field referenced by a `when`
//! condition, a `default_source` or an `api_uniq` template is resolved to a
//! `(type, value)` record. A field's type depends on which of its rule rows
//! applies, which may itself depend on other referenced fields, so resolution
//! runs as a worklist of sweeps with a per-path retry budget. Cycles and chains
//! deeper than the budget end up as unresolved records instead of looping.

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

use crate::config::DEFAULT_MAX_ID;
use crate::enums::RuleType;
use crate::path::{DataPath, Segment};
use crate::primitives::*;
use crate::types::*;

// ─── Cache ──────────────────────────────────────────────────────────────────

/// Type and value of one referenced field.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldValueRecord {
    pub path: DataPath,
    /// `None` when the field could not be resolved; predicates treat it as absent.
    pub kind: Option<RuleType>,
    /// Raw submitted value for scalar types. For `object`, `objects` and
    /// `array` fields only whether entries are present (`true`/`false`).
    /// `null` when the field is absent.
    pub value: Value,
}

impl FieldValueRecord {
    pub fn unresolved(path: DataPath) -> FieldValueRecord {
        FieldValueRecord {
            path,
            kind: None,
            value: Value::Null,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.kind.is_some()
    }

    /// The value when it is a resolved, present scalar.
    pub fn scalar(&self) -> Option<&Value> {
        match (self.kind, &self.value) {
            (Some(kind), value @ (Value::String(_) | Value::Number(_) | Value::Bool(_)))
                if kind.is_scalar() =>
            {
                Some(value)
            }
            _ => None,
        }
    }
}

/// Path → record map built once per validation call.
#[derive(Clone, Debug, Default)]
pub struct FieldValueCache {
    records: HashMap<DataPath, FieldValueRecord>,
    sweeps: usize,
}

impl FieldValueCache {
    pub fn get(&self, path: &DataPath) -> Option<&FieldValueRecord> {
        self.records.get(path)
    }

    pub fn contains(&self, path: &DataPath) -> bool {
        self.records.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldValueRecord> {
        self.records.values()
    }

    /// Number of sweeps the worklist needed.
    pub fn sweeps(&self) -> usize {
        self.sweeps
    }

    fn insert(&mut self, record: FieldValueRecord) {
        self.records.insert(record.path.clone(), record);
    }
}

// ─── Worklist ───────────────────────────────────────────────────────────────

enum Attempt {
    Resolved(FieldValueRecord),
    /// Blocked on these not yet cached paths.
    Pending(Vec<DataPath>),
    Unresolvable,
}

enum Choice<'r> {
    Row(&'r Rule),
    NoMatch,
    Blocked(Vec<DataPath>),
}

/// Resolve every path referenced by `root` against `data`.
pub fn resolve(root: &Rule, data: &Value, retry_budget: usize) -> FieldValueCache {
    let resolver = Resolver { root, data };
    let budget = retry_budget.max(1);

    let mut found = Vec::new();
    if let RuleKind::Object(object) = &root.kind {
        resolver.scan_object(&object.fields, &object.api_uniq, data, &DataPath::root(), &mut found);
    }

    let mut seen = HashSet::new();
    let mut queue: Vec<(DataPath, usize)> = Vec::new();
    for path in found {
        if seen.insert(path.clone()) {
            queue.push((path, budget));
        }
    }

    let mut cache = FieldValueCache::default();

    while !queue.is_empty() {
        cache.sweeps += 1;
        let mut retry = Vec::new();
        let mut exhausted = Vec::new();

        let mut i = 0;
        while i < queue.len() {
            let (path, retries_left) = queue[i].clone();
            i += 1;

            if cache.contains(&path) {
                continue;
            }

            match resolver.attempt(&path, &cache) {
                Attempt::Resolved(record) => {
                    trace!(path = %path, kind = ?record.kind, "resolved field");
                    cache.insert(record);
                }
                Attempt::Unresolvable => {
                    trace!(path = %path, "field has no applicable rule");
                    cache.insert(FieldValueRecord::unresolved(path));
                }
                Attempt::Pending(dependencies) => {
                    trace!(path = %path, retries_left, "field is waiting on references");
                    for dependency in &dependencies {
                        if seen.insert(dependency.clone()) {
                            queue.push((dependency.clone(), budget));
                        }
                    }
                    if retries_left <= 1 {
                        exhausted.push((path, dependencies));
                    } else {
                        retry.push((path, retries_left - 1));
                    }
                }
            }
        }

        // Exhausted paths become visible only after the sweep.
        resolver.settle(exhausted, &mut cache);

        queue = retry;
    }

    debug!(
        fields = cache.len(),
        sweeps = cache.sweeps,
        "resolved referenced fields"
    );

    cache
}

struct Resolver<'a> {
    root: &'a Rule,
    data: &'a Value,
}

impl<'a> Resolver<'a> {
    /// Caches the paths that ran out of retries in one sweep.
    ///
    /// A path blocked only on other exhausted paths is attempted once more
    /// after those are cached as unresolved, so a fallback row that does not
    /// depend on them can still apply. Paths blocked on each other, or on
    /// themselves, stay unresolved.
    fn settle(&self, mut exhausted: Vec<(DataPath, Vec<DataPath>)>, cache: &mut FieldValueCache) {
        while !exhausted.is_empty() {
            let blocked: HashSet<DataPath> = exhausted.iter().map(|(path, _)| path.clone()).collect();
            let (waiting, settled): (Vec<_>, Vec<_>) =
                exhausted.into_iter().partition(|(path, dependencies)| {
                    dependencies
                        .iter()
                        .any(|dependency| dependency != path && blocked.contains(dependency))
                });

            if settled.is_empty() {
                for (path, _) in waiting {
                    trace!(path = %path, "retry budget exhausted");
                    cache.insert(FieldValueRecord::unresolved(path));
                }
                return;
            }
            for (path, _) in settled {
                trace!(path = %path, "retry budget exhausted");
                cache.insert(FieldValueRecord::unresolved(path));
            }

            exhausted = Vec::new();
            for (path, _) in waiting {
                match self.attempt(&path, cache) {
                    Attempt::Resolved(record) => {
                        trace!(path = %path, kind = ?record.kind, "resolved field after its references settled");
                        cache.insert(record);
                    }
                    Attempt::Unresolvable => cache.insert(FieldValueRecord::unresolved(path)),
                    Attempt::Pending(dependencies) => exhausted.push((path, dependencies)),
                }
            }
        }
    }

    // ─── Scan ───────────────────────────────────────────────────────────────

    fn scan_object(
        &self,
        fields: &[FieldSpec],
        api_uniq: &[ApiUniqCheck],
        data: &Value,
        path: &DataPath,
        found: &mut Vec<DataPath>,
    ) {
        let Value::Object(map) = data else {
            return;
        };

        for check in api_uniq {
            for reference in check
                .filter
                .values()
                .chain(check.params.values())
                .filter_map(template_reference)
            {
                found.push(path.resolve_from_container(reference));
            }
            if let Some(reference) = &check.exclude_id {
                found.push(path.resolve_from_container(reference));
            }
        }

        for field in fields {
            let field_path = path.field(&field.name);
            let value = map.get(&field.name).filter(|v| !v.is_null());
            for rule in &field.rules {
                self.scan_rule(rule, value, &field_path, found);
            }
        }
    }

    fn scan_rule(&self, rule: &Rule, value: Option<&Value>, path: &DataPath, found: &mut Vec<DataPath>) {
        for when in &rule.when {
            found.push(path.resolve_reference(&when.field));
        }
        if let Some(source) = &rule.default_source {
            found.push(path.resolve_reference(source));
        }
        if let Some(value) = value {
            self.scan_children(rule, value, path, found);
        }
    }

    fn scan_children(&self, rule: &Rule, value: &Value, path: &DataPath, found: &mut Vec<DataPath>) {
        match &rule.kind {
            RuleKind::Object(object) => {
                self.scan_object(&object.fields, &object.api_uniq, value, path, found);
            }
            RuleKind::Objects(objects) => {
                for (key, element) in collection_entries(value) {
                    self.scan_object(&objects.fields, &[], element, &path.key(&key), found);
                }
            }
            RuleKind::Array(array) => {
                let Some(element) = array.element.as_deref() else {
                    return;
                };
                // Elements are addressed as the array itself.
                for when in &element.when {
                    found.push(path.resolve_reference(&when.field));
                }
                for (key, item) in collection_entries(value) {
                    if !item.is_null() {
                        self.scan_children(element, item, &path.key(&key), found);
                    }
                }
            }
            _ => {}
        }
    }

    // ─── Attempt ────────────────────────────────────────────────────────────

    /// Walk the rule tree along `path`, picking the applicable row at each level.
    fn attempt(&self, path: &DataPath, cache: &FieldValueCache) -> Attempt {
        let segments = path.segments();
        let mut rule = self.root;
        let mut context = DataPath::root();
        let mut index = 0;

        loop {
            let fields = match &rule.kind {
                RuleKind::Object(object) => &object.fields,
                RuleKind::Objects(objects) => {
                    let Some(segment) = segments.get(index) else {
                        return Attempt::Unresolvable;
                    };
                    context = context.child(segment.clone());
                    index += 1;
                    &objects.fields
                }
                RuleKind::Array(array) => {
                    let (Some(segment), Some(element)) = (segments.get(index), array.element.as_deref())
                    else {
                        return Attempt::Unresolvable;
                    };
                    let element_path = context.child(segment.clone());
                    index += 1;

                    match conditions_hold(&element.when, &context, cache) {
                        Ok(true) => {}
                        Ok(false) => return Attempt::Unresolvable,
                        Err(missing) => return Attempt::Pending(missing),
                    }
                    if index == segments.len() {
                        return self.project(element, element_path);
                    }
                    rule = element;
                    context = element_path;
                    continue;
                }
                _ => return Attempt::Unresolvable,
            };

            let Some(name) = segments.get(index).map(Segment::key) else {
                return Attempt::Unresolvable;
            };
            let Some(spec) = fields.iter().find(|field| field.name == name) else {
                return Attempt::Unresolvable;
            };
            let field_path = context.field(&name);
            index += 1;

            let row = match choose_row(&spec.rules, &field_path, cache) {
                Choice::Row(row) => row,
                Choice::NoMatch => return Attempt::Unresolvable,
                Choice::Blocked(missing) => return Attempt::Pending(missing),
            };

            if index == segments.len() {
                return self.project(row, field_path);
            }
            rule = row;
            context = field_path;
        }
    }

    fn project(&self, rule: &Rule, path: DataPath) -> Attempt {
        let value = lookup(self.data, &path);
        let kind = rule.rule_type();

        let value = match kind {
            RuleType::File => return Attempt::Unresolvable,
            kind if kind.is_scalar() => value.cloned().unwrap_or(Value::Null),
            _ => value.map_or(Value::Null, |v| Value::Bool(has_entries(v))),
        };

        Attempt::Resolved(FieldValueRecord {
            path,
            kind: Some(kind),
            value,
        })
    }
}

/// First row whose conditions all hold. Rows without `when` always match.
fn choose_row<'r>(rows: &'r [Rule], field_path: &DataPath, cache: &FieldValueCache) -> Choice<'r> {
    for row in rows {
        match conditions_hold(&row.when, field_path, cache) {
            Ok(true) => return Choice::Row(row),
            Ok(false) => {}
            Err(missing) => return Choice::Blocked(missing),
        }
    }
    Choice::NoMatch
}

/// `Err` lists the references not cached yet, unless a cached one already fails.
fn conditions_hold(
    when: &[WhenRule],
    context: &DataPath,
    cache: &FieldValueCache,
) -> Result<bool, Vec<DataPath>> {
    let mut missing = Vec::new();
    for condition in when {
        let target = context.resolve_reference(&condition.field);
        match cache.get(&target) {
            Some(record) => {
                if !test_when(&condition.predicate, record) {
                    return Ok(false);
                }
            }
            None => missing.push(target),
        }
    }
    if missing.is_empty() {
        Ok(true)
    } else {
        Err(missing)
    }
}

// ─── Data access ────────────────────────────────────────────────────────────

/// Value at `path`; `null` counts as absent.
pub fn lookup<'v>(data: &'v Value, path: &DataPath) -> Option<&'v Value> {
    let mut current = data;
    for segment in path.segments() {
        current = match (current, segment) {
            (Value::Object(map), segment) => map.get(&segment.key())?,
            (Value::Array(items), Segment::Index(index)) => items.get(*index)?,
            _ => return None,
        };
    }
    (!current.is_null()).then_some(current)
}

/// `(key, value)` pairs of a collection submitted as an array or an index-keyed map.
pub fn collection_entries(value: &Value) -> Vec<(String, &Value)> {
    match value {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(index, item)| (index.to_string(), item))
            .collect(),
        Value::Object(map) => map.iter().map(|(key, item)| (key.clone(), item)).collect(),
        _ => Vec::new(),
    }
}

fn has_entries(value: &Value) -> bool {
    match value {
        Value::Array(items) => items.iter().any(|item| !item.is_null()),
        Value::Object(map) => map.values().any(|item| !item.is_null()),
        _ => false,
    }
}

// ─── Predicates ─────────────────────────────────────────────────────────────

/// Evaluate one `when` predicate against a resolved record.
///
/// Unresolved records only satisfy `not_exists` and `empty`. Value tests on
/// scalars first parse the raw value as the record's type; values that do not
/// parse never match.
pub fn test_when(predicate: &WhenPredicate, record: &FieldValueRecord) -> bool {
    let Some(kind) = record.kind else {
        return matches!(predicate, WhenPredicate::NotExists | WhenPredicate::Empty);
    };
    let value = &record.value;

    match predicate {
        WhenPredicate::Exists => !value.is_null(),
        WhenPredicate::NotExists => value.is_null(),
        WhenPredicate::Empty => is_empty(kind, value),
        WhenPredicate::NotEmpty => !is_empty(kind, value),
        WhenPredicate::Type(expected) => {
            if kind.is_scalar() {
                parses_as(*expected, value)
            } else {
                *expected == kind && !value.is_null()
            }
        }
        WhenPredicate::In(options) => membership_test(kind, value, options) == Some(true),
        WhenPredicate::NotIn(options) => membership_test(kind, value, options) == Some(false),
        WhenPredicate::Regex(pattern) => {
            kind.is_scalar()
                && !value.is_boolean()
                && scalar_text(value).is_some_and(|text| pattern.is_match(&text))
        }
    }
}

fn is_empty(kind: RuleType, value: &Value) -> bool {
    match kind {
        RuleType::Boolean => is_blank(value),
        kind if kind.is_scalar() => matches!(value, Value::Null) || value.as_str() == Some(""),
        _ => *value != Value::Bool(true),
    }
}

fn parses_as(expected: RuleType, value: &Value) -> bool {
    match expected {
        RuleType::Boolean => value.is_boolean(),
        RuleType::Integer => parse_int32(value).is_some(),
        RuleType::Float => parse_float(value).is_some(),
        RuleType::Id => parse_id(value, DEFAULT_MAX_ID).is_some(),
        RuleType::String => matches!(value, Value::String(_) | Value::Number(_)),
        _ => false,
    }
}

/// `Some(matches)` for a value that parses as the record's type, else `None`.
fn membership_test(kind: RuleType, value: &Value, options: &[InOption]) -> Option<bool> {
    match kind {
        RuleType::Integer => parse_int32(value).map(|n| number_matches_any(n as f64, options)),
        RuleType::Float => parse_float(value).map(|f| number_matches_any(f, options)),
        RuleType::Id => parse_id(value, DEFAULT_MAX_ID)
            .and_then(|id| id.parse::<f64>().ok())
            .map(|n| number_matches_any(n, options)),
        RuleType::Boolean => value
            .as_bool()
            .map(|b| number_matches_any(if b { 1.0 } else { 0.0 }, options)),
        RuleType::String => match value {
            Value::String(_) | Value::Number(_) => {
                scalar_text(value).map(|text| string_matches_any(&text, options))
            }
            _ => None,
        },
        _ => None,
    }
}
