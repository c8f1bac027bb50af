//! The [`FormValidator`] entry point: one normalized rule tree, many calls.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::config::EngineOptions;
use crate::error::SchemaError;
use crate::normalize::Normalizer;
use crate::parse::parse_rules;
use crate::provider::{NoSchema, SchemaProvider};
use crate::registry::ValidatorRegistry;
use crate::report::{ErrorSink, ValidationReport};
use crate::resolve::resolve;
use crate::types::{FileMap, Rule};
use crate::uniq::{self, ObjectExistence};
use crate::validate::{self, Validator};

/// Validator for one rule schema.
///
/// The rule tree is normalized once at construction and never mutated, so a
/// `FormValidator` can be shared across threads and reused for any number of
/// [`validate`](FormValidator::validate) calls.
pub struct FormValidator {
    rules: Rule,
    registry: ValidatorRegistry,
    existence: Option<Arc<dyn ObjectExistence>>,
    options: EngineOptions,
}

impl fmt::Debug for FormValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormValidator")
            .field("rules", &self.rules)
            .field("registry", &self.registry)
            .field("existence", &self.existence.is_some())
            .field("options", &self.options)
            .finish()
    }
}

impl FormValidator {
    /// Normalizes `rules` with the default collaborators.
    pub fn new(rules: &Value) -> Result<FormValidator, SchemaError> {
        FormValidator::builder().build(rules)
    }

    /// Parses and normalizes a YAML or JSON rule document.
    pub fn from_yaml(input: &str) -> Result<FormValidator, SchemaError> {
        let raw = parse_rules(input)?;
        FormValidator::new(&raw)
    }

    pub fn builder<'p>() -> FormValidatorBuilder<'p> {
        FormValidatorBuilder::default()
    }

    /// The canonical rule tree.
    pub fn rules(&self) -> &Rule {
        &self.rules
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Validates one submission.
    ///
    /// Moves deprecated parameters to their replacements, runs the dependency
    /// resolver over the result, the structural pass, then the local and
    /// remote uniqueness checks when nothing failed so far.
    pub fn validate(&self, data: &Value, files: &FileMap) -> ValidationReport {
        let mut sink = ErrorSink::new();
        let data = validate::migrate_deprecated(&self.rules, data, &mut sink);
        let cache = resolve(&self.rules, &data, self.options.retry_budget);

        let mut validator = Validator::new(&self.registry, &cache, self.options.max_id, sink);
        let (output, output_files) = validator.validate_root(&self.rules, &data, files);
        let Validator {
            mut sink,
            local_checks,
            remote_checks,
            ..
        } = validator;

        if sink.is_empty() {
            for check in &local_checks {
                uniq::check_local(check, &mut sink);
            }

            let existence = self.existence.as_deref();
            for check in &remote_checks {
                if let Err(fatal) =
                    uniq::check_remote(check, &cache, existence, self.options.max_id, &mut sink)
                {
                    sink.add_fatal(&fatal.path, fatal.message);
                    break;
                }
            }
        }

        debug!(
            status = ?sink.result(),
            paths = sink.errors().len(),
            resolved = cache.len(),
            "validation finished"
        );
        ValidationReport::new(sink, output, output_files)
    }
}

/// Collaborators and options of a [`FormValidator`].
pub struct FormValidatorBuilder<'p> {
    provider: Option<&'p dyn SchemaProvider>,
    registry: ValidatorRegistry,
    existence: Option<Arc<dyn ObjectExistence>>,
    options: EngineOptions,
}

impl Default for FormValidatorBuilder<'_> {
    fn default() -> Self {
        FormValidatorBuilder {
            provider: None,
            registry: ValidatorRegistry::new(),
            existence: None,
            options: EngineOptions::default(),
        }
    }
}

impl<'p> FormValidatorBuilder<'p> {
    /// Source of `db` and `setting` column metadata.
    pub fn schema_provider(mut self, provider: &'p dyn SchemaProvider) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn registry(mut self, registry: ValidatorRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Collaborator for `api_uniq` checks.
    pub fn existence(mut self, existence: impl ObjectExistence + 'static) -> Self {
        self.existence = Some(Arc::new(existence));
        self
    }

    pub fn options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self, rules: &Value) -> Result<FormValidator, SchemaError> {
        let provider: &dyn SchemaProvider = match self.provider {
            Some(provider) => provider,
            None => &NoSchema,
        };
        let rules = Normalizer::new(provider, &self.registry).normalize(rules)?;

        Ok(FormValidator {
            rules,
            registry: self.registry,
            existence: self.existence,
            options: self.options,
        })
    }
}
