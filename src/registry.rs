//! Named delegate validators referenced by the `use` option of string rules.
//!
//! The engine does not know what a validator checks; it only resolves the name
//! at normalization time and calls it with non-empty values during validation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::types::UseRule;

/// A pluggable syntax check for string values.
pub trait FieldValidator: Send + Sync {
    /// Checks `value`. `rule` carries the options and secondary bounds written
    /// in the schema. The returned error text is post-processed by the engine
    /// (capitalized, full stop appended).
    fn validate(&self, value: &str, rule: &UseRule) -> Result<(), String>;
}

/// Name → validator map. Cloning shares the validators.
#[derive(Clone, Default)]
pub struct ValidatorRegistry {
    entries: HashMap<String, Arc<dyn FieldValidator>>,
}

impl ValidatorRegistry {
    /// Registry with the built-in validators (`regex`, `user_macro`, `time_unit`)
    /// when the `builtin-validators` feature is on.
    pub fn new() -> ValidatorRegistry {
        #[allow(unused_mut)]
        let mut registry = ValidatorRegistry::empty();
        #[cfg(feature = "builtin-validators")]
        {
            registry.register("regex", builtin::RegexValidator);
            registry.register("user_macro", builtin::UserMacroValidator);
            registry.register("time_unit", builtin::TimeUnitValidator);
        }
        registry
    }

    pub fn empty() -> ValidatorRegistry {
        ValidatorRegistry {
            entries: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: &str, validator: impl FieldValidator + 'static) -> &mut Self {
        self.entries.insert(name.to_string(), Arc::new(validator));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn FieldValidator>> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}

impl fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.entries.keys().collect();
        names.sort();
        f.debug_struct("ValidatorRegistry")
            .field("validators", &names)
            .finish()
    }
}

/// Delegate error text as shown to users: capital first letter, full stop.
pub(crate) fn finish_message(message: &str) -> String {
    let message = if message.is_empty() {
        "Invalid string."
    } else {
        message
    };

    let mut chars = message.chars();
    let mut finished: String = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    };
    if !finished.ends_with('.') {
        finished.push('.');
    }
    finished
}

#[cfg(feature = "builtin-validators")]
pub mod builtin {
    use regex::Regex;
    use serde_json::Number;

    use super::FieldValidator;
    use crate::primitives::{parse_time_unit, parse_user_macro};
    use crate::types::UseRule;

    fn option_text<'a>(rule: &'a UseRule, key: &str) -> Option<&'a str> {
        rule.options.get(key).and_then(|v| v.as_str())
    }

    fn option_flag(rule: &UseRule, key: &str) -> bool {
        rule.options
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Value must itself be a valid regular expression.
    pub struct RegexValidator;

    impl FieldValidator for RegexValidator {
        fn validate(&self, value: &str, rule: &UseRule) -> Result<(), String> {
            Regex::new(value).map(|_| ()).map_err(|_| {
                option_text(rule, "messageInvalid")
                    .unwrap_or("invalid regular expression")
                    .to_string()
            })
        }
    }

    /// Value must be a user macro reference such as `{$NAME}`.
    pub struct UserMacroValidator;

    impl FieldValidator for UserMacroValidator {
        fn validate(&self, value: &str, _rule: &UseRule) -> Result<(), String> {
            match parse_user_macro(value) {
                Some(_) => Ok(()),
                None => Err(format!("incorrect user macro syntax \"{}\"", value)),
            }
        }
    }

    /// Value must be a time unit (`30s`, `5m`, ...). Options:
    /// `usermacros: true` also accepts a user macro; bounds are in seconds.
    pub struct TimeUnitValidator;

    impl FieldValidator for TimeUnitValidator {
        fn validate(&self, value: &str, rule: &UseRule) -> Result<(), String> {
            if option_flag(rule, "usermacros") && parse_user_macro(value).is_some() {
                return Ok(());
            }

            let seconds = parse_time_unit(value)?;

            if let Some(min) = rule.min.as_ref().and_then(Number::as_f64)
                && (seconds as f64) < min
            {
                return Err(format!(
                    "Value must be greater than {}.",
                    rule.min.as_ref().map(Number::to_string).unwrap_or_default()
                ));
            }
            if let Some(max) = rule.max.as_ref().and_then(Number::as_f64)
                && (seconds as f64) > max
            {
                return Err(format!(
                    "Value must be smaller than {}.",
                    rule.max.as_ref().map(Number::to_string).unwrap_or_default()
                ));
            }
            Ok(())
        }
    }
}
