use crate::api::{AttributeApi, Attributes};
use crate::attribute_names::AttributeNames;
use crate::shared::ExecutionLogger;
use std::collections::BTreeSet;

/// One Terraform input variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TfVar {
    pub name: String,
    pub value: String,
}

impl TfVar {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Collects Terraform input variables from a resource's attributes.
pub struct VariableService<'a> {
    api: &'a dyn AttributeApi,
    names: &'a AttributeNames,
    logger: &'a dyn ExecutionLogger,
}

impl<'a> VariableService<'a> {
    pub fn new(
        api: &'a dyn AttributeApi,
        names: &'a AttributeNames,
        logger: &'a dyn ExecutionLogger,
    ) -> Self {
        Self { api, names, logger }
    }

    /// Values that fail to decrypt were never encrypted; they pass through.
    pub fn try_decrypt_password(&self, value: &str) -> String {
        self.api
            .decrypt_password(value)
            .unwrap_or_else(|_| value.to_string())
    }

    /// Variables declared as `<ModelName>.var_<Name>` attributes.
    pub fn extract_declared_variables(&self, attributes: &Attributes) -> Vec<TfVar> {
        attributes
            .iter()
            .filter_map(|(attribute, value)| {
                self.names
                    .declared_var_name(attribute)
                    .map(|name| TfVar::new(name, self.try_decrypt_password(value)))
            })
            .collect()
    }

    /// Variables packed into the `<ModelName>.Terraform Inputs` attribute as
    /// `key=value` pairs separated by commas.
    pub fn extract_delimited_variables(&self, attributes: &Attributes) -> Vec<TfVar> {
        let Some((attribute, raw)) = self.names.find_inputs(attributes) else {
            return Vec::new();
        };
        let mut vars = Vec::new();
        for segment in raw.split(',') {
            match parse_pair(segment) {
                Some(var) => vars.push(var),
                None if segment.trim().is_empty() => {}
                None => self.logger.warn(
                    "variables.input.skipped",
                    &format!("attribute `{attribute}` has malformed segment `{}`", segment.trim()),
                ),
            }
        }
        vars
    }

    /// Declared variables first, delimited ones after.
    pub fn merge(&self, declared: Vec<TfVar>, delimited: Vec<TfVar>) -> Vec<TfVar> {
        let mut merged = declared;
        merged.extend(delimited);
        merged
    }

    /// Keeps the first occurrence of every name, preserving order.
    pub fn resolve(&self, merged: Vec<TfVar>) -> Vec<TfVar> {
        let mut seen = BTreeSet::new();
        let mut resolved = Vec::with_capacity(merged.len());
        for var in merged {
            if seen.insert(var.name.clone()) {
                resolved.push(var);
            } else {
                self.logger.warn(
                    "variables.duplicate.shadowed",
                    &format!("variable `{}` already set by an earlier source", var.name),
                );
            }
        }
        resolved
    }

    /// Full pipeline: extract both sources, merge and resolve duplicates.
    pub fn collect(&self, attributes: &Attributes) -> Vec<TfVar> {
        let declared = self.extract_declared_variables(attributes);
        let delimited = self.extract_delimited_variables(attributes);
        self.resolve(self.merge(declared, delimited))
    }
}

fn parse_pair(segment: &str) -> Option<TfVar> {
    let (key, value) = segment.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some(TfVar::new(key, value.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, AttributeWriteRequest, ResourceScope};
    use crate::shared::{MemoryLogger, NullLogger};

    struct DecryptOnly {
        plaintext: Option<&'static str>,
    }

    impl AttributeApi for DecryptOnly {
        fn get_attributes(&self, _scope: &ResourceScope) -> Result<Attributes, ApiError> {
            Ok(Attributes::new())
        }

        fn set_attributes(
            &self,
            _scope: &ResourceScope,
            _requests: &[AttributeWriteRequest],
        ) -> Result<(), ApiError> {
            Ok(())
        }

        fn decrypt_password(&self, _value: &str) -> Result<String, ApiError> {
            self.plaintext
                .map(str::to_string)
                .ok_or(ApiError::NotEncrypted)
        }
    }

    fn attrs(pairs: &[(&str, &str)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn decrypt_failure_passes_value_through() {
        let api = DecryptOnly { plaintext: None };
        let names = AttributeNames::new("TF Service");
        let service = VariableService::new(&api, &names, &NullLogger);
        assert_eq!(service.try_decrypt_password("plain"), "plain");
    }

    #[test]
    fn decrypt_success_returns_plaintext() {
        let api = DecryptOnly {
            plaintext: Some("secret"),
        };
        let names = AttributeNames::new("TF Service");
        let service = VariableService::new(&api, &names, &NullLogger);
        assert_eq!(service.try_decrypt_password("token"), "secret");
    }

    #[test]
    fn declared_variables_keep_name_case() {
        let api = DecryptOnly { plaintext: None };
        let names = AttributeNames::new("TF Service");
        let service = VariableService::new(&api, &names, &NullLogger);
        let result = service.extract_declared_variables(&attrs(&[
            ("attribute1", "val1"),
            ("attribute2", "val2"),
            ("TF Service.var_MyVar", "val3"),
        ]));
        assert_eq!(result, vec![TfVar::new("MyVar", "val3")]);
    }

    #[test]
    fn delimited_inputs_are_trimmed() {
        let api = DecryptOnly { plaintext: None };
        let names = AttributeNames::new("TF Service");
        let service = VariableService::new(&api, &names, &NullLogger);
        let result = service.extract_delimited_variables(&attrs(&[(
            "TF Service.Terraform Inputs",
            "key1=val1,key2 = val2, key3=val3",
        )]));
        assert_eq!(result.len(), 3);
        assert!(result.contains(&TfVar::new("key1", "val1")));
        assert!(result.contains(&TfVar::new("key2", "val2")));
        assert!(result.contains(&TfVar::new("key3", "val3")));
    }

    #[test]
    fn value_keeps_everything_after_first_equals() {
        assert_eq!(
            parse_pair(" conn = a=b=c "),
            Some(TfVar::new("conn", "a=b=c"))
        );
        assert_eq!(parse_pair("novalue"), None);
        assert_eq!(parse_pair(" =x"), None);
    }

    #[test]
    fn malformed_segments_are_skipped_and_logged() {
        let api = DecryptOnly { plaintext: None };
        let names = AttributeNames::new("TF Service");
        let logger = MemoryLogger::new();
        let service = VariableService::new(&api, &names, &logger);
        let result = service.extract_delimited_variables(&attrs(&[(
            "TF Service.Terraform Inputs",
            "a=1,,broken, b=2,",
        )]));
        assert_eq!(result, vec![TfVar::new("a", "1"), TfVar::new("b", "2")]);
        assert_eq!(logger.events(), vec!["variables.input.skipped".to_string()]);
    }

    #[test]
    fn missing_inputs_attribute_yields_nothing() {
        let api = DecryptOnly { plaintext: None };
        let names = AttributeNames::new("TF Service");
        let service = VariableService::new(&api, &names, &NullLogger);
        assert!(service
            .extract_delimited_variables(&attrs(&[("other", "a=b")]))
            .is_empty());
    }

    #[test]
    fn resolve_keeps_first_declared() {
        let api = DecryptOnly { plaintext: None };
        let names = AttributeNames::new("TF Service");
        let logger = MemoryLogger::new();
        let service = VariableService::new(&api, &names, &logger);
        let merged = service.merge(
            vec![TfVar::new("region", "eu")],
            vec![TfVar::new("region", "us"), TfVar::new("size", "s")],
        );
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0], TfVar::new("region", "eu"));

        let resolved = service.resolve(merged);
        assert_eq!(
            resolved,
            vec![TfVar::new("region", "eu"), TfVar::new("size", "s")]
        );
        assert!(logger.contains_event("variables.duplicate.shadowed"));
    }
}
