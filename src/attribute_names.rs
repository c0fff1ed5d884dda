use std::collections::BTreeMap;

pub const VAR_MARKER: &str = "var_";
pub const OUT_MARKER: &str = "out_";
pub const TERRAFORM_INPUTS: &str = "Terraform Inputs";
pub const TERRAFORM_OUTPUTS: &str = "Terraform Outputs";

/// Attribute naming grammar for one resource model.
///
/// Every name is `<ModelName>.<suffix>`. The model-name segment (and the
/// `var_`/`out_` marker) compares case-insensitively; whatever follows is
/// compared and preserved exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeNames {
    model_name: String,
}

impl AttributeNames {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn var_prefix(&self) -> String {
        format!("{}.{VAR_MARKER}", self.model_name)
    }

    pub fn out_prefix(&self) -> String {
        format!("{}.{OUT_MARKER}", self.model_name)
    }

    pub fn var_attribute(&self, var_name: &str) -> String {
        format!("{}{var_name}", self.var_prefix())
    }

    pub fn out_attribute(&self, output_name: &str) -> String {
        format!("{}{output_name}", self.out_prefix())
    }

    pub fn inputs_attribute(&self) -> String {
        format!("{}.{TERRAFORM_INPUTS}", self.model_name)
    }

    pub fn outputs_attribute(&self) -> String {
        format!("{}.{TERRAFORM_OUTPUTS}", self.model_name)
    }

    /// Variable name carried by a `<ModelName>.var_<Name>` attribute.
    pub fn declared_var_name<'a>(&self, attribute: &'a str) -> Option<&'a str> {
        strip_prefix_ignore_case(attribute, &self.var_prefix()).filter(|name| !name.is_empty())
    }

    /// Output name carried by a `<ModelName>.out_<Name>` attribute.
    pub fn declared_out_name<'a>(&self, attribute: &'a str) -> Option<&'a str> {
        strip_prefix_ignore_case(attribute, &self.out_prefix()).filter(|name| !name.is_empty())
    }

    /// Finds the attribute whose name is `<ModelName>.<suffix>`, returning the
    /// stored name and value. An exact match wins over a case-folded one.
    pub fn find<'a>(
        &self,
        attributes: &'a BTreeMap<String, String>,
        suffix: &str,
    ) -> Option<(&'a str, &'a str)> {
        let exact = format!("{}.{suffix}", self.model_name);
        if let Some((name, value)) = attributes.get_key_value(&exact) {
            return Some((name.as_str(), value.as_str()));
        }
        let model_prefix = format!("{}.", self.model_name);
        attributes.iter().find_map(|(name, value)| {
            (strip_prefix_ignore_case(name, &model_prefix) == Some(suffix))
                .then_some((name.as_str(), value.as_str()))
        })
    }

    pub fn find_inputs<'a>(
        &self,
        attributes: &'a BTreeMap<String, String>,
    ) -> Option<(&'a str, &'a str)> {
        self.find(attributes, TERRAFORM_INPUTS)
    }

    pub fn find_outputs<'a>(
        &self,
        attributes: &'a BTreeMap<String, String>,
    ) -> Option<(&'a str, &'a str)> {
        self.find(attributes, TERRAFORM_OUTPUTS)
    }

    pub fn find_out<'a>(
        &self,
        attributes: &'a BTreeMap<String, String>,
        output_name: &str,
    ) -> Option<(&'a str, &'a str)> {
        let exact = self.out_attribute(output_name);
        if let Some((name, value)) = attributes.get_key_value(&exact) {
            return Some((name.as_str(), value.as_str()));
        }
        attributes.iter().find_map(|(name, value)| {
            (self.declared_out_name(name) == Some(output_name))
                .then_some((name.as_str(), value.as_str()))
        })
    }
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    if head == prefix || head.to_lowercase() == prefix.to_lowercase() {
        value.get(prefix.len()..)
    } else {
        None
    }
}
