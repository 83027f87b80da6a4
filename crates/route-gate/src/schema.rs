//! Declarative input schemas and the default field-rule validator.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::context::RequestContext;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s.]+(?:\.[^@\s.]+)+$").expect("email pattern compiles")
});

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    Params,
    Query,
    Body,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Required,
    Number,
    Integer,
    String,
    NotEmpty,
    Email,
    MinLength,
    ContainsDigit,
    ContainsUppercase,
    ContainsSpecial,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub rule: RuleKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<usize>,
    /// Overrides the default message when the rule fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RuleSpec {
    pub fn new(rule: RuleKind) -> Self {
        Self {
            rule,
            min: None,
            message: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "in")]
    pub location: Location,
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
}

impl FieldSpec {
    pub fn new(location: Location, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location,
            rules: Vec::new(),
        }
    }

    pub fn params(name: impl Into<String>) -> Self {
        Self::new(Location::Params, name)
    }

    pub fn query(name: impl Into<String>) -> Self {
        Self::new(Location::Query, name)
    }

    pub fn body(name: impl Into<String>) -> Self {
        Self::new(Location::Body, name)
    }

    pub fn rule(mut self, rule: RuleKind) -> Self {
        self.rules.push(RuleSpec::new(rule));
        self
    }

    pub fn required(self) -> Self {
        self.rule(RuleKind::Required)
    }

    pub fn number(self) -> Self {
        self.rule(RuleKind::Number)
    }

    pub fn min_length(mut self, min: usize) -> Self {
        self.rules.push(RuleSpec {
            rule: RuleKind::MinLength,
            min: Some(min),
            message: None,
        });
        self
    }

    /// Attach a custom message to the most recently added rule.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        if let Some(last) = self.rules.last_mut() {
            last.message = Some(message.into());
        }
        self
    }
}

/// Field rules checked in declaration order; the first failure wins.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub fields: Vec<FieldSpec>,
}

impl SchemaDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

pub trait SchemaValidator: Send + Sync {
    fn validate(&self, schema: &SchemaDescriptor, ctx: &RequestContext)
        -> Result<(), ValidationError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct FieldRuleValidator;

impl SchemaValidator for FieldRuleValidator {
    fn validate(
        &self,
        schema: &SchemaDescriptor,
        ctx: &RequestContext,
    ) -> Result<(), ValidationError> {
        for field in &schema.fields {
            let value = read_field(ctx, field);
            for rule in &field.rules {
                if !check(rule, value.as_ref()) {
                    return Err(ValidationError {
                        field: field.name.clone(),
                        message: rule
                            .message
                            .clone()
                            .unwrap_or_else(|| default_message(&field.name, rule)),
                    });
                }
            }
        }
        Ok(())
    }
}

fn read_field(ctx: &RequestContext, field: &FieldSpec) -> Option<Value> {
    match field.location {
        Location::Params => ctx.params.get(&field.name).cloned().map(Value::String),
        Location::Query => ctx.query.get(&field.name).cloned().map(Value::String),
        Location::Body => ctx
            .body
            .get(&field.name)
            .filter(|value| !value.is_null())
            .cloned(),
    }
}

fn check(rule: &RuleSpec, value: Option<&Value>) -> bool {
    let Some(value) = value else {
        return !matches!(rule.rule, RuleKind::Required | RuleKind::NotEmpty);
    };
    match rule.rule {
        RuleKind::Required => true,
        RuleKind::Number => as_number(value).is_some(),
        RuleKind::Integer => is_integer(value),
        RuleKind::String => value.is_string(),
        RuleKind::NotEmpty => match value {
            Value::String(text) => !text.trim().is_empty(),
            Value::Array(items) => !items.is_empty(),
            Value::Object(map) => !map.is_empty(),
            _ => true,
        },
        RuleKind::Email => value.as_str().map(is_email).unwrap_or(false),
        RuleKind::MinLength => value
            .as_str()
            .map(|text| text.chars().count() >= rule.min.unwrap_or(0))
            .unwrap_or(false),
        RuleKind::ContainsDigit => text_has(value, |c| c.is_ascii_digit()),
        RuleKind::ContainsUppercase => text_has(value, char::is_uppercase),
        RuleKind::ContainsSpecial => {
            text_has(value, |c| !c.is_alphanumeric() && !c.is_whitespace())
        }
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(num) => num.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

fn is_integer(value: &Value) -> bool {
    match value {
        Value::Number(num) => num.is_i64() || num.is_u64(),
        Value::String(text) => text.trim().parse::<i64>().is_ok(),
        _ => false,
    }
}

fn text_has(value: &Value, pred: impl Fn(char) -> bool) -> bool {
    value.as_str().map(|text| text.chars().any(pred)).unwrap_or(false)
}

fn is_email(text: &str) -> bool {
    EMAIL_RE.is_match(text)
}

fn default_message(field: &str, rule: &RuleSpec) -> String {
    match rule.rule {
        RuleKind::Required => format!("\"{field}\" is required"),
        RuleKind::Number => format!("\"{field}\" must be a number"),
        RuleKind::Integer => format!("\"{field}\" must be an integer"),
        RuleKind::String => format!("\"{field}\" must be a string"),
        RuleKind::NotEmpty => format!("\"{field}\" is not allowed to be empty"),
        RuleKind::Email => format!("\"{field}\" must be a valid email"),
        RuleKind::MinLength => format!(
            "\"{field}\" length must be at least {} characters long",
            rule.min.unwrap_or(0)
        ),
        RuleKind::ContainsDigit => format!("\"{field}\" must contain at least one digit"),
        RuleKind::ContainsUppercase => {
            format!("\"{field}\" must contain at least one uppercase letter")
        }
        RuleKind::ContainsSpecial => {
            format!("\"{field}\" must contain at least one special character")
        }
    }
}
