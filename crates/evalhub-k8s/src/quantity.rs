//! Resource quantity validation.
//!
//! Accepts the Kubernetes quantity grammar: a signed decimal number with an
//! optional binary SI suffix (`Ki`..`Ei`), decimal SI suffix (`n`..`E`), or
//! decimal exponent (`e3`, `E-2`). Malformed strings are an error rather
//! than a silent default.

use std::sync::OnceLock;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use regex::Regex;

use crate::error::{K8sError, K8sResult};

const QUANTITY_PATTERN: &str =
    r"^[+-]?(?:[0-9]+(?:\.[0-9]*)?|\.[0-9]+)(?:[eE][+-]?[0-9]+|Ki|Mi|Gi|Ti|Pi|Ei|[numkMGTPE])?$";

static SHARED: OnceLock<Result<QuantityParser, regex::Error>> = OnceLock::new();

/// Validates quantity strings against one compiled pattern.
#[derive(Debug, Clone)]
pub struct QuantityParser {
    pattern: Regex,
}

impl QuantityParser {
    /// Process-wide parser; the pattern is compiled on first use.
    pub fn shared() -> K8sResult<&'static Self> {
        SHARED
            .get_or_init(|| Regex::new(QUANTITY_PATTERN).map(|pattern| Self { pattern }))
            .as_ref()
            .map_err(|e| K8sError::Pattern(e.clone()))
    }

    /// Parse `value` for the resource `field` (e.g. `cpu request`).
    pub fn parse(&self, field: &'static str, value: &str) -> K8sResult<Quantity> {
        let trimmed = value.trim();
        if !self.pattern.is_match(trimmed) {
            return Err(K8sError::InvalidQuantity {
                field,
                value: value.to_string(),
            });
        }
        Ok(Quantity(trimmed.to_string()))
    }
}
