//! Typed lookup and upsert requests
//!
//! Requests are built once and handed to any [`Transaction`](crate::traits::Transaction).
//! Remote stores render them with [`Lookup::to_dql`]; the in-memory store
//! interprets the same values directly, so both backends agree on what a
//! request means.

use crate::types::{Alias, Identity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name of the single query block every lookup renders.
pub const QUERY_BLOCK: &str = "q";

/// Predicate names of the wallet record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Predicate holding the alias
    pub alias_predicate: String,
    /// Predicate holding the balance
    pub balance_predicate: String,
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            alias_predicate: "Wallet.alias".to_string(),
            balance_predicate: "Wallet.balance".to_string(),
        }
    }
}

/// One projected field: `label: predicate`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projection {
    /// Key the field appears under in the result
    pub label: String,
    /// Stored predicate
    pub predicate: String,
}

/// Equality lookup on a single predicate
///
/// Matches every record whose `predicate` equals `value`. The matched
/// identities can be bound to a variable for use by an [`Upsert`] in the
/// same request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lookup {
    /// Predicate filtered on
    pub predicate: String,
    /// Value it must equal
    pub value: String,
    /// Variable bound to the matched identities
    pub bind: Option<String>,
    /// Projected fields
    pub fields: Vec<Projection>,
}

impl Lookup {
    /// Lookup by alias under the given schema, projecting nothing yet.
    pub fn by_alias(schema: &Schema, alias: &Alias) -> Self {
        Self {
            predicate: schema.alias_predicate.clone(),
            value: alias.as_str().to_string(),
            bind: None,
            fields: Vec::new(),
        }
    }

    /// Add a projected field.
    pub fn project(mut self, label: impl Into<String>, predicate: impl Into<String>) -> Self {
        self.fields.push(Projection {
            label: label.into(),
            predicate: predicate.into(),
        });
        self
    }

    /// Bind matched identities to `var`.
    pub fn bind_uid(mut self, var: impl Into<String>) -> Self {
        self.bind = Some(var.into());
        self
    }

    /// Render as a DQL query.
    ///
    /// ```
    /// use walletrace_core::request::{Lookup, Schema};
    /// use walletrace_core::types::Alias;
    ///
    /// let schema = Schema::default();
    /// let dql = Lookup::by_alias(&schema, &Alias::new("a"))
    ///     .bind_uid("v")
    ///     .to_dql();
    /// assert!(dql.contains(r#"q(func: eq(Wallet.alias, "a"))"#));
    /// assert!(dql.contains("v as uid"));
    /// ```
    pub fn to_dql(&self) -> String {
        // serde_json quoting escapes quotes and backslashes the way DQL expects
        let literal = serde_json::Value::String(self.value.clone()).to_string();
        let mut out = String::new();
        out.push_str("{\n");
        out.push_str(&format!(
            "  {}(func: eq({}, {})) {{\n",
            QUERY_BLOCK, self.predicate, literal
        ));
        if let Some(var) = &self.bind {
            out.push_str(&format!("    {} as uid\n", var));
        }
        for field in &self.fields {
            out.push_str(&format!("    {}: {}\n", field.label, field.predicate));
        }
        out.push_str("  }\n}");
        out
    }
}

/// Lookup plus a conditional set mutation, executed as one request
///
/// The set document refers to the lookup's bound variable through
/// [`Upsert::var_ref`]. If the lookup binds nothing, the store creates a
/// new record instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Upsert {
    /// Lookup resolving the target records
    pub lookup: Lookup,
    /// JSON set document
    pub set: serde_json::Value,
    /// Commit immediately instead of staging in the enclosing transaction
    pub commit_now: bool,
}

impl Upsert {
    /// Staged upsert (`commit_now = false`).
    pub fn new(lookup: Lookup, set: serde_json::Value) -> Self {
        Self {
            lookup,
            set,
            commit_now: false,
        }
    }

    /// Reference to a bound variable inside a set document: `uid(v)`.
    pub fn var_ref(var: &str) -> String {
        format!("uid({})", var)
    }

    /// Variable named by a `uid(..)` reference, if `raw` is one.
    pub fn parse_var_ref(raw: &str) -> Option<&str> {
        raw.strip_prefix("uid(")?.strip_suffix(')')
    }
}

/// Store reply to a mutation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Identities of records created by the mutation, by blank node name
    pub created: BTreeMap<String, Identity>,
    /// Identities the mutation wrote to
    pub touched: Vec<Identity>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_lookup_renders_projection() {
        let schema = Schema::default();
        let lookup = Lookup::by_alias(&schema, &Alias::new("a"))
            .project("alias", &schema.alias_predicate)
            .project("balance", &schema.balance_predicate);

        let expected = "{\n  q(func: eq(Wallet.alias, \"a\")) {\n    alias: Wallet.alias\n    balance: Wallet.balance\n  }\n}";
        assert_eq!(lookup.to_dql(), expected);
    }

    #[test]
    fn test_bound_lookup_renders_variable() {
        let lookup = Lookup::by_alias(&Schema::default(), &Alias::new("a")).bind_uid("v");
        assert_eq!(
            lookup.to_dql(),
            "{\n  q(func: eq(Wallet.alias, \"a\")) {\n    v as uid\n  }\n}"
        );
    }

    #[test]
    fn test_lookup_value_is_escaped() {
        let lookup = Lookup::by_alias(&Schema::default(), &Alias::new("a\"b"));
        assert!(lookup.to_dql().contains(r#"eq(Wallet.alias, "a\"b")"#));
    }

    #[test]
    fn test_var_ref_round_trip() {
        let reference = Upsert::var_ref("v");
        assert_eq!(reference, "uid(v)");
        assert_eq!(Upsert::parse_var_ref(&reference), Some("v"));
        assert_eq!(Upsert::parse_var_ref("0x1"), None);
    }

    #[test]
    fn test_upsert_defaults_to_staged() {
        let lookup = Lookup::by_alias(&Schema::default(), &Alias::default()).bind_uid("v");
        let upsert = Upsert::new(lookup, serde_json::json!({"uid": "uid(v)"}));
        assert!(!upsert.commit_now);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Any alias survives quoting inside the rendered filter.
            #[test]
            fn alias_literal_parses_back(alias in any::<String>()) {
                let dql = Lookup::by_alias(&Schema::default(), &Alias::new(alias.clone())).to_dql();
                let start = dql.find("eq(Wallet.alias, ").unwrap() + "eq(Wallet.alias, ".len();
                let end = dql.rfind(")) {").unwrap();
                let parsed: String = serde_json::from_str(&dql[start..end]).unwrap();
                prop_assert_eq!(parsed, alias);
            }
        }
    }
}
