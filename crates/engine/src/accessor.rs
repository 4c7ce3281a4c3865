//! Balance accessor
//!
//! Reads and writes the balance of one record inside an open transaction.
//! Writes are staged upserts: the record is re-resolved by alias in the
//! same request and its balance set through the bound identity, so the
//! write only becomes visible when the enclosing transaction commits.

use serde::Deserialize;
use serde_json::{Map, Number, Value};
use walletrace_core::{
    Alias, Balance, Error, Lookup, Response, Result, ResultExt, Schema, Transaction, Upsert,
    QUERY_BLOCK,
};

/// Variable the write lookup binds the record identity to.
const BIND_VAR: &str = "v";

#[derive(Debug, Deserialize)]
struct BalanceRow {
    #[serde(default)]
    alias: Option<String>,
    #[serde(default)]
    balance: Option<Balance>,
}

/// Reads and writes one record's balance
#[derive(Debug, Clone)]
pub struct BalanceAccessor {
    alias: Alias,
    schema: Schema,
}

impl BalanceAccessor {
    /// Accessor for `alias` under the default wallet schema.
    pub fn new(alias: Alias) -> Self {
        Self::with_schema(alias, Schema::default())
    }

    /// Accessor for `alias` under a custom schema.
    pub fn with_schema(alias: Alias, schema: Schema) -> Self {
        Self { alias, schema }
    }

    /// Alias of the accessed record.
    pub fn alias(&self) -> &Alias {
        &self.alias
    }

    /// Schema in use.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Lookup used by [`read_balance`](Self::read_balance).
    pub fn read_lookup(&self) -> Lookup {
        Lookup::by_alias(&self.schema, &self.alias)
            .project("alias", &self.schema.alias_predicate)
            .project("balance", &self.schema.balance_predicate)
    }

    /// Lookup binding the record identity for writes.
    pub fn write_lookup(&self) -> Lookup {
        Lookup::by_alias(&self.schema, &self.alias).bind_uid(BIND_VAR)
    }

    /// Current balance as seen by `txn`.
    ///
    /// # Errors
    ///
    /// - `Query` if the store fails the lookup
    /// - `Parse` if the result is malformed, has no balance, or matches
    ///   more than one record
    /// - `NotFound` if no record carries the alias
    pub fn read_balance<T: Transaction>(&self, txn: &mut T) -> Result<Balance> {
        let lookup = self.read_lookup();
        let raw = txn
            .query(&lookup)
            .with_context(|| format!("Unable to query {}", lookup.to_dql()))?;

        let rows = parse_rows(raw)?;
        match rows.as_slice() {
            [] => Err(Error::NotFound {
                alias: self.alias.to_string(),
            }),
            [row] => {
                if let Some(found) = &row.alias {
                    if found != self.alias.as_str() {
                        return Err(Error::Parse(format!(
                            "lookup for {:?} returned alias {:?}",
                            self.alias.as_str(),
                            found
                        )));
                    }
                }
                row.balance.ok_or_else(|| {
                    Error::Parse(format!("record {:?} has no balance", self.alias.as_str()))
                })
            }
            many => Err(Error::Parse(format!(
                "expected exactly one record for alias {:?}, found {}",
                self.alias.as_str(),
                many.len()
            ))),
        }
    }

    /// Stage `new_balance` as the record's balance in `txn`.
    ///
    /// If the alias resolves to nothing inside the transaction, the store
    /// creates a new record.
    ///
    /// # Errors
    ///
    /// - `Encoding` if `new_balance` is not a finite number
    /// - `Mutation` if the store rejects the upsert
    pub fn write_balance<T: Transaction>(&self, txn: &mut T, new_balance: Balance) -> Result<Response> {
        let mut doc = Map::new();
        doc.insert("uid".to_string(), Value::String(Upsert::var_ref(BIND_VAR)));
        doc.insert(
            self.schema.balance_predicate.clone(),
            encode_balance(new_balance)?,
        );

        let upsert = Upsert::new(self.write_lookup(), Value::Object(doc));
        txn.mutate(&upsert).context("Unable to mutate balance")
    }

    /// Stage a full record (alias and balance) in `txn`.
    ///
    /// Used to create the record out of band before a scenario.
    pub fn seed_record<T: Transaction>(&self, txn: &mut T, balance: Balance) -> Result<Response> {
        let mut doc = Map::new();
        doc.insert("uid".to_string(), Value::String(Upsert::var_ref(BIND_VAR)));
        doc.insert(
            self.schema.alias_predicate.clone(),
            Value::String(self.alias.as_str().to_string()),
        );
        doc.insert(self.schema.balance_predicate.clone(), encode_balance(balance)?);

        let upsert = Upsert::new(self.write_lookup(), Value::Object(doc));
        txn.mutate(&upsert).context("Unable to mutate record")
    }
}

fn parse_rows(raw: Value) -> Result<Vec<BalanceRow>> {
    let mut object = match raw {
        Value::Object(object) => object,
        other => {
            return Err(Error::Parse(format!(
                "expected a JSON object from lookup, got {}",
                other
            )))
        }
    };
    let block = object
        .remove(QUERY_BLOCK)
        .ok_or_else(|| Error::Parse(format!("lookup result has no {:?} block", QUERY_BLOCK)))?;
    serde_json::from_value(block).map_err(|e| Error::Parse(e.to_string()))
}

fn encode_balance(balance: Balance) -> Result<Value> {
    Number::from_f64(balance)
        .map(Value::Number)
        .ok_or_else(|| Error::Encoding(format!("balance {} is not representable in JSON", balance)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use walletrace_core::{Connection, Connector, ErrorKind};
    use walletrace_storage::{Fault, FaultSpec, MemoryStore};

    /// Transaction returning a canned lookup result.
    struct Canned(Value);

    impl Transaction for Canned {
        fn query(&mut self, _lookup: &Lookup) -> Result<Value> {
            Ok(self.0.clone())
        }
        fn mutate(&mut self, _upsert: &Upsert) -> Result<Response> {
            Ok(Response::default())
        }
        fn commit(self) -> Result<()> {
            Ok(())
        }
        fn discard(self) -> Result<()> {
            Ok(())
        }
    }

    fn accessor() -> BalanceAccessor {
        BalanceAccessor::new(Alias::default())
    }

    #[test]
    fn test_read_single_record() {
        let mut txn = Canned(json!({"q": [{"alias": "a", "balance": 100.0}]}));
        assert_eq!(accessor().read_balance(&mut txn).unwrap(), 100.0);
    }

    #[test]
    fn test_read_integer_balance() {
        let mut txn = Canned(json!({"q": [{"alias": "a", "balance": 42}]}));
        assert_eq!(accessor().read_balance(&mut txn).unwrap(), 42.0);
    }

    #[test]
    fn test_read_zero_records_is_not_found() {
        let mut txn = Canned(json!({"q": []}));
        let err = accessor().read_balance(&mut txn).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_read_many_records_is_parse_failure() {
        let mut txn = Canned(json!({"q": [{"balance": 1.0}, {"balance": 2.0}]}));
        let err = accessor().read_balance(&mut txn).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert!(err.to_string().contains("found 2"));
    }

    #[test]
    fn test_read_malformed_results() {
        for raw in [
            json!([1, 2]),
            json!({"other": []}),
            json!({"q": [{"balance": "lots"}]}),
            json!({"q": [{"alias": "a"}]}),
            json!({"q": [{"alias": "b", "balance": 1.0}]}),
        ] {
            let mut txn = Canned(raw.clone());
            let err = accessor().read_balance(&mut txn).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Parse, "input {}", raw);
        }
    }

    #[test]
    fn test_write_rejects_non_finite() {
        let mut txn = Canned(json!({}));
        let err = accessor().write_balance(&mut txn, f64::NAN).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Encoding);
    }

    #[test]
    fn test_write_lookup_shape() {
        let dql = accessor().write_lookup().to_dql();
        assert!(dql.contains("v as uid"));
        assert!(dql.contains(r#"eq(Wallet.alias, "a")"#));
    }

    #[test]
    fn test_round_trip_against_memory_store() {
        let store = MemoryStore::new();
        store.seed(&Alias::default(), 100.0);
        let conn = store.connect().unwrap();

        let mut txn = conn.begin().unwrap();
        let balance = accessor().read_balance(&mut txn).unwrap();
        accessor().write_balance(&mut txn, balance + 5.0).unwrap();
        assert_eq!(accessor().read_balance(&mut txn).unwrap(), 105.0);
        txn.commit().unwrap();

        assert_eq!(store.balance_of(&Alias::default()), Some(105.0));
        assert_eq!(store.count_alias(&Alias::default()), 1);
    }

    #[test]
    fn test_seed_record_creates_lookupable_record() {
        let store = MemoryStore::new();
        let conn = store.connect().unwrap();
        let mut txn = conn.begin().unwrap();
        accessor().seed_record(&mut txn, 100.0).unwrap();
        txn.commit().unwrap();

        let mut txn = conn.begin().unwrap();
        assert_eq!(accessor().read_balance(&mut txn).unwrap(), 100.0);
    }

    #[test]
    fn test_query_failure_keeps_kind_and_context() {
        let store = MemoryStore::new();
        store.seed(&Alias::default(), 1.0);
        store.inject(FaultSpec::once(Fault::Query));
        let conn = store.connect().unwrap();
        let mut txn = conn.begin().unwrap();

        let err = accessor().read_balance(&mut txn).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Query);
        assert!(err.to_string().starts_with("Unable to query {"));
    }

    #[test]
    fn test_mutation_failure_keeps_kind() {
        let store = MemoryStore::new();
        store.seed(&Alias::default(), 1.0);
        store.inject(FaultSpec::once(Fault::Mutate));
        let conn = store.connect().unwrap();
        let mut txn = conn.begin().unwrap();

        let err = accessor().write_balance(&mut txn, 2.0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Mutation);
    }
}
