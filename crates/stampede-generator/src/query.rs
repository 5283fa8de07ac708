//! Builders turning descriptors into driver queries and transactions.
//!
//! Drivers use these when answering a build request: every parameter rule
//! is compiled once and then drawn from for each built query.

use crate::compile::compile_named;
use crate::error::GenerateError;
use crate::value::ValueGenerator;
use stampede_core::{
    DriverQuery, QueryDescriptor, QueryParam, Transaction, TransactionDescriptor, UnitDescriptor,
    UnitKind,
};

/// Derive a distinct seed for the `index`-th generator under `seed`.
pub fn derive_seed(seed: u64, index: u64) -> u64 {
    seed.wrapping_add(index.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

/// Builds `DriverQuery` values for one query descriptor.
pub struct QueryBuilder {
    name: String,
    request: String,
    params: Vec<(String, Box<dyn ValueGenerator>)>,
}

impl QueryBuilder {
    /// Compile the descriptor's parameter rules.
    ///
    /// `output_size` is the number of queries that will be built; it sizes
    /// the null quota of each parameter.
    pub fn new(
        seed: u64,
        output_size: u64,
        descriptor: &QueryDescriptor,
    ) -> Result<Self, GenerateError> {
        let params = descriptor
            .params
            .iter()
            .enumerate()
            .map(|(index, param)| {
                let generator = compile_named(derive_seed(seed, index as u64), output_size, param)?;
                Ok((param.name.clone(), generator))
            })
            .collect::<Result<Vec<_>, GenerateError>>()?;

        Ok(Self {
            name: descriptor.name.clone(),
            request: descriptor.request.clone(),
            params,
        })
    }

    /// Build one query with freshly generated parameter values.
    pub fn build(&mut self) -> Result<DriverQuery, GenerateError> {
        let params = self
            .params
            .iter_mut()
            .map(|(name, generator)| {
                Ok(QueryParam {
                    name: name.clone(),
                    value: generator.next_value()?,
                })
            })
            .collect::<Result<Vec<_>, GenerateError>>()?;

        Ok(DriverQuery {
            name: self.name.clone(),
            request: self.request.clone(),
            params,
        })
    }

    /// Build `count` queries.
    pub fn build_many(&mut self, count: u64) -> Result<Vec<DriverQuery>, GenerateError> {
        (0..count).map(|_| self.build()).collect()
    }
}

/// Builds transactions for one unit.
pub struct TransactionBuilder {
    isolation_level: Option<String>,
    queries: Vec<QueryBuilder>,
    remaining: u64,
}

impl TransactionBuilder {
    /// Compile the queries of a transaction descriptor.
    pub fn new(
        seed: u64,
        output_size: u64,
        descriptor: &TransactionDescriptor,
    ) -> Result<Self, GenerateError> {
        let queries = descriptor
            .queries
            .iter()
            .enumerate()
            .map(|(index, query)| QueryBuilder::new(derive_seed(seed, index as u64), output_size, query))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            isolation_level: descriptor.isolation_level.clone(),
            queries,
            remaining: output_size,
        })
    }

    /// Builder yielding `unit.count` transactions. A query unit becomes
    /// single-query transactions; table creation has no data to build.
    pub fn for_unit(seed: u64, unit: &UnitDescriptor) -> Result<Self, GenerateError> {
        match &unit.descriptor {
            UnitKind::Query(query) => Ok(Self {
                isolation_level: None,
                queries: vec![QueryBuilder::new(seed, unit.count, query)?],
                remaining: unit.count,
            }),
            UnitKind::Transaction(tx) => Self::new(seed, unit.count, tx),
            UnitKind::CreateTable(_) => Err(GenerateError::UnsupportedUnit("create_table")),
        }
    }

    /// Build one transaction, regardless of the remaining count.
    pub fn build(&mut self) -> Result<Transaction, GenerateError> {
        let queries = self
            .queries
            .iter_mut()
            .map(QueryBuilder::build)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Transaction {
            isolation_level: self.isolation_level.clone(),
            queries,
        })
    }
}

impl Iterator for TransactionBuilder {
    type Item = Result<Transaction, GenerateError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(self.build())
    }
}
