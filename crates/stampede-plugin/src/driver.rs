//! The driver contract.

use crate::error::DriverError;
use crate::stream::TransactionStream;
use async_trait::async_trait;
use stampede_core::{BuildQueriesContext, DriverQuery, StepContext, Transaction, UnitBuildContext};

/// A driver turns unit descriptors into transactions and runs them against
/// a backend.
///
/// One driver instance serves every task of a step concurrently, so
/// implementations synchronize their own internal state.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Prepare for a step.
    async fn initialize(&self, context: &StepContext) -> Result<(), DriverError>;

    /// Build every transaction of a unit at once.
    async fn build_transactions_from_unit(
        &self,
        context: &UnitBuildContext,
    ) -> Result<Vec<Transaction>, DriverError>;

    /// Build the transactions of a unit lazily.
    ///
    /// Defaults to streaming the result of
    /// [`build_transactions_from_unit`](Driver::build_transactions_from_unit).
    async fn build_transactions_from_unit_stream(
        &self,
        context: &UnitBuildContext,
    ) -> Result<TransactionStream, DriverError> {
        let transactions = self.build_transactions_from_unit(context).await?;
        Ok(TransactionStream::from_vec(transactions))
    }

    /// Execute one transaction.
    async fn run_transaction(&self, transaction: &Transaction) -> Result<(), DriverError>;

    /// Release everything acquired since `initialize`.
    async fn teardown(&self) -> Result<(), DriverError>;

    /// Build the queries of a legacy query descriptor.
    async fn build_queries(
        &self,
        _context: &BuildQueriesContext,
    ) -> Result<Vec<DriverQuery>, DriverError> {
        Err(DriverError::Unsupported("build_queries"))
    }

    /// Execute one legacy query.
    async fn run_query(&self, _query: &DriverQuery) -> Result<(), DriverError> {
        Err(DriverError::Unsupported("run_query"))
    }
}
