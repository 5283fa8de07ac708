//! Benchmark step model.
//!
//! A [`StepContext`] bundles the benchmark name, the step to run and the
//! run-wide configuration. A step carries either a list of units (the
//! current model, built into transactions by the driver) or a list of
//! legacy query descriptors.
//!
//! ## Type Hierarchy
//!
//! **Descriptors** (declarative, loaded from the context file):
//! - `StepDescriptor` - One step with its units or legacy queries
//! - `UnitDescriptor` - One unit of work and its repetition count
//! - `QueryDescriptor` / `TransactionDescriptor` / `TableDescriptor`
//!
//! **Built work** (produced by the driver, consumed immediately):
//! - `DriverQuery` - A request with generated parameter values
//! - `Transaction` - Ordered list of driver queries

use crate::config::{ConfigError, ExecutorType, RunConfig};
use crate::rules::GenerationRule;
use crate::values::TypedValue;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ============================================================================
// Descriptors
// ============================================================================

/// Benchmark identification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkDescriptor {
    /// Benchmark name
    pub name: String,

    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A named query parameter and the rule generating its values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryParamDescriptor {
    /// Parameter name as referenced in the request text
    pub name: String,

    /// How values for this parameter are generated
    pub generation_rule: GenerationRule,
}

impl QueryParamDescriptor {
    pub fn new(name: impl Into<String>, generation_rule: GenerationRule) -> Self {
        Self {
            name: name.into(),
            generation_rule,
        }
    }
}

/// A parameterized query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    /// Query name
    pub name: String,

    /// Request text in the driver's dialect
    pub request: String,

    /// Parameters, in the order they appear in the request
    #[serde(default)]
    pub params: Vec<QueryParamDescriptor>,

    /// Repetition count (legacy per-query dispatch)
    #[serde(default = "default_count")]
    pub count: u64,
}

fn default_count() -> u64 {
    1
}

impl QueryDescriptor {
    pub fn new(name: impl Into<String>, request: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            request: request.into(),
            params: Vec::new(),
            count: default_count(),
        }
    }

    /// Add a parameter.
    pub fn with_param(mut self, param: QueryParamDescriptor) -> Self {
        self.params.push(param);
        self
    }

    /// Set the repetition count.
    pub fn with_count(mut self, count: u64) -> Self {
        self.count = count;
        self
    }
}

/// A group of queries executed as one transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionDescriptor {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isolation_level: Option<String>,

    pub queries: Vec<QueryDescriptor>,
}

/// Table column with its generation rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Column name
    pub name: String,

    /// Column type in the driver's dialect
    #[serde(rename = "type")]
    pub sql_type: String,

    #[serde(default)]
    pub primary_key: bool,

    #[serde(default)]
    pub nullable: bool,

    /// How values for this column are generated
    pub generation_rule: GenerationRule,
}

/// Secondary index on a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

/// A table to create, with its indexes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDescriptor {
    /// Table name
    pub name: String,

    /// Column definitions
    pub columns: Vec<ColumnDescriptor>,

    /// Secondary indexes
    #[serde(default)]
    pub indexes: Vec<IndexDescriptor>,
}

/// What a unit asks the driver to build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UnitKind {
    Query(QueryDescriptor),
    Transaction(TransactionDescriptor),
    CreateTable(TableDescriptor),
}

impl UnitKind {
    /// Name of the described query, transaction or table.
    pub fn name(&self) -> &str {
        match self {
            UnitKind::Query(q) => &q.name,
            UnitKind::Transaction(t) => &t.name,
            UnitKind::CreateTable(t) => &t.name,
        }
    }
}

/// One unit of work inside a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitDescriptor {
    /// Unit name
    pub name: String,

    /// Number of transactions the driver should build for this unit
    #[serde(default = "default_count")]
    pub count: u64,

    /// What to build
    pub descriptor: UnitKind,
}

impl UnitDescriptor {
    pub fn new(name: impl Into<String>, count: u64, descriptor: UnitKind) -> Self {
        Self {
            name: name.into(),
            count,
            descriptor,
        }
    }
}

/// Legacy query descriptor: a repeated query or a table creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepQueryDescriptor {
    Query(QueryDescriptor),
    CreateTable(TableDescriptor),
}

impl StepQueryDescriptor {
    /// Name of the query or table.
    pub fn name(&self) -> &str {
        match self {
            StepQueryDescriptor::Query(q) => &q.name,
            StepQueryDescriptor::CreateTable(t) => &t.name,
        }
    }

    /// Number of driver queries this descriptor is expected to build:
    /// the repetition count for a query, one plus the index count for a
    /// table creation.
    pub fn expected_query_count(&self) -> usize {
        match self {
            StepQueryDescriptor::Query(q) => usize::try_from(q.count).unwrap_or(usize::MAX),
            StepQueryDescriptor::CreateTable(t) => 1 + t.indexes.len(),
        }
    }
}

/// One benchmark step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDescriptor {
    /// Step name
    pub name: String,

    /// Run units concurrently (and shuffle them for the process executor)
    #[serde(rename = "async", default)]
    pub async_: bool,

    /// Units (current model)
    #[serde(default)]
    pub units: Vec<UnitDescriptor>,

    /// Legacy query descriptors, used when `units` is empty
    #[serde(default)]
    pub queries: Vec<StepQueryDescriptor>,

    /// Executor to run this step with
    #[serde(default)]
    pub executor: ExecutorType,
}

impl StepDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            async_: false,
            units: Vec::new(),
            queries: Vec::new(),
            executor: ExecutorType::default(),
        }
    }

    /// Set the async flag.
    pub fn with_async(mut self, async_: bool) -> Self {
        self.async_ = async_;
        self
    }

    /// Set the executor type.
    pub fn with_executor(mut self, executor: ExecutorType) -> Self {
        self.executor = executor;
        self
    }

    /// Add a unit.
    pub fn with_unit(mut self, unit: UnitDescriptor) -> Self {
        self.units.push(unit);
        self
    }

    /// Add a legacy query descriptor.
    pub fn with_query(mut self, query: StepQueryDescriptor) -> Self {
        self.queries.push(query);
        self
    }

    /// Whether this step uses the legacy per-query path.
    pub fn is_legacy(&self) -> bool {
        self.units.is_empty() && !self.queries.is_empty()
    }
}

/// Everything an executor needs to run one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepContext {
    /// Benchmark identification
    pub benchmark: BenchmarkDescriptor,

    /// The step to run; a context without a step is rejected by executors
    #[serde(default)]
    pub step: Option<StepDescriptor>,

    /// Run-wide configuration
    #[serde(default)]
    pub config: RunConfig,
}

impl StepContext {
    pub fn new(benchmark: impl Into<String>, step: StepDescriptor, config: RunConfig) -> Self {
        Self {
            benchmark: BenchmarkDescriptor {
                name: benchmark.into(),
                description: None,
            },
            step: Some(step),
            config,
        }
    }

    /// Load a context from a file; `.json` files are parsed as JSON,
    /// anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if crate::config::is_json_path(path) {
            Self::from_json(&content)
        } else {
            Self::from_yaml(&content)
        }
    }

    /// Parse a context from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Parse a context from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to compact JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Step name, or an empty string when no step is set.
    pub fn step_name(&self) -> &str {
        self.step.as_ref().map(|s| s.name.as_str()).unwrap_or_default()
    }
}

/// Request context for building the transactions of one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitBuildContext {
    pub context: StepContext,
    pub unit: UnitDescriptor,
}

/// Request context for building the queries of one legacy descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildQueriesContext {
    pub context: StepContext,
    pub query: StepQueryDescriptor,
}

// ============================================================================
// Built Work
// ============================================================================

/// A parameter bound to a generated value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryParam {
    pub name: String,
    pub value: TypedValue,
}

/// A request with generated parameter values, ready to execute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverQuery {
    pub name: String,
    pub request: String,
    #[serde(default)]
    pub params: Vec<QueryParam>,
}

impl DriverQuery {
    pub fn new(name: impl Into<String>, request: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            request: request.into(),
            params: Vec::new(),
        }
    }

    /// Look up a parameter value by name.
    pub fn param(&self, name: &str) -> Option<&TypedValue> {
        self.params.iter().find(|p| p.name == name).map(|p| &p.value)
    }
}

/// Ordered list of driver queries executed together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isolation_level: Option<String>,

    pub queries: Vec<DriverQuery>,
}

impl Transaction {
    /// Wrap queries in a transaction with the driver's default isolation.
    pub fn new(queries: Vec<DriverQuery>) -> Self {
        Self {
            isolation_level: None,
            queries,
        }
    }
}
