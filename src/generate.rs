//! `stampede generate`: preview generated values without a driver.

use anyhow::Context;
use clap::Args;
use serde::Deserialize;
use stampede_core::{GenerationRule, QueryParamDescriptor, TypedValue};
use stampede_generator::{compile, compile_named, derive_seed, GenerateError};
use std::io::Write;
use std::path::PathBuf;

#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    /// YAML or JSON file holding one generation rule, or a list of named params
    #[arg(long)]
    pub rule: PathBuf,

    /// Seed for the generators
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Number of values (or rows) to print
    #[arg(long, default_value_t = 10)]
    pub count: u64,
}

/// Contents of a rule file.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RuleFile {
    /// Named params; each printed line is an object keyed by param name
    Params(Vec<QueryParamDescriptor>),
    /// A single rule; each printed line is a bare value
    Single(GenerationRule),
}

impl RuleFile {
    /// YAML parser also accepts JSON documents.
    pub fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(contents)
    }
}

/// Draw `count` values from a single rule.
pub fn generate_values(
    rule: &GenerationRule,
    seed: u64,
    count: u64,
) -> Result<Vec<TypedValue>, GenerateError> {
    let mut generator = compile(seed, count, rule)?;
    (0..count).map(|_| generator.next_value()).collect()
}

/// Draw `count` rows, one value per param. Each param gets its own seed
/// derived from its position.
pub fn generate_rows(
    params: &[QueryParamDescriptor],
    seed: u64,
    count: u64,
) -> Result<Vec<TypedValue>, GenerateError> {
    let mut generators = params
        .iter()
        .enumerate()
        .map(|(i, param)| compile_named(derive_seed(seed, i as u64), count, param))
        .collect::<Result<Vec<_>, _>>()?;

    (0..count)
        .map(|_| {
            let fields = params
                .iter()
                .zip(generators.iter_mut())
                .map(|(param, generator)| Ok((param.name.clone(), generator.next_value()?)))
                .collect::<Result<Vec<_>, GenerateError>>()?;
            Ok(TypedValue::Struct(fields))
        })
        .collect()
}

/// Run the command, writing one JSON document per line to `out`.
pub fn run(args: &GenerateArgs, out: &mut impl Write) -> anyhow::Result<()> {
    let contents = std::fs::read_to_string(&args.rule)
        .with_context(|| format!("Failed to read rule file '{}'", args.rule.display()))?;
    let rule_file = RuleFile::parse(&contents)
        .with_context(|| format!("Failed to parse rule file '{}'", args.rule.display()))?;

    let values = match &rule_file {
        RuleFile::Params(params) => generate_rows(params, args.seed, args.count)?,
        RuleFile::Single(rule) => generate_values(rule, args.seed, args.count)?,
    };
    for value in values {
        writeln!(out, "{}", value.to_json()).context("Failed to write generated value")?;
    }
    Ok(())
}
