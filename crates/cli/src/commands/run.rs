//! Module for the `run` subcommand, which invokes one method of an assembly module in the
//! in-memory host, optionally after applying a patch plan.

use super::{CliError, Session};
use async_trait::async_trait;
use clap::Args;
use ilweave_core::{Signature, Value};
use std::error::Error;

/// Arguments for the `run` subcommand.
#[derive(Args)]
pub struct RunArgs {
    /// Assembly file containing the method to run.
    pub input: String,
    /// Method to invoke as `Type::name`. Optional when the module defines a single method.
    #[arg(long)]
    method: Option<String>,
    /// Argument values in parameter order, e.g. `--arg true --arg 10`.
    #[arg(long = "arg", value_name = "VALUE")]
    args: Vec<String>,
    /// Patch plan to apply before running.
    #[arg(long)]
    plan: Option<String>,
    /// Setting values to apply (JSON snapshot). Requires `--plan` to declare the settings.
    #[arg(long, requires = "plan")]
    settings: Option<String>,
}

#[async_trait]
impl super::Command for RunArgs {
    async fn execute(self) -> Result<(), Box<dyn Error>> {
        let plan = match &self.plan {
            Some(path) => Some(super::read_plan(path).await?),
            None => None,
        };
        let snapshot = match &self.settings {
            Some(path) => Some(super::read_settings(path).await?),
            None => None,
        };
        let methods = super::read_module(&self.input).await?;

        let session = Session::new(plan.as_ref(), snapshot.as_ref())?;
        let ids = session.load(methods)?;
        let target = super::select_method(&ids, self.method.as_deref())?;

        let signature = session.table.signature(&target)?;
        let args = parse_args(&signature, &self.args)?;
        match session.table.invoke(&target, &args)? {
            Some(value) => println!("{value}"),
            None => println!("(void)"),
        }
        Ok(())
    }
}

/// Parses textual arguments against the parameter types of `signature`.
pub fn parse_args(signature: &Signature, raw: &[String]) -> Result<Vec<Value>, CliError> {
    if raw.len() != signature.params.len() {
        return Err(CliError::Argument(format!(
            "expected {} argument(s), got {}",
            signature.params.len(),
            raw.len()
        )));
    }
    signature
        .params
        .iter()
        .zip(raw)
        .enumerate()
        .map(|(index, (&ty, token))| {
            Value::parse_as(ty, token).ok_or_else(|| {
                CliError::Argument(format!("argument {index} ('{token}') is not a valid {ty}"))
            })
        })
        .collect()
}
