use async_trait::async_trait;
use clap::Subcommand;
use ilweave_core::{InstructionStream, MethodId, MethodTable};
use ilweave_patch::plan::InstallReport;
use ilweave_patch::settings::SettingsSnapshot;
use ilweave_patch::{PatchPlan, PatchRegistry, SettingsStore};
use std::error::Error;
use std::path::Path;
use std::sync::Arc;

pub mod decode;
pub mod encode;
pub mod patch;
pub mod run;

use thiserror::Error;

/// Errors raised by the CLI itself, on top of the library errors it forwards.
#[derive(Debug, Error)]
pub enum CliError {
    /// File read/write error.
    #[error("file error: {0}")]
    File(#[from] std::io::Error),
    /// Assembly, verification or execution failed.
    #[error(transparent)]
    Core(#[from] ilweave_core::result::Error),
    /// Plan, settings or patch application failed.
    #[error(transparent)]
    Patch(#[from] ilweave_patch::Error),
    /// The requested method is not in the module, or no method was named and the module has
    /// several.
    #[error("method selection: {0}")]
    Method(String),
    /// An `--arg` value does not fit the parameter it was given for.
    #[error("invalid argument: {0}")]
    Argument(String),
    /// JSON serialization error.
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// CLI subcommands for ilweave.
#[derive(Subcommand)]
pub enum Cmd {
    /// Parse assembly and print the normalized listing.
    Decode(decode::DecodeArgs),
    /// Print the canonical encoding and digest of each method.
    Encode(encode::EncodeArgs),
    /// Apply a patch plan and print the patched listing.
    Patch(patch::PatchArgs),
    /// Invoke a method, optionally after applying a patch plan.
    Run(run::RunArgs),
}

/// Trait for executing CLI subcommands.
#[async_trait]
pub trait Command {
    /// Executes the subcommand.
    async fn execute(self) -> Result<(), Box<dyn Error>>;
}

#[async_trait]
impl Command for Cmd {
    async fn execute(self) -> Result<(), Box<dyn Error>> {
        match self {
            Cmd::Decode(args) => args.execute().await,
            Cmd::Encode(args) => args.execute().await,
            Cmd::Patch(args) => args.execute().await,
            Cmd::Run(args) => args.execute().await,
        }
    }
}

/// Reads and parses an assembly file.
pub async fn read_module(path: impl AsRef<Path>) -> Result<Vec<InstructionStream>, CliError> {
    let src = tokio::fs::read_to_string(path.as_ref()).await?;
    Ok(ilweave_core::decoder::parse_module(&src)?)
}

pub async fn read_plan(path: impl AsRef<Path>) -> Result<PatchPlan, CliError> {
    let json = tokio::fs::read_to_string(path.as_ref()).await?;
    Ok(PatchPlan::from_json(&json)?)
}

pub async fn read_settings(path: impl AsRef<Path>) -> Result<SettingsSnapshot, CliError> {
    let json = tokio::fs::read_to_string(path.as_ref()).await?;
    Ok(SettingsSnapshot::from_json(&json)?)
}

/// Host, settings and registry wired together the way a runtime would: the registry listens
/// for method loads, so defining the module applies every installed patch.
pub struct Session {
    pub table: MethodTable,
    pub settings: SettingsStore,
    pub registry: Arc<PatchRegistry>,
    pub install: InstallReport,
}

impl Session {
    pub fn new(plan: Option<&PatchPlan>, snapshot: Option<&SettingsSnapshot>) -> Result<Self, CliError> {
        let table = MethodTable::new();
        let settings = SettingsStore::new();
        let registry = Arc::new(PatchRegistry::new());

        let install = match plan {
            Some(plan) => plan.install(&settings, &registry)?,
            None => InstallReport::default(),
        };
        if let Some(snapshot) = snapshot {
            let applied = settings.apply_snapshot(snapshot)?;
            tracing::info!("Applied {} setting value(s)", applied);
        }
        table.subscribe(registry.clone());

        Ok(Self {
            table,
            settings,
            registry,
            install,
        })
    }

    /// Defines every method; installed patches are applied as each one loads.
    pub fn load(&self, methods: Vec<InstructionStream>) -> Result<Vec<MethodId>, CliError> {
        let mut ids = Vec::with_capacity(methods.len());
        for stream in methods {
            ids.push(stream.method().clone());
            self.table.define(stream)?;
        }
        Ok(ids)
    }
}

/// Picks `name` from `ids`, or the only id when no name is given.
pub fn select_method(ids: &[MethodId], name: Option<&str>) -> Result<MethodId, CliError> {
    match name {
        Some(name) => {
            let wanted: MethodId = name.parse()?;
            ids.iter()
                .find(|id| **id == wanted)
                .cloned()
                .ok_or_else(|| CliError::Method(format!("{wanted} is not defined in the module")))
        }
        None => match ids {
            [only] => Ok(only.clone()),
            _ => Err(CliError::Method(format!(
                "module defines {} methods, pick one with --method",
                ids.len()
            ))),
        },
    }
}
