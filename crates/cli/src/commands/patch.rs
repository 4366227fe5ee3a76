//! Module for the `patch` subcommand, which installs a patch plan, loads an assembly module into
//! the in-memory host and prints the patched listing of every targeted method.

use super::{CliError, Session};
use async_trait::async_trait;
use clap::Args;
use ilweave_core::encoder::digest_hex;
use ilweave_patch::registry::{RegistrationInfo, RegistrationState};
use ilweave_patch::settings::SettingInfo;
use serde::Serialize;
use std::error::Error;

/// Arguments for the `patch` subcommand.
#[derive(Args)]
pub struct PatchArgs {
    /// Assembly file containing the methods to patch.
    pub input: String,
    /// Patch plan (JSON).
    #[arg(long)]
    pub plan: String,
    /// Setting values to apply before patching (JSON snapshot).
    #[arg(long)]
    settings: Option<String>,
    /// Path to emit a JSON report of registrations, settings and body digests.
    #[arg(long)]
    emit: Option<String>,
}

/// JSON report written by `--emit`.
#[derive(Debug, Serialize)]
pub struct PatchReport {
    pub registrations: Vec<RegistrationInfo>,
    pub settings: Vec<SettingInfo>,
    pub methods: Vec<MethodDigest>,
}

#[derive(Debug, Serialize)]
pub struct MethodDigest {
    pub method: String,
    pub digest: String,
}

#[async_trait]
impl super::Command for PatchArgs {
    async fn execute(self) -> Result<(), Box<dyn Error>> {
        let PatchArgs {
            input,
            plan,
            settings,
            emit,
        } = self;

        let plan = super::read_plan(&plan).await?;
        let snapshot = match settings {
            Some(path) => Some(super::read_settings(&path).await?),
            None => None,
        };
        let methods = super::read_module(&input).await?;

        let session = Session::new(Some(&plan), snapshot.as_ref())?;
        let ids = session.load(methods)?;
        let report = build_report(&session, &ids)?;

        for target in plan.targets() {
            match session.registry.state(&target) {
                Some(RegistrationState::Applied { digest }) => {
                    println!("; {target} patched (body {digest})");
                    println!("{}", session.table.body(&target)?);
                }
                Some(RegistrationState::Failed { reason }) => {
                    return Err(format!("patch for {target} failed: {reason}").into());
                }
                _ => tracing::warn!("{} is not defined in {}, nothing patched", target, input),
            }
        }

        if let Some(path) = emit.as_ref() {
            tokio::fs::write(path, serde_json::to_string_pretty(&report)?).await?;
            println!("; wrote patch report to {path}");
        }
        Ok(())
    }
}

fn build_report(session: &Session, ids: &[ilweave_core::MethodId]) -> Result<PatchReport, CliError> {
    let methods = ids
        .iter()
        .map(|id| {
            let body = session.table.body(id)?;
            Ok(MethodDigest {
                method: id.to_string(),
                digest: digest_hex(&body)?,
            })
        })
        .collect::<Result<Vec<_>, CliError>>()?;

    Ok(PatchReport {
        registrations: session.registry.registrations(),
        settings: session.settings.describe(),
        methods,
    })
}
